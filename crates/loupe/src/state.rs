//! Shared server state.
//!
//! Handlers receive this explicitly on every invocation; there is no
//! hidden owner. Message processing is sequential, so nothing here is
//! synchronized.

use std::rc::Rc;

use loupe_core::config::{Config, HighlightFilter};
use loupe_core::index::{FileIndex, SymbolIndex};
use loupe_core::working_files::{WorkingFile, WorkingFiles};

use crate::dispatch::{HandlerError, NotIndexed};
use crate::proto::ErrorCode;
use crate::reply::ReplyOnce;
use crate::sink::OutboundSink;

pub struct ServerState {
    /// Immutable index snapshot. The external indexing pipeline replaces
    /// it wholesale between messages; this core never locks it.
    pub db: SymbolIndex,
    pub wfiles: WorkingFiles,
    pub config: Config,
    /// Compiled once from the configured glob lists at initialize time.
    pub highlight_filter: HighlightFilter,
    pub sink: Rc<dyn OutboundSink>,
    /// Set while retrying deferred messages: no more indexing is coming,
    /// so a missing index entry is a terminal error rather than a reason
    /// to defer again.
    pub overdue: bool,
    pub shutdown_requested: bool,
    pub exit_code: Option<i32>,
}

impl ServerState {
    pub fn new(sink: Rc<dyn OutboundSink>) -> ServerState {
        ServerState {
            db: SymbolIndex::new(),
            wfiles: WorkingFiles::new(),
            config: Config::default(),
            highlight_filter: HighlightFilter::empty(),
            sink,
            overdue: false,
            shutdown_requested: false,
            exit_code: None,
        }
    }

    pub fn find_file(&self, path: &str) -> Option<&FileIndex> {
        self.db.file(path)
    }

    /// Resolve a path to its index entry and open buffer, or fail the way
    /// the protocol wants:
    ///
    /// - not opened: replies `InvalidRequest` and yields `None`
    /// - not indexed: raises [`NotIndexed`] for the caller to defer, or,
    ///   when `overdue`, replies `InvalidRequest` and yields `None`
    pub fn find_or_fail<'a>(
        &'a self,
        path: &str,
        reply: &mut ReplyOnce,
    ) -> Result<Option<(&'a FileIndex, &'a WorkingFile)>, HandlerError> {
        let Some(wfile) = self.wfiles.get(path) else {
            reply.not_opened(path);
            return Ok(None);
        };
        match self.db.file(path) {
            Some(file) => Ok(Some((file, wfile))),
            None if self.overdue => {
                reply.error(ErrorCode::InvalidRequest, "not indexed");
                Ok(None)
            }
            None => Err(NotIndexed {
                path: path.to_string(),
            }
            .into()),
        }
    }
}
