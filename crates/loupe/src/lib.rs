//! loupe: request routing and semantic highlighting over a prebuilt
//! symbol index.
//!
//! The server is a JSON-RPC message dispatcher with a strict reply
//! contract, plus a highlight engine that partitions indexed symbol
//! occurrences into non-overlapping display ranges. Index building,
//! parsing and transport framing beyond stdio are external collaborators.

pub mod dispatch;
pub mod handlers;
pub mod highlight;
pub mod proto;
pub mod reply;
pub mod server;
pub mod sink;
pub mod state;
