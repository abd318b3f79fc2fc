//! Process-wide configuration.
//!
//! Configuration arrives once, inside the `initialize` request's
//! `initializationOptions`, and is read-only afterwards. The highlight
//! path filter is compiled from its glob lists a single time at startup
//! and then passed by reference wherever it is consulted.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Server configuration, deserialized from `initializationOptions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub xref: XrefConfig,
    pub highlight: HighlightConfig,
    pub client: ClientConfig,
}

/// Bounds for cross-reference style replies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct XrefConfig {
    /// Maximum number of results in a single reply.
    pub max_num: usize,
}

impl Default for XrefConfig {
    fn default() -> XrefConfig {
        XrefConfig { max_num: 2000 }
    }
}

/// Gating and output shape of the highlight engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HighlightConfig {
    /// Buffers larger than this are not highlighted.
    pub large_file_size: usize,
    /// Emit line/column ranges instead of byte offsets.
    pub ls_ranges: bool,
    /// Paths matching any of these globs are never highlighted.
    pub blacklist: Vec<String>,
    /// Paths matching any of these globs are always highlighted, even when
    /// blacklisted.
    pub whitelist: Vec<String>,
}

impl Default for HighlightConfig {
    fn default() -> HighlightConfig {
        HighlightConfig {
            large_file_size: 2 * 1024 * 1024,
            ls_ranges: false,
            blacklist: Vec::new(),
            whitelist: Vec::new(),
        }
    }
}

/// Capabilities negotiated with the client at initialize time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Whether the client accepts rich location-link results.
    pub link_support: bool,
}

/// The slice of configuration a reply channel consumes.
#[derive(Debug, Clone, Copy)]
pub struct ReplySettings {
    pub max_num: usize,
    pub link_support: bool,
}

impl Config {
    pub fn reply_settings(&self) -> ReplySettings {
        ReplySettings {
            max_num: self.xref.max_num,
            link_support: self.client.link_support,
        }
    }
}

/// Error building configuration state.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid glob pattern syntax.
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

// ============================================================================
// Highlight path filter
// ============================================================================

/// Allow/deny glob matcher gating highlight computation, built once from
/// the configured pattern lists.
#[derive(Debug)]
pub struct HighlightFilter {
    whitelist: GlobSet,
    blacklist: GlobSet,
}

impl HighlightFilter {
    /// Compile the configured pattern lists.
    pub fn new(whitelist: &[String], blacklist: &[String]) -> Result<HighlightFilter, ConfigError> {
        let filter = HighlightFilter {
            whitelist: build_glob_set(whitelist)?,
            blacklist: build_glob_set(blacklist)?,
        };
        debug!(
            whitelist = whitelist.len(),
            blacklist = blacklist.len(),
            "compiled highlight filter"
        );
        Ok(filter)
    }

    /// A filter with no patterns: every path matches.
    pub fn empty() -> HighlightFilter {
        HighlightFilter {
            whitelist: GlobSet::empty(),
            blacklist: GlobSet::empty(),
        }
    }

    /// Whitelist hits win; otherwise anything not blacklisted matches.
    pub fn matches(&self, path: &str) -> bool {
        if self.whitelist.is_match(path) {
            return true;
        }
        !self.blacklist.is_match(path)
    }
}

impl Default for HighlightFilter {
    fn default() -> HighlightFilter {
        HighlightFilter::empty()
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ConfigError::InvalidPattern {
        pattern: String::new(),
        message: e.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
