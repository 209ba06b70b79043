//! Mapping source error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a mirror map from one source.
///
/// None of these are fatal: the cache logs them and moves on to the next source.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Local mapping file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transport-level failure talking to the remote mirror list.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Remote mirror list answered with a non-success status.
    #[error("HTTP request to {url} failed with status: {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Source was readable but held no usable `domain=mirror` lines.
    #[error("no mappings found in {0}")]
    Empty(String),
}

/// Result type for mapping source operations.
pub type Result<T> = std::result::Result<T, MirrorError>;
