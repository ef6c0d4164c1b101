//! Typed errors for the index engine.
//!
//! Recoverable per-file failures (unreadable file, malformed source map) are
//! handled at the call site and counted in result statistics; everything that
//! reaches a caller goes through `IndexError` so the discriminant survives.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    /// I/O failure on a specific path. Per-file variants of this are logged
    /// and skipped by the scanner; this surfaces only for operations where
    /// the path is the whole point (persistence, snippet roots).
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scan root itself is missing or unreadable. Aborts the scan.
    #[error("scan root unavailable: {path}: {source}")]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted index blob failed to parse or carries an unknown format
    /// version. In-memory state is left untouched.
    #[error("malformed index blob: {0}")]
    MalformedIndex(String),

    /// A source map file is not valid v3 JSON. The offending map is skipped.
    #[error("malformed source map {path}: {message}")]
    MalformedSourceMap { path: PathBuf, message: String },

    /// An include/exclude glob failed to compile.
    #[error("invalid glob pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Configuration file failed to parse.
    #[error("configuration error: {0}")]
    Config(String),

    /// A query was issued before any scan completed.
    #[error("repository is not indexed yet")]
    NotIndexed,

    /// A structural invariant was broken (edge to a missing node, impossible
    /// change transition). Programmer error, not user input.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The filesystem watcher failed in a way it cannot recover from.
    #[error("watcher error: {0}")]
    Watch(String),

    /// The operation was cancelled cooperatively. Partial results are
    /// discarded; not a failure.
    #[error("operation cancelled")]
    Cancelled,
}

impl IndexError {
    /// True for the non-error terminal state.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IndexError::Cancelled)
    }
}
