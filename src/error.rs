//! Closed error taxonomy for the anchoring and reconciliation engine.

use thiserror::Error;

/// A single closed set of error kinds returned by every public operation.
///
/// Low-level modules (locking, storage, VCS integration) define their own
/// narrow error types and map them into this taxonomy at the module
/// boundary, so callers never see raw OS errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommentError {
    /// Sidecar, source file, project root, or thread does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed JSON, schema violation, out-of-range line numbers, bad
    /// hash format, path outside project root, non-UTC timestamp, or a
    /// ULID of the wrong length.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The source file is binary and cannot be hashed or anchored.
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),

    /// The source file's hash changed since the sidecar was last read.
    /// Callers should re-read the sidecar and retry.
    #[error("concurrency conflict on {path}: expected {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Path to the sidecar whose write was rejected.
        path: String,
        /// The source hash the writer expected to still be current.
        expected: String,
        /// The source hash actually found on disk.
        actual: String,
    },

    /// A file lock could not be acquired before its deadline.
    /// Callers may retry.
    #[error("lock timeout on {path} after {timeout_secs:.1}s")]
    LockTimeout {
        /// Path to the file that could not be locked.
        path: String,
        /// The timeout, in seconds, that was exceeded.
        timeout_secs: f64,
    },

    /// A read, write, or rename failed at the OS level.
    #[error("io failure: {0}")]
    IoFailure(String),

    /// The external version-control tool is not present on this host.
    /// Callers should degrade gracefully (skip rename detection, treat
    /// deletion as indeterminate).
    #[error("vcs unavailable: {0}")]
    VcsUnavailable(String),

    /// The project directory exists but contains no `.git` entry.
    #[error("not a repository: {0}")]
    NotARepository(String),
}

impl From<std::io::Error> for CommentError {
    fn from(err: std::io::Error) -> Self {
        CommentError::IoFailure(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CommentError>;
