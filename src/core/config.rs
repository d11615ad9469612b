//! Tunable parameters for reconciliation, locking, and VCS subprocess
//! calls, bundled into explicit value types rather than hidden globals.

use std::time::Duration;

use crate::core::fuzzy::{DEFAULT_CONTEXT_WINDOW, DEFAULT_FALLBACK_WINDOW, DEFAULT_THRESHOLD};
use crate::core::hash::CONTEXT_LINES;
use crate::core::lock::DEFAULT_LOCK_TIMEOUT;
use crate::core::store::DEFAULT_MAX_RETRIES;
use crate::core::vcs::{DEFAULT_SUBPROCESS_TIMEOUT, MAX_RENAME_CHAIN};

/// Every tunable parameter named across the reconciliation engine,
/// collected into one value passed explicitly into the operations that
/// need it. There is no process-wide configuration state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileConfig {
    /// Minimum combined similarity score accepted as a match.
    pub threshold: f64,
    /// Number of context lines hashed before/after an anchor.
    pub context_lines: usize,
    /// Half-width of the localized search around a context-region match.
    pub context_window: usize,
    /// Half-width of the full sliding-window search.
    pub fallback_window: usize,
    /// Deadline for acquiring a sidecar's exclusive lock.
    pub lock_timeout: Duration,
    /// Retries for [`crate::core::store::write_sidecar_with_retry`] on a
    /// concurrency conflict.
    pub max_retries: u32,
    /// Timeout for a single git subprocess invocation.
    pub vcs_timeout: Duration,
    /// Upper bound on rename-chain hops followed during rename detection.
    pub max_rename_chain: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            context_lines: CONTEXT_LINES,
            context_window: DEFAULT_CONTEXT_WINDOW,
            fallback_window: DEFAULT_FALLBACK_WINDOW,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            vcs_timeout: DEFAULT_SUBPROCESS_TIMEOUT,
            max_rename_chain: MAX_RENAME_CHAIN,
        }
    }
}
