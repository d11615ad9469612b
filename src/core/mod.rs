//! Core primitives for the anchoring and reconciliation engine:
//! normalisation and hashing ([`hash`]), fuzzy similarity and window
//! search ([`fuzzy`]), the data model ([`model`]), reconciliation
//! ([`reconcile`]), atomic sidecar persistence ([`store`]), cross-process
//! file locking ([`lock`]), VCS rename/delete detection ([`vcs`]), and
//! project/path resolution ([`project`]).

pub mod config;
pub mod fuzzy;
pub mod hash;
pub mod lock;
pub mod model;
pub mod project;
pub mod reconcile;
pub mod store;
pub mod text;
pub mod vcs;

pub use config::ReconcileConfig;
pub use fuzzy::{ContextRegion, MatchCandidate, SimilarityScore};
pub use hash::{content_hash, context_hash, hash_bytes, normalize_text};
pub use lock::{FileLock, LockMode};
pub use model::{
    Anchor, AnchorHealth, AuthorType, Comment, Decision, ReconciliationReport, SidecarFile, Thread,
    ThreadStatus,
};
pub use project::{find_project_root, normalize_path, sidecar_path, to_posix_relative};
pub use reconcile::{detect_and_move_all, move_sidecar, reconcile_anchor, reconcile_sidecar};
pub use store::{compute_source_hash, read_sidecar, write_sidecar, write_sidecar_with_retry};
pub use text::detect_binary;
pub use vcs::{FakeVcs, GitCli, Vcs};
