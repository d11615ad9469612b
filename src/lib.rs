//! anchorthread - file-native comment-thread anchoring and reconciliation.
//!
//! Discussion threads anchored to line ranges of source files, stored in
//! JSON sidecars alongside the source tree, that survive edits via a
//! multi-strategy reconciliation engine: exact relocation, context-hash
//! localization, and fuzzy sliding-window search. See [`core`] for the
//! engine; [`error`] for the closed error taxonomy every operation
//! returns.
//!
//! This crate is the anchoring/reconciliation engine only — the CLI
//! surface, the agent-tool protocol, a decision-log generator, and a
//! file-watcher dashboard are external collaborators built on top of it.

#![deny(missing_docs)]

pub mod core;
pub mod error;
