//! Data model: threads, comments, decisions, anchors, and the sidecar
//! envelope that persists them.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::core::hash::{content_hash, context_hash, validate_hash_format};
use crate::error::{CommentError, Result};

/// Maximum length, in characters, of a [`Anchor::content_snippet`].
const MAX_SNIPPET_CHARS: usize = 500;

/// Lifecycle state of a [`Thread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    /// Awaiting a decision.
    Open,
    /// Resolved with a recorded [`Decision`].
    Resolved,
    /// Explicitly declined; distinct from `Resolved` so a decision log can
    /// distinguish "we did it" from "we decided not to".
    #[serde(rename = "wontfix")]
    WontFix,
}

/// Who authored a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorType {
    /// A human reviewer.
    Human,
    /// An automated agent.
    Agent,
}

/// How well an anchor's recorded position still matches its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorHealth {
    /// Anchor content hash matches the source at its recorded position.
    Anchored,
    /// Anchor content was found elsewhere in the file; position updated.
    Drifted,
    /// Anchor content could not be relocated; original position retained
    /// as a best-effort placeholder.
    Orphaned,
}

/// A single immutable decision recorded when a thread is resolved or
/// marked won't-fix. Created once; never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Decision {
    /// Short human-readable summary of what was decided.
    pub summary: String,
    /// Name or identifier of whoever made the decision.
    pub decider: String,
    /// RFC 3339 UTC timestamp of when the decision was made.
    pub timestamp: String,
}

impl Decision {
    /// Construct a new decision with the given summary and decider at the
    /// current UTC time.
    pub fn new(summary: impl Into<String>, decider: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            decider: decider.into(),
            timestamp: utc_now(),
        }
    }

    fn validate(&self) -> Result<()> {
        validate_len("decision.summary", &self.summary, 1, 10_000)?;
        validate_len("decision.decider", &self.decider, 1, 200)?;
        validate_utc_timestamp("decision.timestamp", &self.timestamp)
    }
}

/// A single comment within a [`Thread`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Comment {
    /// ULID identifying this comment.
    pub id: String,
    /// Who wrote it.
    pub author: String,
    /// What kind of author wrote it.
    pub author_type: AuthorType,
    /// Comment body text.
    pub body: String,
    /// RFC 3339 UTC timestamp of creation.
    pub timestamp: String,
}

impl Comment {
    /// Construct a new comment with a freshly generated ULID and the
    /// current UTC timestamp.
    pub fn new(author: impl Into<String>, author_type: AuthorType, body: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            author: author.into(),
            author_type,
            body: body.into(),
            timestamp: utc_now(),
        }
    }

    fn validate(&self) -> Result<()> {
        validate_ulid("comment.id", &self.id)?;
        validate_len("comment.author", &self.author, 1, 200)?;
        validate_len("comment.body", &self.body, 1, 10_000)?;
        validate_utc_timestamp("comment.timestamp", &self.timestamp)
    }
}

/// A content/position fingerprint anchoring a thread to a range of lines
/// in a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Anchor {
    /// 1-indexed first line of the anchored range.
    pub line_start: usize,
    /// 1-indexed last line of the anchored range (inclusive).
    pub line_end: usize,
    /// `sha256:<hex>` hash of the anchored lines, NFC-normalized.
    pub content_hash: String,
    /// Human-readable excerpt of the anchored text, truncated to
    /// [`MAX_SNIPPET_CHARS`] characters (with an ellipsis marker) when
    /// longer.
    pub content_snippet: String,
    /// `sha256:<hex>` hash of the lines immediately before the anchor,
    /// NFC-normalized, at the time the anchor was created. Always
    /// present: the hash of the empty string when there is no context
    /// (the anchor starts at the top of the file).
    pub context_hash_before: String,
    /// `sha256:<hex>` hash of the lines immediately after the anchor.
    /// Always present, for the same reason as `context_hash_before`.
    pub context_hash_after: String,
    /// Current health of this anchor, updated by reconciliation.
    pub health: AnchorHealth,
    /// Absolute number of lines the anchor has drifted from its previous
    /// position. Always `>= 0`; `0` when `health` is `Anchored` or
    /// `Orphaned`.
    pub drift_distance: usize,
}

impl Anchor {
    /// Number of lines spanned by this anchor.
    pub fn line_count(&self) -> usize {
        self.line_end - self.line_start + 1
    }

    /// Build a fresh, healthy anchor over `lines[line_start..=line_end]`
    /// (1-indexed, inclusive), computing its content hash and the
    /// `context_lines`-line context hashes on either side.
    ///
    /// Errors with [`CommentError::InvalidInput`] if `line_start` is `0`,
    /// `line_end < line_start`, or `line_end` exceeds the source's line
    /// count.
    pub fn new(lines: &[String], line_start: usize, line_end: usize, context_lines: usize) -> Result<Self> {
        if line_start == 0 {
            return Err(CommentError::InvalidInput(
                "line_start must be >= 1".to_string(),
            ));
        }
        if line_end < line_start {
            return Err(CommentError::InvalidInput(format!(
                "line_end ({line_end}) must be >= line_start ({line_start})"
            )));
        }
        if line_end > lines.len() {
            return Err(CommentError::InvalidInput(format!(
                "line_end ({line_end}) exceeds source length ({})",
                lines.len()
            )));
        }

        let start0 = line_start - 1;
        let end0 = line_end - 1;
        let body = lines[start0..=end0].join("\n");

        let before_start = start0.saturating_sub(context_lines);
        let context_hash_before = context_hash(&lines[before_start..start0]);

        let after_start = (end0 + 1).min(lines.len());
        let after_end = (after_start + context_lines).min(lines.len());
        let context_hash_after = context_hash(&lines[after_start..after_end]);

        Ok(Self {
            line_start,
            line_end,
            content_hash: content_hash(&body),
            content_snippet: truncate_snippet(&body),
            context_hash_before,
            context_hash_after,
            health: AnchorHealth::Anchored,
            drift_distance: 0,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.line_start == 0 {
            return Err(CommentError::InvalidInput(
                "anchor.line_start must be >= 1".to_string(),
            ));
        }
        if self.line_end < self.line_start {
            return Err(CommentError::InvalidInput(format!(
                "anchor.line_end ({}) must be >= anchor.line_start ({})",
                self.line_end, self.line_start
            )));
        }
        validate_hash_format(&self.content_hash)?;
        validate_hash_format(&self.context_hash_before)?;
        validate_hash_format(&self.context_hash_after)?;
        validate_len("anchor.content_snippet", &self.content_snippet, 0, MAX_SNIPPET_CHARS)?;
        Ok(())
    }
}

fn truncate_snippet(text: &str) -> String {
    if text.chars().count() <= MAX_SNIPPET_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX_SNIPPET_CHARS - 1).collect();
    format!("{truncated}\u{2026}")
}

/// A comment thread anchored to a location in a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thread {
    /// ULID identifying this thread.
    pub id: String,
    /// Current lifecycle state.
    pub status: ThreadStatus,
    /// Anchor locating this thread within its source file.
    pub anchor: Anchor,
    /// Ordered list of comments, oldest first.
    pub comments: Vec<Comment>,
    /// Decision recorded when resolved or marked won't-fix. `None` while
    /// `status` is `Open` and has never been resolved.
    pub decision: Option<Decision>,
    /// RFC 3339 UTC timestamp of thread creation.
    pub created_at: String,
    /// RFC 3339 UTC timestamp of the most recent resolution, if any.
    /// Preserved across a reopen so history isn't lost.
    pub resolved_at: Option<String>,
}

impl Thread {
    /// Construct a new open thread anchored at `anchor`, seeded with one
    /// comment.
    pub fn new(anchor: Anchor, comment: Comment) -> Self {
        Self {
            id: Ulid::new().to_string(),
            status: ThreadStatus::Open,
            anchor,
            comments: vec![comment],
            decision: None,
            created_at: utc_now(),
            resolved_at: None,
        }
    }

    /// Append a comment to this thread.
    pub fn add_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    /// Mark this thread resolved with the given decision.
    ///
    /// Errors if the thread is already resolved or already won't-fix.
    pub fn resolve(&mut self, decision: Decision) -> Result<()> {
        if self.status != ThreadStatus::Open {
            return Err(CommentError::InvalidInput(format!(
                "thread {} is not open (status: {:?})",
                self.id, self.status
            )));
        }
        self.resolved_at = Some(decision.timestamp.clone());
        self.decision = Some(decision);
        self.status = ThreadStatus::Resolved;
        Ok(())
    }

    /// Mark this thread won't-fix with the given decision.
    ///
    /// Errors if the thread is already resolved or already won't-fix.
    pub fn wontfix(&mut self, decision: Decision) -> Result<()> {
        if self.status != ThreadStatus::Open {
            return Err(CommentError::InvalidInput(format!(
                "thread {} is not open (status: {:?})",
                self.id, self.status
            )));
        }
        self.resolved_at = Some(decision.timestamp.clone());
        self.decision = Some(decision);
        self.status = ThreadStatus::WontFix;
        Ok(())
    }

    /// Reopen a resolved or won't-fix thread.
    ///
    /// `decision` and `resolved_at` are preserved as history; errors if
    /// the thread is already open.
    pub fn reopen(&mut self) -> Result<()> {
        if self.status == ThreadStatus::Open {
            return Err(CommentError::InvalidInput(format!(
                "thread {} is already open",
                self.id
            )));
        }
        self.status = ThreadStatus::Open;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_ulid("thread.id", &self.id)?;
        self.anchor.validate()?;
        if self.comments.is_empty() {
            return Err(CommentError::InvalidInput(format!(
                "thread {} has no comments",
                self.id
            )));
        }
        for comment in &self.comments {
            comment.validate()?;
        }
        if let Some(decision) = &self.decision {
            decision.validate()?;
        }
        validate_utc_timestamp("thread.created_at", &self.created_at)?;
        if let Some(resolved_at) = &self.resolved_at {
            validate_utc_timestamp("thread.resolved_at", resolved_at)?;
        }
        Ok(())
    }
}

/// The on-disk envelope for all threads anchored to a single source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SidecarFile {
    /// Schema version, for forward-compatible migrations.
    pub schema_version: String,
    /// Path of the source file this sidecar anchors to, relative to the
    /// project root, using POSIX separators.
    pub source_file: String,
    /// `sha256:<hex>` hash of the source file's raw bytes at the time
    /// this sidecar was last written. Used for optimistic concurrency.
    pub source_hash: String,
    /// Threads anchored to this source file.
    pub threads: Vec<Thread>,
}

impl SidecarFile {
    /// Current schema version written by this crate.
    pub const CURRENT_VERSION: &'static str = "1.0";

    /// Construct a new, empty sidecar for `source_file` at `source_hash`.
    pub fn new(source_file: impl Into<String>, source_hash: impl Into<String>) -> Self {
        Self {
            schema_version: Self::CURRENT_VERSION.to_string(),
            source_file: source_file.into(),
            source_hash: source_hash.into(),
            threads: Vec::new(),
        }
    }

    /// Structurally validate every field and every thread it contains,
    /// beyond what deserialization alone checks: hash shapes, ULID
    /// lengths, line-range ordering, and UTC timestamp formatting.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version.is_empty() {
            return Err(CommentError::InvalidInput(
                "sidecar.schema_version must not be empty".to_string(),
            ));
        }
        if self.source_file.is_empty() {
            return Err(CommentError::InvalidInput(
                "sidecar.source_file must not be empty".to_string(),
            ));
        }
        validate_hash_format(&self.source_hash)?;
        for thread in &self.threads {
            thread.validate()?;
        }
        Ok(())
    }
}

/// A report describing the result of a bulk reconciliation pass over one
/// sidecar's threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Total number of threads reconciled.
    pub total_threads: usize,
    /// Threads whose anchor matched cleanly (no drift).
    pub anchored_count: usize,
    /// Threads whose anchor was relocated with nonzero drift.
    pub drifted_count: usize,
    /// Threads whose anchor could not be relocated.
    pub orphaned_count: usize,
    /// Largest `drift_distance` observed across all threads.
    pub max_drift_distance: usize,
    /// `sidecar.source_hash` before this reconciliation pass.
    pub source_hash_before: String,
    /// The source file's hash as of this reconciliation pass. Equals
    /// `source_hash_before` exactly when no reconciliation was needed.
    pub source_hash_after: String,
}

impl ReconciliationReport {
    /// Summarize a reconciled sidecar's threads into report counts, given
    /// the source hash observed before and after the pass.
    pub fn summarize(
        threads: &[Thread],
        source_hash_before: impl Into<String>,
        source_hash_after: impl Into<String>,
    ) -> Self {
        let mut report = Self {
            total_threads: threads.len(),
            anchored_count: 0,
            drifted_count: 0,
            orphaned_count: 0,
            max_drift_distance: 0,
            source_hash_before: source_hash_before.into(),
            source_hash_after: source_hash_after.into(),
        };
        for thread in threads {
            match thread.anchor.health {
                AnchorHealth::Anchored => report.anchored_count += 1,
                AnchorHealth::Drifted => report.drifted_count += 1,
                AnchorHealth::Orphaned => report.orphaned_count += 1,
            }
            report.max_drift_distance = report.max_drift_distance.max(thread.anchor.drift_distance);
        }
        report
    }
}

fn utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn validate_len(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(CommentError::InvalidInput(format!(
            "{field} length {len} outside [{min}, {max}]"
        )));
    }
    Ok(())
}

fn validate_ulid(field: &str, value: &str) -> Result<()> {
    if value.len() != 26 || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CommentError::InvalidInput(format!(
            "{field} {value:?} is not a 26-character ULID"
        )));
    }
    Ok(())
}

fn validate_utc_timestamp(field: &str, value: &str) -> Result<()> {
    if !value.ends_with('Z') {
        return Err(CommentError::InvalidInput(format!(
            "{field} {value:?} is not a UTC timestamp ending in Z"
        )));
    }
    chrono::DateTime::parse_from_rfc3339(value).map_err(|e| {
        CommentError::InvalidInput(format!("{field} {value:?} is not a valid RFC 3339 timestamp: {e}"))
    })?;
    Ok(())
}
