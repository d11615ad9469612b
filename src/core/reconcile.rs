//! Anchor reconciliation: relocate a thread's anchor against the current
//! contents of its source file using a cascade of increasingly loose
//! strategies, and sweep sidecars for moved/renamed/deleted sources.

use std::fs;
use std::path::Path;

use crate::core::config::ReconcileConfig;
use crate::core::fuzzy::find_best_match_with_context;
use crate::core::hash::{content_hash, hash_bytes, CONTEXT_LINES};
use crate::core::model::{Anchor, AnchorHealth, ReconciliationReport};
use crate::core::store::{read_sidecar, write_sidecar};
use crate::core::vcs::Vcs;
use crate::error::Result;

/// Relocate a single anchor against the current `lines` of its source
/// file (1-indexed throughout), trying strategies from
/// cheapest/most-precise to most-expensive:
///
/// 1. Exact match at the anchor's recorded position.
/// 2. Exact match anywhere else in the file.
/// 3. Fuzzy match, localized by the recorded context hashes where
///    possible, falling back to a full sliding-window search.
/// 4. Orphan: the original position is kept, marked unhealthy.
///
/// In every path the returned anchor's `content_hash`, context hashes,
/// and `content_snippet` are carried over from `anchor` verbatim.
pub fn reconcile_anchor(anchor: &Anchor, lines: &[String], config: &ReconcileConfig) -> Anchor {
    if let Some(result) = try_exact_at_position(anchor, lines) {
        return result;
    }
    if let Some(result) = try_exact_elsewhere(anchor, lines) {
        return result;
    }
    if let Some(result) = try_fuzzy(anchor, lines, config) {
        return result;
    }
    orphan(anchor)
}

/// Borrow `lines[line_start..=line_end]` (both 1-indexed, inclusive),
/// or `None` if the range no longer fits inside `lines`.
fn line_span(lines: &[String], line_start: usize, line_end: usize) -> Option<&[String]> {
    if line_start == 0 || line_end < line_start || line_end > lines.len() {
        return None;
    }
    Some(&lines[line_start - 1..line_end])
}

fn try_exact_at_position(anchor: &Anchor, lines: &[String]) -> Option<Anchor> {
    let span = line_span(lines, anchor.line_start, anchor.line_end)?;
    if content_hash(&span.join("\n")) == anchor.content_hash {
        Some(relocated(anchor, anchor.line_start, anchor.line_end, AnchorHealth::Anchored, 0))
    } else {
        None
    }
}

fn try_exact_elsewhere(anchor: &Anchor, lines: &[String]) -> Option<Anchor> {
    let needle_len = anchor.line_count();
    if needle_len == 0 || needle_len > lines.len() {
        return None;
    }
    for start0 in 0..=(lines.len() - needle_len) {
        let end0 = start0 + needle_len - 1;
        if content_hash(&lines[start0..=end0].join("\n")) == anchor.content_hash {
            let new_start = start0 + 1;
            let new_end = end0 + 1;
            let drift = new_start.abs_diff(anchor.line_start);
            return Some(relocated(anchor, new_start, new_end, AnchorHealth::Anchored, drift));
        }
    }
    None
}

/// Fuzzy relocation: context-based localization first, falling back to a
/// full sliding-window search, per [`find_best_match_with_context`]. Both
/// paths always mark the anchor `Drifted` — reaching this strategy means
/// the content no longer matches its original position exactly.
fn try_fuzzy(anchor: &Anchor, lines: &[String], config: &ReconcileConfig) -> Option<Anchor> {
    let needle_lines: Vec<String> = anchor.content_snippet.split('\n').map(str::to_string).collect();
    let candidate = find_best_match_with_context(
        lines,
        &needle_lines,
        &anchor.context_hash_before,
        &anchor.context_hash_after,
        CONTEXT_LINES,
        anchor.line_start,
        config.context_window,
        config.fallback_window,
        config.threshold,
    )?;
    let drift = candidate.line_start.abs_diff(anchor.line_start);
    Some(relocated(anchor, candidate.line_start, candidate.line_end, AnchorHealth::Drifted, drift))
}

fn relocated(anchor: &Anchor, line_start: usize, line_end: usize, health: AnchorHealth, drift: usize) -> Anchor {
    Anchor {
        line_start,
        line_end,
        health,
        drift_distance: drift,
        ..anchor.clone()
    }
}

fn orphan(anchor: &Anchor) -> Anchor {
    Anchor {
        health: AnchorHealth::Orphaned,
        drift_distance: 0,
        ..anchor.clone()
    }
}

/// Reconcile every thread in the sidecar at `sidecar_path` against the
/// current contents of `source_path`, writing the updated sidecar
/// atomically and returning a report of what changed.
///
/// If the source file's hash is unchanged since the sidecar was last
/// written, this short-circuits with a report summarizing the
/// already-stored health values and makes no write.
pub fn reconcile_sidecar(
    sidecar_path: &Path,
    source_path: &Path,
    config: &ReconcileConfig,
) -> Result<ReconciliationReport> {
    let mut sidecar = read_sidecar(sidecar_path)?;
    let source_bytes = fs::read(source_path)?;
    let source_hash_before = sidecar.source_hash.clone();
    let source_hash_after = hash_bytes(&source_bytes);

    if source_hash_after == source_hash_before {
        return Ok(ReconciliationReport::summarize(
            &sidecar.threads,
            source_hash_before,
            source_hash_after,
        ));
    }

    let lines: Vec<String> = String::from_utf8_lossy(&source_bytes)
        .lines()
        .map(str::to_string)
        .collect();

    for thread in &mut sidecar.threads {
        thread.anchor = reconcile_anchor(&thread.anchor, &lines, config);
    }
    sidecar.source_hash = source_hash_after.clone();

    write_sidecar(sidecar_path, &sidecar, Some(source_path), true, config.lock_timeout)?;

    Ok(ReconciliationReport::summarize(
        &sidecar.threads,
        source_hash_before,
        source_hash_after,
    ))
}

/// Sweep every sidecar under `comments_dir` whose source file is missing,
/// attempting rename detection via `vcs` and moving the sidecar to track
/// its source's new location. Returns the list of `(old, new)` relative
/// paths actually moved.
///
/// After each move, empty ancestor directories under `comments_dir` left
/// behind by the old sidecar's location are removed, walking upward until
/// a non-empty directory (or `comments_dir` itself) is reached.
pub fn detect_and_move_all(
    project_root: &Path,
    comments_dir: &Path,
    vcs: &dyn Vcs,
) -> Result<Vec<(String, String)>> {
    let mut moved = Vec::new();
    if !comments_dir.is_dir() {
        return Ok(moved);
    }

    for entry in walk_json_files(comments_dir) {
        let sidecar = match read_sidecar(&entry) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let source_path = project_root.join(&sidecar.source_file);
        if source_path.exists() {
            continue;
        }

        // A VCS-level error here (tool unavailable, not a repository) is a
        // degrade-gracefully case, not a sweep-aborting one: skip rename
        // detection for this sidecar and move on to the next.
        let renamed_to = match vcs.detect_rename(project_root, &sidecar.source_file) {
            Ok(renamed_to) => renamed_to,
            Err(_) => continue,
        };
        let Some(new_relative) = renamed_to else {
            continue;
        };

        let new_sidecar_path = crate::core::project::sidecar_path(project_root, &new_relative);
        move_sidecar(&entry, &new_sidecar_path, &new_relative, comments_dir)?;
        moved.push((sidecar.source_file.clone(), new_relative));
    }

    Ok(moved)
}

/// Relocate the sidecar at `old_path` to `new_path`, rewriting its
/// `source_file` field to `new_source_relative`, via the same atomic
/// temp-write + rename discipline as any other sidecar write.
pub fn move_sidecar(
    old_path: &Path,
    new_path: &Path,
    new_source_relative: &str,
    comments_dir: &Path,
) -> Result<()> {
    let mut sidecar = read_sidecar(old_path)?;
    sidecar.source_file = new_source_relative.to_string();

    if let Some(parent) = new_path.parent() {
        fs::create_dir_all(parent)?;
    }
    // No source-hash check here: we're relocating a sidecar to follow a
    // detected rename, not validating its content against a source file
    // that may not even be readable yet under its new name.
    write_sidecar(new_path, &sidecar, None, true, crate::core::lock::DEFAULT_LOCK_TIMEOUT)?;
    fs::remove_file(old_path)?;

    cleanup_empty_ancestors(old_path, comments_dir);
    Ok(())
}

fn cleanup_empty_ancestors(removed_file: &Path, stop_at: &Path) {
    let mut dir = match removed_file.parent() {
        Some(d) => d.to_path_buf(),
        None => return,
    };
    while dir != stop_at && dir.starts_with(stop_at) {
        match fs::read_dir(&dir) {
            Ok(mut entries) if entries.next().is_none() => {
                if fs::remove_dir(&dir).is_err() {
                    break;
                }
                match dir.parent() {
                    Some(p) => dir = p.to_path_buf(),
                    None => break,
                }
            }
            _ => break,
        }
    }
}

fn walk_json_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                out.push(path);
            }
        }
    }
    out
}
