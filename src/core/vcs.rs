//! Version-control rename and deletion detection.
//!
//! Subprocess invocations are isolated behind the [`Vcs`] trait so
//! reconciliation logic can be tested without a real git checkout,
//! separating "shell out to `git`" from the code that consumes its output.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::error::{CommentError, Result};

/// Upper bound on how many rename hops [`Vcs::detect_rename`] will follow
/// before giving up, to bound pathological rename chains.
pub const MAX_RENAME_CHAIN: usize = 10;

/// Default timeout for a single git subprocess invocation.
pub const DEFAULT_SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the rename-history scan, which walks the full log and
/// legitimately takes longer than a status check.
pub const RENAME_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Version-control operations needed for sidecar reconciliation: is a
/// path still tracked, was it renamed, was it deleted.
pub trait Vcs {
    /// Whether the git CLI is present and usable on this host.
    fn is_available(&self) -> bool;

    /// Whether `root` is (or is inside) a git repository.
    fn is_repository(&self, root: &Path) -> bool;

    /// Follow the rename history of `relative_path` (POSIX-separated,
    /// relative to `root`) forward to its current name, if it still
    /// exists under a different name. Returns `None` if the path was not
    /// renamed, or if it was deleted rather than renamed.
    fn detect_rename(&self, root: &Path, relative_path: &str) -> Result<Option<String>>;

    /// Whether `relative_path` was deleted at some point in the
    /// repository's history and does not currently exist at its own
    /// literal path (the caller should check renames first).
    fn is_deleted(&self, root: &Path, relative_path: &str) -> Result<bool>;
}

/// Production [`Vcs`] implementation: shells out to the `git` CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl Vcs for GitCli {
    fn is_available(&self) -> bool {
        run_git(Path::new("."), &["--version"], DEFAULT_SUBPROCESS_TIMEOUT)
            .map(|out| out.status_success)
            .unwrap_or(false)
    }

    fn is_repository(&self, root: &Path) -> bool {
        run_git(root, &["rev-parse", "--is-inside-work-tree"], DEFAULT_SUBPROCESS_TIMEOUT)
            .map(|out| out.status_success)
            .unwrap_or(false)
    }

    fn detect_rename(&self, root: &Path, relative_path: &str) -> Result<Option<String>> {
        if Path::new(relative_path).is_absolute() {
            return Err(CommentError::InvalidInput(format!(
                "path must be repo-relative: {relative_path}"
            )));
        }

        let output = run_git(
            root,
            &[
                "log",
                "--all",
                "--diff-filter=R",
                "--name-status",
                "--pretty=format:",
                "--find-renames",
            ],
            RENAME_SCAN_TIMEOUT,
        )?;
        if !output.status_success {
            return Err(CommentError::VcsUnavailable(
                "git rename scan failed".to_string(),
            ));
        }

        let rename_map = parse_rename_map(&output.stdout);
        let mut current = relative_path.to_string();
        let mut hops = 0;
        let mut changed = false;
        while let Some(next) = rename_map.get(current.as_str()) {
            if hops >= MAX_RENAME_CHAIN {
                break;
            }
            current = next.clone();
            changed = true;
            hops += 1;
        }

        if !changed {
            return Ok(None);
        }
        if root.join(&current).exists() {
            Ok(Some(current))
        } else {
            Ok(None)
        }
    }

    fn is_deleted(&self, root: &Path, relative_path: &str) -> Result<bool> {
        if root.join(relative_path).exists() {
            return Ok(false);
        }
        if let Some(renamed_to) = self.detect_rename(root, relative_path)? {
            if root.join(&renamed_to).exists() {
                return Ok(false);
            }
        }
        let output = run_git(
            root,
            &["log", "--all", "--oneline", "--", relative_path],
            DEFAULT_SUBPROCESS_TIMEOUT,
        )?;
        Ok(output.status_success && !output.stdout.trim().is_empty())
    }
}

/// Parse `git log --name-status --diff-filter=R` output into an
/// old-path -> new-path map. Each rename entry looks like:
/// `R100\told/path\tnew/path`
fn parse_rename_map(stdout: &str) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for line in stdout.lines() {
        let mut fields = line.split('\t');
        let Some(status) = fields.next() else { continue };
        if !status.starts_with('R') {
            continue;
        }
        let (Some(old), Some(new)) = (fields.next(), fields.next()) else {
            continue;
        };
        // Keep only the most recent rename seen for a given old path;
        // `git log` without `--reverse` yields newest-first, so the
        // first occurrence wins.
        map.entry(old.to_string()).or_insert_with(|| new.to_string());
    }
    map
}

struct GitOutput {
    status_success: bool,
    stdout: String,
}

fn run_git(root: &Path, args: &[&str], timeout: Duration) -> Result<GitOutput> {
    tracing::debug!(?args, root = %root.display(), "running git");
    let mut child = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CommentError::VcsUnavailable(format!("spawning git: {e}")))?;

    let start = std::time::Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                use std::io::Read;
                let mut stdout = String::new();
                if let Some(mut out) = child.stdout.take() {
                    let _ = out.read_to_string(&mut stdout);
                }
                return Ok(GitOutput {
                    status_success: status.success(),
                    stdout,
                });
            }
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommentError::VcsUnavailable(format!(
                        "git {args:?} timed out after {:.1}s",
                        timeout.as_secs_f64()
                    )));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => return Err(CommentError::VcsUnavailable(format!("waiting on git: {e}"))),
        }
    }
}

/// A test double for [`Vcs`] with scripted responses, avoiding any real
/// subprocess invocation in unit tests.
#[derive(Debug, Default, Clone)]
pub struct FakeVcs {
    /// Whether [`Vcs::is_available`] reports the tool present.
    pub available: bool,
    /// Whether [`Vcs::is_repository`] reports a git repository.
    pub repository: bool,
    /// Scripted rename chain: old path -> new path, one hop at a time.
    pub renames: std::collections::HashMap<String, String>,
    /// Paths that should report as deleted.
    pub deleted: std::collections::HashSet<String>,
    /// Existing paths, for rename-chain termination checks.
    pub existing: std::collections::HashSet<PathBuf>,
    /// When `true`, `detect_rename` and `is_deleted` fail with
    /// [`CommentError::VcsUnavailable`] instead of consulting the scripted
    /// state, simulating a missing `git` binary.
    pub fail_unavailable: bool,
}

impl Vcs for FakeVcs {
    fn is_available(&self) -> bool {
        self.available
    }

    fn is_repository(&self, _root: &Path) -> bool {
        self.repository
    }

    fn detect_rename(&self, root: &Path, relative_path: &str) -> Result<Option<String>> {
        if self.fail_unavailable {
            return Err(CommentError::VcsUnavailable("git not found (faked)".to_string()));
        }
        let mut current = relative_path.to_string();
        let mut hops = 0;
        let mut changed = false;
        while let Some(next) = self.renames.get(current.as_str()) {
            if hops >= MAX_RENAME_CHAIN {
                break;
            }
            current = next.clone();
            changed = true;
            hops += 1;
        }
        if !changed {
            return Ok(None);
        }
        if self.existing.contains(&root.join(&current)) {
            Ok(Some(current))
        } else {
            Ok(None)
        }
    }

    fn is_deleted(&self, _root: &Path, relative_path: &str) -> Result<bool> {
        if self.fail_unavailable {
            return Err(CommentError::VcsUnavailable("git not found (faked)".to_string()));
        }
        Ok(self.deleted.contains(relative_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rename_map_reads_name_status() {
        let stdout = "R100\told.rs\tnew.rs\nR090\tfoo.rs\tbar.rs\n";
        let map = parse_rename_map(stdout);
        assert_eq!(map.get("old.rs"), Some(&"new.rs".to_string()));
        assert_eq!(map.get("foo.rs"), Some(&"bar.rs".to_string()));
    }

    #[test]
    fn fake_vcs_follows_rename_chain() {
        let mut vcs = FakeVcs {
            repository: true,
            ..Default::default()
        };
        vcs.renames.insert("a.rs".into(), "b.rs".into());
        vcs.renames.insert("b.rs".into(), "c.rs".into());
        vcs.existing.insert(PathBuf::from("/proj/c.rs"));

        let result = vcs.detect_rename(Path::new("/proj"), "a.rs").unwrap();
        assert_eq!(result, Some("c.rs".to_string()));
    }

    #[test]
    fn fake_vcs_rename_chain_stops_if_final_missing() {
        let mut vcs = FakeVcs::default();
        vcs.renames.insert("a.rs".into(), "b.rs".into());
        let result = vcs.detect_rename(Path::new("/proj"), "a.rs").unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn fake_vcs_reports_deleted() {
        let mut vcs = FakeVcs::default();
        vcs.deleted.insert("gone.rs".to_string());
        assert!(vcs.is_deleted(Path::new("/proj"), "gone.rs").unwrap());
        assert!(!vcs.is_deleted(Path::new("/proj"), "still_here.rs").unwrap());
    }

    #[test]
    fn rename_chain_bounded() {
        let mut vcs = FakeVcs::default();
        for i in 0..20 {
            vcs.renames.insert(format!("f{i}.rs"), format!("f{}.rs", i + 1));
        }
        vcs.existing.insert(PathBuf::from("/proj/f20.rs"));
        // More than MAX_RENAME_CHAIN hops separate f0 from f20, so the
        // chain should stop early and not find the final file.
        let result = vcs.detect_rename(Path::new("/proj"), "f0.rs").unwrap();
        assert_eq!(result, None);
    }
}
