//! Project-root discovery and sidecar path mapping.

use std::path::{Path, PathBuf};

use crate::error::{CommentError, Result};

/// Directory under the project root where sidecars live, mirroring the
/// source tree.
pub const SIDECAR_DIR: &str = ".comments";

/// Walk upward from `start` looking for a `.git` entry (directory, for a
/// normal checkout, or file, for a worktree or submodule). Returns the
/// directory containing it.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut current = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir()?.join(start)
    };
    current = current
        .canonicalize()
        .map_err(|e| CommentError::IoFailure(format!("cannot resolve {}: {e}", start.display())))?;

    let mut dir = if current.is_dir() {
        current
    } else {
        current
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| CommentError::NotFound(format!("no parent for {}", start.display())))?
    };

    loop {
        if dir.join(".git").exists() {
            return Ok(dir);
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => {
                return Err(CommentError::NotARepository(format!(
                    "no .git found walking up from {}",
                    start.display()
                )))
            }
        }
    }
}

/// Resolve `path` relative to `root` and reject anything that would
/// escape `root` after symlink resolution.
pub fn normalize_path(root: &Path, path: &Path) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .map_err(|e| CommentError::IoFailure(format!("cannot resolve root {}: {e}", root.display())))?;

    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let resolved = if joined.exists() {
        joined
            .canonicalize()
            .map_err(|e| CommentError::IoFailure(format!("cannot resolve {}: {e}", joined.display())))?
    } else {
        // The file may not exist yet (a sidecar being created for the
        // first time); lexically normalize instead.
        lexically_normalize(&joined)
    };

    if !resolved.starts_with(&root) {
        return Err(CommentError::InvalidInput(format!(
            "path {} escapes project root {}",
            path.display(),
            root.display()
        )));
    }
    Ok(resolved)
}

fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Convert a path relative to `root` into its POSIX-separator string form,
/// as stored in sidecars and used for `.comments/` mirroring.
pub fn to_posix_relative(root: &Path, absolute: &Path) -> Result<String> {
    let rel = absolute.strip_prefix(root).map_err(|_| {
        CommentError::InvalidInput(format!(
            "{} is not under project root {}",
            absolute.display(),
            root.display()
        ))
    })?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Map a project-relative source path (POSIX-separated) to its sidecar
/// path under `.comments/`, preserving the source tree shape and
/// appending `.json`.
pub fn sidecar_path(root: &Path, source_relative: &str) -> PathBuf {
    let mut path = root.join(SIDECAR_DIR);
    for part in source_relative.split('/') {
        path.push(part);
    }
    path.set_extension(match path.extension() {
        Some(ext) => format!("{}.json", ext.to_string_lossy()),
        None => "json".to_string(),
    });
    path
}
