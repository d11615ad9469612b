//! Atomic, optimistically-concurrent sidecar persistence.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::core::hash::hash_bytes;
use crate::core::lock::{FileLock, LockMode, DEFAULT_LOCK_TIMEOUT};
use crate::core::model::SidecarFile;
use crate::core::text::detect_binary;
use crate::error::{CommentError, Result};

/// Default number of retries for [`write_sidecar_with_retry`].
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Hash the raw bytes of a source file.
///
/// Errors with [`CommentError::UnsupportedContent`] if the file looks
/// binary (NUL byte in the first 8192 bytes), and with
/// [`CommentError::NotFound`] if it does not exist.
pub fn compute_source_hash(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(CommentError::NotFound(format!(
            "source file {} does not exist",
            path.display()
        )));
    }
    let bytes = fs::read(path)?;
    if detect_binary(&bytes) {
        return Err(CommentError::UnsupportedContent(format!(
            "{} appears to be binary",
            path.display()
        )));
    }
    Ok(hash_bytes(&bytes))
}

/// Read and parse a sidecar file.
///
/// Distinguishes a missing sidecar ([`CommentError::NotFound`]) from a
/// malformed one ([`CommentError::InvalidInput`]).
pub fn read_sidecar(path: &Path) -> Result<SidecarFile> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CommentError::NotFound(format!("sidecar {} not found", path.display()))
        } else {
            CommentError::IoFailure(format!("reading sidecar {}: {e}", path.display()))
        }
    })?;
    serde_json::from_str(&content)
        .map_err(|e| CommentError::InvalidInput(format!("malformed sidecar {}: {e}", path.display())))
}

/// Write a sidecar atomically: optional optimistic-concurrency check
/// against the current source hash, deterministic JSON serialization,
/// write-to-temp-then-rename, all under an exclusive file lock.
///
/// If `expected_source_hash` is `Some` and the source file exists with a
/// different hash than the sidecar's own `source_hash` field, this
/// returns [`CommentError::ConcurrencyConflict`] without writing.
pub fn write_sidecar(
    sidecar_path: &Path,
    sidecar: &SidecarFile,
    source_path: Option<&Path>,
    acquire_lock: bool,
    timeout: Duration,
) -> Result<()> {
    let _lock = if acquire_lock {
        if let Some(parent) = sidecar_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Some(FileLock::acquire(sidecar_path, LockMode::Exclusive, timeout)?)
    } else {
        None
    };

    if let Some(source) = source_path {
        if source.is_file() {
            let actual = compute_source_hash(source)?;
            if actual != sidecar.source_hash {
                return Err(CommentError::ConcurrencyConflict {
                    path: sidecar_path.display().to_string(),
                    expected: sidecar.source_hash.clone(),
                    actual,
                });
            }
        }
    }

    let json = to_deterministic_json(sidecar)?;

    let parent = sidecar_path
        .parent()
        .ok_or_else(|| CommentError::InvalidInput(format!("no parent for {}", sidecar_path.display())))?;
    fs::create_dir_all(parent)?;

    let tmp_path = temp_path_in(parent)?;
    let write_result = fs::write(&tmp_path, json.as_bytes());
    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(CommentError::IoFailure(format!(
            "writing temp sidecar {}: {e}",
            tmp_path.display()
        )));
    }
    if let Err(e) = fs::rename(&tmp_path, sidecar_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(CommentError::IoFailure(format!(
            "renaming temp sidecar into place at {}: {e}",
            sidecar_path.display()
        )));
    }
    tracing::debug!(path = %sidecar_path.display(), "wrote sidecar");
    Ok(())
}

/// Write a sidecar, retrying up to `max_retries` times when a concurrent
/// writer produced a [`CommentError::ConcurrencyConflict`].
///
/// `rebase` is called with the freshly re-read sidecar and the conflicting
/// source hash after each conflict, and must return an updated sidecar to
/// retry with (e.g. by re-running reconciliation against the new source).
pub fn write_sidecar_with_retry(
    sidecar_path: &Path,
    mut sidecar: SidecarFile,
    source_path: Option<&Path>,
    max_retries: u32,
    timeout: Duration,
    mut rebase: impl FnMut(SidecarFile) -> Result<SidecarFile>,
) -> Result<()> {
    let mut attempts = 0;
    loop {
        match write_sidecar(sidecar_path, &sidecar, source_path, true, timeout) {
            Ok(()) => return Ok(()),
            Err(CommentError::ConcurrencyConflict { .. }) if attempts < max_retries => {
                attempts += 1;
                tracing::debug!(attempt = attempts, "sidecar write conflict, retrying");
                sidecar = rebase(sidecar)?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Create a uniquely-named temp file in `dir`, returning its path. The
/// caller is responsible for writing to it and renaming it into place.
fn temp_path_in(dir: &Path) -> Result<PathBuf> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let pid = std::process::id();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    Ok(dir.join(format!(".tmp_{pid}_{n}.json")))
}

/// Serialize a sidecar deterministically: sorted object keys, 2-space
/// indent, POSIX path separators, non-ASCII preserved, trailing newline.
fn to_deterministic_json(sidecar: &SidecarFile) -> Result<String> {
    let value = serde_json::to_value(sidecar)
        .map_err(|e| CommentError::InvalidInput(format!("serializing sidecar: {e}")))?;
    let sorted = sort_keys(value);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(&sorted, &mut ser)
        .map_err(|e| CommentError::InvalidInput(format!("serializing sidecar: {e}")))?;
    let mut out = String::from_utf8(buf).expect("serde_json output is always valid utf-8");
    out.push('\n');
    Ok(out)
}

/// Recursively sort object keys so serialization is byte-for-byte
/// deterministic regardless of struct field order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::SidecarFile;

    #[test]
    fn roundtrip_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let sidecar_path = tmp.path().join(".comments/src/main.rs.json");
        let sidecar = SidecarFile::new("src/main.rs", "sha256:abc");

        write_sidecar(&sidecar_path, &sidecar, None, true, DEFAULT_LOCK_TIMEOUT).unwrap();
        let back = read_sidecar(&sidecar_path).unwrap();
        assert_eq!(sidecar, back);
    }

    #[test]
    fn deterministic_json_is_sorted_and_stable() {
        let sidecar = SidecarFile::new("src/main.rs", "sha256:abc");
        let a = to_deterministic_json(&sidecar).unwrap();
        let b = to_deterministic_json(&sidecar).unwrap();
        assert_eq!(a, b);
        assert!(a.ends_with('\n'));
    }

    #[test]
    fn write_rejects_stale_source_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let source_path = tmp.path().join("main.rs");
        fs::write(&source_path, "fn main() {}\n").unwrap();
        let actual_hash = compute_source_hash(&source_path).unwrap();

        let sidecar_path = tmp.path().join(".comments/main.rs.json");
        let stale_sidecar = SidecarFile::new("main.rs", "sha256:0000000000000000000000000000000000000000000000000000000000000000");
        let _ = actual_hash;

        let result = write_sidecar(&sidecar_path, &stale_sidecar, Some(&source_path), true, DEFAULT_LOCK_TIMEOUT);
        assert!(matches!(result, Err(CommentError::ConcurrencyConflict { .. })));
    }

    #[test]
    fn write_accepts_matching_source_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let source_path = tmp.path().join("main.rs");
        fs::write(&source_path, "fn main() {}\n").unwrap();
        let hash = compute_source_hash(&source_path).unwrap();

        let sidecar_path = tmp.path().join(".comments/main.rs.json");
        let sidecar = SidecarFile::new("main.rs", hash);
        let result = write_sidecar(&sidecar_path, &sidecar, Some(&source_path), true, DEFAULT_LOCK_TIMEOUT);
        assert!(result.is_ok());
    }

    #[test]
    fn compute_source_hash_rejects_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bin.dat");
        fs::write(&path, [0u8, 1, 2, 3]).unwrap();
        let result = compute_source_hash(&path);
        assert!(matches!(result, Err(CommentError::UnsupportedContent(_))));
    }

    #[test]
    fn compute_source_hash_missing_file_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.rs");
        assert!(matches!(compute_source_hash(&path), Err(CommentError::NotFound(_))));
    }

    #[test]
    fn read_missing_sidecar_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".comments/missing.json");
        assert!(matches!(read_sidecar(&path), Err(CommentError::NotFound(_))));
    }

    #[test]
    fn read_malformed_sidecar_invalid_input() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_sidecar(&path), Err(CommentError::InvalidInput(_))));
    }

    #[test]
    fn retry_helper_converges_after_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let source_path = tmp.path().join("main.rs");
        fs::write(&source_path, "fn main() { v1() }\n").unwrap();

        let sidecar_path = tmp.path().join(".comments/main.rs.json");
        let stale = SidecarFile::new("main.rs", "sha256:0000000000000000000000000000000000000000000000000000000000000000");

        let mut rebase_calls = 0;
        let result = write_sidecar_with_retry(
            &sidecar_path,
            stale,
            Some(&source_path),
            DEFAULT_MAX_RETRIES,
            DEFAULT_LOCK_TIMEOUT,
            |_old| {
                rebase_calls += 1;
                let fresh_hash = compute_source_hash(&source_path).unwrap();
                Ok(SidecarFile::new("main.rs", fresh_hash))
            },
        );
        assert!(result.is_ok());
        assert_eq!(rebase_calls, 1);
    }

    proptest::proptest! {
        #[test]
        fn deterministic_json_is_stable_across_repeated_serialization(
            source_file in "[a-z/]{1,30}\\.rs",
        ) {
            let sidecar = SidecarFile::new(source_file, "sha256:abc");
            let a = to_deterministic_json(&sidecar).unwrap();
            let b = to_deterministic_json(&sidecar).unwrap();
            proptest::prop_assert_eq!(a, b);
        }

        #[test]
        fn write_then_read_roundtrips_for_arbitrary_source_names(
            source_file in "[a-z][a-z0-9_/]{0,30}\\.rs",
        ) {
            let tmp = tempfile::tempdir().unwrap();
            let sidecar_path = tmp.path().join(".comments").join(format!("{source_file}.json"));
            let sidecar = SidecarFile::new(source_file, "sha256:abc");
            write_sidecar(&sidecar_path, &sidecar, None, true, DEFAULT_LOCK_TIMEOUT).unwrap();
            let back = read_sidecar(&sidecar_path).unwrap();
            proptest::prop_assert_eq!(sidecar, back);
        }
    }
}
