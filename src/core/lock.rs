//! Cross-host advisory file locking with exponential backoff.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{CommentError, Result};

/// Default deadline for acquiring a lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Cap on the exponential backoff between lock attempts.
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// Lock acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Multiple readers may hold the lock concurrently.
    Shared,
    /// Only one holder, excluding all other shared or exclusive holders.
    Exclusive,
}

/// A held advisory lock. Released on drop.
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire a lock on `path`, retrying with exponential backoff until
    /// `timeout` elapses.
    ///
    /// `path` is opened in append mode so acquiring a lock never truncates
    /// or otherwise disturbs its contents. Callers lock the very file they
    /// go on to replace by temp-write-then-rename (the sidecar JSON
    /// itself, not a separate `.lock` sibling); an already-open, locked
    /// file descriptor is unaffected by another process renaming a new
    /// inode over its path.
    pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CommentError::IoFailure(format!("opening lock file {}: {e}", path.display())))?;

        let start = Instant::now();
        let mut backoff = Duration::from_millis(10);

        loop {
            let attempt = match mode {
                LockMode::Shared => file.try_lock_shared(),
                LockMode::Exclusive => file.try_lock_exclusive(),
            };
            match attempt {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(_) if start.elapsed() >= timeout => {
                    tracing::warn!(path = %path.display(), ?mode, "lock timeout");
                    return Err(CommentError::LockTimeout {
                        path: path.display().to_string(),
                        timeout_secs: timeout.as_secs_f64(),
                    });
                }
                Err(_) => {
                    tracing::debug!(path = %path.display(), ?mode, backoff_ms = backoff.as_millis(), "lock busy, backing off");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    /// Path of the lock file this guard holds.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Best-effort: an error here just means the OS will release the
        // lock anyway when the fd closes.
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn exclusive_lock_excludes_concurrent_exclusive() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("sidecar.lock");

        let _held = FileLock::acquire(&lock_path, LockMode::Exclusive, DEFAULT_LOCK_TIMEOUT).unwrap();
        let second = FileLock::acquire(&lock_path, LockMode::Exclusive, Duration::from_millis(50));
        assert!(matches!(second, Err(CommentError::LockTimeout { .. })));
    }

    #[test]
    fn lock_released_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("sidecar.lock");

        {
            let _held = FileLock::acquire(&lock_path, LockMode::Exclusive, DEFAULT_LOCK_TIMEOUT).unwrap();
        }
        let second = FileLock::acquire(&lock_path, LockMode::Exclusive, Duration::from_millis(50));
        assert!(second.is_ok());
    }

    #[test]
    fn shared_locks_coexist() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("sidecar.lock");

        let _a = FileLock::acquire(&lock_path, LockMode::Shared, DEFAULT_LOCK_TIMEOUT).unwrap();
        let _b = FileLock::acquire(&lock_path, LockMode::Shared, Duration::from_millis(50));
        assert!(_b.is_ok());
    }

    #[test]
    fn concurrent_threads_serialize_through_exclusive_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("sidecar.lock");
        let flag = Arc::new(AtomicBool::new(false));

        let held = FileLock::acquire(&lock_path, LockMode::Exclusive, DEFAULT_LOCK_TIMEOUT).unwrap();
        let flag2 = Arc::clone(&flag);
        let lock_path2 = lock_path.clone();
        let handle = std::thread::spawn(move || {
            let _held = FileLock::acquire(&lock_path2, LockMode::Exclusive, Duration::from_secs(2)).unwrap();
            flag2.store(true, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(100));
        assert!(!flag.load(Ordering::SeqCst));
        drop(held);
        handle.join().unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }
}
