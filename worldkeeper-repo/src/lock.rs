//! Stale `index.lock` handling.
//!
//! A crash mid-snapshot can leave git's index lock behind, after which every
//! later snapshot fails. Whether to clear it automatically is the host's
//! call; an unexpected lock may also mean another process is live.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{io_err, RepoError};

const INDEX_LOCK: &str = "index.lock";

/// Outcome of the pre-snapshot lock check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleLock {
    /// No lock file present.
    Clear,
    /// A lock file was present and removed.
    Removed(PathBuf),
    /// A lock file is present and removal is not enabled; the caller should
    /// warn and proceed (the next repository write will fail if the lock is
    /// actually held).
    Present(PathBuf),
}

/// Check for a leftover index lock, removing it when `remove` is set.
pub fn clear_stale_index_lock(git_dir: &Path, remove: bool) -> Result<StaleLock, RepoError> {
    let lock = git_dir.join(INDEX_LOCK);
    if !lock.exists() {
        return Ok(StaleLock::Clear);
    }
    if !remove {
        tracing::warn!(
            "index lock present at {}; another snapshot may be running, \
             or enable stale-lock removal if this is a crash leftover",
            lock.display()
        );
        return Ok(StaleLock::Present(lock));
    }
    fs::remove_file(&lock).map_err(|e| io_err(lock.clone(), e))?;
    tracing::warn!("removed stale index lock at {}", lock.display());
    Ok(StaleLock::Removed(lock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_lock_is_clear() {
        let dir = TempDir::new().expect("dir");
        assert_eq!(
            clear_stale_index_lock(dir.path(), false).expect("check"),
            StaleLock::Clear
        );
    }

    #[test]
    fn present_lock_is_reported_but_kept_without_removal() {
        let dir = TempDir::new().expect("dir");
        let lock = dir.path().join(INDEX_LOCK);
        fs::write(&lock, b"").expect("write");
        assert_eq!(
            clear_stale_index_lock(dir.path(), false).expect("check"),
            StaleLock::Present(lock.clone())
        );
        assert!(lock.exists());
    }

    #[test]
    fn present_lock_removed_when_allowed() {
        let dir = TempDir::new().expect("dir");
        let lock = dir.path().join(INDEX_LOCK);
        fs::write(&lock, b"").expect("write");
        assert_eq!(
            clear_stale_index_lock(dir.path(), true).expect("check"),
            StaleLock::Removed(lock.clone())
        );
        assert!(!lock.exists());
    }
}
