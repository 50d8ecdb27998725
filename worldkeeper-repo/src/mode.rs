//! Persistence of the backend mode a tree was first snapshotted with.
//!
//! The two backends produce compatible object stores, but LFS pointer files
//! do not survive a silent switch. Once snapshots exist the recorded mode
//! wins over configuration.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use worldkeeper_core::identity::STATE_DIR;
use worldkeeper_core::types::BackendMode;

use crate::error::{io_err, RepoError};

const META_FILE: &str = "repo.yaml";

/// Repository metadata stored next to the identity file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoMeta {
    pub mode: BackendMode,
    pub created_at: DateTime<Utc>,
}

impl RepoMeta {
    pub fn new(mode: BackendMode) -> Self {
        Self {
            mode,
            created_at: Utc::now(),
        }
    }
}

/// Path of the metadata file for a work tree.
pub fn meta_path(work_dir: &Path) -> PathBuf {
    work_dir.join(STATE_DIR).join(META_FILE)
}

/// Load persisted metadata, `None` when the tree was never snapshotted.
pub fn load(work_dir: &Path) -> Result<Option<RepoMeta>, RepoError> {
    let path = meta_path(work_dir);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };
    Ok(Some(serde_yaml::from_str(&text)?))
}

/// Persist metadata atomically (write-then-rename).
pub fn save(work_dir: &Path, meta: &RepoMeta) -> Result<(), RepoError> {
    let path = meta_path(work_dir);
    let dir = path.parent().unwrap_or(work_dir);
    fs::create_dir_all(dir).map_err(|e| io_err(dir.to_path_buf(), e))?;

    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, serde_yaml::to_string(meta)?).map_err(|e| io_err(tmp.clone(), e))?;
    fs::rename(&tmp, &path).map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Decide the effective mode for a tree.
///
/// A differing persisted mode is only an error if snapshots already exist;
/// before the first snapshot the configured mode may still be changed.
pub fn ensure_mode(
    work_dir: &Path,
    requested: BackendMode,
    has_snapshots: impl FnOnce() -> Result<bool, RepoError>,
) -> Result<BackendMode, RepoError> {
    match load(work_dir)? {
        Some(meta) if meta.mode == requested => Ok(requested),
        Some(meta) => {
            if has_snapshots()? {
                tracing::error!(
                    "backend mode change rejected: persisted {} vs requested {}",
                    meta.mode,
                    requested
                );
                return Err(RepoError::ModeLocked {
                    persisted: meta.mode,
                    requested,
                });
            }
            tracing::warn!("re-recording backend mode as {requested} (no snapshots yet)");
            save(work_dir, &RepoMeta::new(requested))?;
            Ok(requested)
        }
        None => {
            save(work_dir, &RepoMeta::new(requested))?;
            Ok(requested)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_before_save_is_none() {
        let dir = TempDir::new().expect("dir");
        assert!(load(dir.path()).expect("load").is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = TempDir::new().expect("dir");
        let meta = RepoMeta::new(BackendMode::Native);
        save(dir.path(), &meta).expect("save");
        assert_eq!(load(dir.path()).expect("load"), Some(meta));
    }

    #[test]
    fn mode_is_recorded_on_first_use() {
        let dir = TempDir::new().expect("dir");
        let mode = ensure_mode(dir.path(), BackendMode::Library, || Ok(true)).expect("ensure");
        assert_eq!(mode, BackendMode::Library);
        assert_eq!(
            load(dir.path()).expect("load").expect("meta").mode,
            BackendMode::Library
        );
    }

    #[test]
    fn mode_change_rejected_once_snapshots_exist() {
        let dir = TempDir::new().expect("dir");
        ensure_mode(dir.path(), BackendMode::Library, || Ok(false)).expect("first");
        let err = ensure_mode(dir.path(), BackendMode::Native, || Ok(true)).unwrap_err();
        assert!(matches!(
            err,
            RepoError::ModeLocked {
                persisted: BackendMode::Library,
                requested: BackendMode::Native,
            }
        ));
    }

    #[test]
    fn mode_change_allowed_before_first_snapshot() {
        let dir = TempDir::new().expect("dir");
        ensure_mode(dir.path(), BackendMode::Library, || Ok(false)).expect("first");
        let mode =
            ensure_mode(dir.path(), BackendMode::Native, || Ok(false)).expect("switch allowed");
        assert_eq!(mode, BackendMode::Native);
    }
}
