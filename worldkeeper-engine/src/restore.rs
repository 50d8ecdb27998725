//! The restore engine: materialize one snapshot as a plain directory.
//!
//! Restores never touch the live tree. The snapshot is cloned into a fresh
//! sibling directory and stripped of its repository metadata, so the result
//! is an ordinary world folder the host can load directly.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use worldkeeper_core::hooks::HostHooks;
use worldkeeper_core::types::SnapshotId;
use worldkeeper_repo::{Backend, RepoError};

use crate::error::EngineError;

/// Upper bound on collision-suffix attempts before giving up.
const MAX_SUFFIX: u32 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    pub snapshot: SnapshotId,
    /// Directory the snapshot was materialized into.
    pub path: PathBuf,
}

/// Restore `snapshot` from the repository at `source` into a new directory
/// under `target_base`, named `<world_name>-<timestamp>`.
pub fn restore_snapshot(
    backend: &dyn Backend,
    source: &Path,
    snapshot: SnapshotId,
    world_name: &str,
    target_base: &Path,
    hooks: &HostHooks<'_>,
) -> Result<RestoreOutcome, EngineError> {
    let stem = format!("{}-{}", sanitize(world_name), snapshot.timestamp_str());
    let target = allocate_target(target_base, &stem)?;

    let source_url = source
        .to_str()
        .ok_or_else(|| EngineError::Config(format!("non-UTF-8 source path: {}", source.display())))?;
    backend.clone_branch(source_url, &snapshot.branch_name(), &target)?;

    // The restored tree is a plain directory, not a repository.
    let metadata = target.join(".git");
    fs::remove_dir_all(&metadata).map_err(|e| {
        EngineError::State(RepoError::Io {
            path: metadata,
            source: e,
        })
    })?;

    tracing::info!("restored {} into {}", snapshot.branch_name(), target.display());
    hooks
        .sink
        .message(&format!("snapshot restored to {}", target.display()));

    Ok(RestoreOutcome {
        snapshot,
        path: target,
    })
}

/// First free directory name: `<stem>`, then `<stem>-1` .. `<stem>-99`.
fn allocate_target(base: &Path, stem: &str) -> Result<PathBuf, EngineError> {
    let plain = base.join(stem);
    if !plain.exists() {
        return Ok(plain);
    }
    for suffix in 1..MAX_SUFFIX {
        let candidate = base.join(format!("{stem}-{suffix}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(EngineError::State(RepoError::State(format!(
        "no free restore directory under {} for '{stem}'",
        base.display()
    ))))
}

/// Keep only filesystem-safe characters; an empty result becomes "world".
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    if cleaned.is_empty() {
        "world".to_string()
    } else {
        cleaned
    }
}
