//! The reclamation engine: make pruning actually free disk.
//!
//! Deleting a branch only drops the ref; reflogs and (in native mode) the
//! LFS cache keep the objects reachable. This pass removes every such
//! anchor and then compacts the store.

use serde::Serialize;

use worldkeeper_core::hooks::{HostHooks, Severity};
use worldkeeper_core::types::{BackendMode, SnapshotId, WorldId};
use worldkeeper_repo::Backend;

use crate::error::EngineError;
use crate::progress::ProgressAdapter;

#[derive(Debug, Clone, Serialize)]
pub struct ReclaimOutcome {
    /// Leftover sync branches deleted before compaction.
    pub temp_branches_deleted: Vec<String>,
    /// Branches that are neither snapshots of this world nor sync leftovers.
    /// Reported, never touched.
    pub stray_branches: Vec<String>,
    pub lfs_pruned: bool,
}

/// Reclaim disk space from pruned snapshots.
pub fn reclaim(
    backend: &dyn Backend,
    world: WorldId,
    hooks: &HostHooks<'_>,
) -> Result<ReclaimOutcome, EngineError> {
    let mut adapter = ProgressAdapter::default();
    let mut report = |percent: u8| {
        if let Some(percent) = adapter.update(percent) {
            hooks.sink.progress(percent);
        }
    };
    report(0);

    // Reflogs would keep every pruned commit alive for 90 days.
    backend.purge_reflogs()?;
    report(20);

    let mut temp_branches_deleted = Vec::new();
    let mut stray_branches = Vec::new();
    for branch in backend.local_branches()? {
        if let Ok(id) = SnapshotId::decode_temp(&branch) {
            if id.world() == world {
                backend.delete_local_branch(&branch)?;
                tracing::info!("deleted leftover sync branch {branch}");
                temp_branches_deleted.push(branch);
                continue;
            }
        }
        let owned = matches!(SnapshotId::decode(&branch), Ok(id) if id.world() == world);
        if !owned {
            stray_branches.push(branch);
        }
    }
    if !stray_branches.is_empty() {
        tracing::warn!(
            "repository holds {} branch(es) not owned by this world: {}",
            stray_branches.len(),
            stray_branches.join(", ")
        );
        hooks.sink.styled(
            Severity::Warning,
            &format!(
                "{} unrelated branch(es) present; they keep their objects alive",
                stray_branches.len()
            ),
        );
    }
    report(40);

    let lfs_pruned = if backend.mode() == BackendMode::Native && backend.lfs_installed()? {
        backend.lfs_prune()?;
        true
    } else {
        false
    };
    report(60);

    backend.compact()?;
    report(100);
    hooks.sink.message("storage reclamation finished");

    Ok(ReclaimOutcome {
        temp_branches_deleted,
        stray_branches,
        lfs_pruned,
    })
}
