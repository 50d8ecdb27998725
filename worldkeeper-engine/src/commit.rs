//! The commit engine: capture the working tree as one parentless snapshot.
//!
//! Host saving is disabled only for the status/stage/commit window so the
//! tree cannot mutate under the reader, and re-enabled on every exit path
//! via a drop guard.

use serde::Serialize;

use worldkeeper_core::hooks::{HostHooks, SaveToggle};
use worldkeeper_core::types::{SnapshotId, WorldId};
use worldkeeper_repo::Backend;

use crate::error::EngineError;

/// A committed snapshot, as reported outward.
#[derive(Debug, Clone, Serialize)]
pub struct CommitOutcome {
    pub snapshot: SnapshotId,
    pub branch: String,
    /// Paths staged into this snapshot (adds plus removals).
    pub files_changed: usize,
}

/// Re-enables host saving when dropped, even on the error path.
struct SaveGuard<'a> {
    save: &'a dyn SaveToggle,
}

impl<'a> SaveGuard<'a> {
    fn suspend(save: &'a dyn SaveToggle) -> Self {
        save.set_save_enabled(false);
        Self { save }
    }
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.save.set_save_enabled(true);
    }
}

/// Commit the current working tree as a new snapshot of `world`.
pub fn commit_snapshot(
    backend: &dyn Backend,
    world: WorldId,
    hooks: &HostHooks<'_>,
) -> Result<CommitOutcome, EngineError> {
    let snapshot = SnapshotId::now(world);
    let branch = snapshot.branch_name();
    tracing::info!("committing snapshot {branch}");

    let guard = SaveGuard::suspend(hooks.save);

    backend.checkout_orphan(&branch)?;
    // A cleared index makes the status the full tree, so the commit is
    // self-contained rather than a delta against the previous snapshot.
    backend.clear_index()?;
    let status = backend.status()?;
    backend.stage(&status)?;
    backend.commit(&branch)?;

    drop(guard);

    hooks.sink.message(&format!(
        "snapshot {} captured ({} paths)",
        snapshot.timestamp_str(),
        status.len()
    ));

    Ok(CommitOutcome {
        snapshot,
        branch,
        files_changed: status.len(),
    })
}
