//! Backup engines for large mutating directory trees.
//!
//! Each snapshot is an independent parentless commit on its own branch in a
//! shared object store, so content dedup comes from the store while no
//! snapshot depends on another's existence. The engines here are synchronous
//! and single-threaded; serialization of mutating operations is the runtime
//! crate's job.

pub mod backup;
pub mod commit;
pub mod error;
pub mod maintenance;
pub mod progress;
pub mod prune;
pub mod push;
pub mod reclaim;
pub mod restore;

use std::path::Path;

use worldkeeper_core::types::{BackupConfig, SnapshotId};
use worldkeeper_repo::Backend;

pub use backup::{run_backup, BackupReport, PushStatus};
pub use commit::{commit_snapshot, CommitOutcome};
pub use error::EngineError;
pub use maintenance::MaintenanceReport;
pub use progress::ProgressAdapter;
pub use prune::{prune, PruneOutcome};
pub use push::{push_snapshot, PushOutcome, PushStrategy};
pub use reclaim::{reclaim, ReclaimOutcome};
pub use restore::{restore_snapshot, RestoreOutcome};

/// Open the backend for a tree, honoring the persisted backend mode.
///
/// The configured mode only wins while the tree has no snapshots; afterwards
/// the recorded mode is authoritative and a conflicting configuration is
/// rejected.
pub fn create_backend(
    tree: &Path,
    config: &BackupConfig,
) -> Result<Box<dyn Backend>, EngineError> {
    let requested = config.backend_mode();
    let mode = worldkeeper_repo::ensure_mode(tree, requested, || {
        if !tree.join(".git").exists() {
            return Ok(false);
        }
        let probe = worldkeeper_repo::open(requested, tree);
        Ok(probe
            .local_branches()?
            .iter()
            .any(|name| SnapshotId::decode(name).is_ok()))
    })
    .map_err(|e| match e {
        locked @ worldkeeper_repo::RepoError::ModeLocked { .. } => {
            EngineError::Config(locked.to_string())
        }
        other => EngineError::State(other),
    })?;
    Ok(worldkeeper_repo::open(mode, tree))
}
