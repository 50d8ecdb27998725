//! One full backup pass: pre-flight, commit, then the optional push.
//!
//! The commit is the point of no return. Once it lands, any push failure
//! degrades the run to a partial success instead of an error; the snapshot
//! is safe locally and a later push can still deliver it.

use std::path::Path;

use serde::Serialize;

use worldkeeper_core::hooks::HostHooks;
use worldkeeper_core::types::{BackupConfig, SnapshotId};
use worldkeeper_repo::Backend;

use crate::commit::{commit_snapshot, CommitOutcome};
use crate::error::EngineError;
use crate::maintenance::{self, MaintenanceReport};
use crate::push::{push_snapshot, PushOutcome};

/// How the push leg of a backup ended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum PushStatus {
    /// Pushing is disabled or no remote is configured.
    Disabled,
    Pushed {
        #[serde(flatten)]
        outcome: PushOutcome,
    },
    /// The local commit landed but the push did not.
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub maintenance: MaintenanceReport,
    pub commit: CommitOutcome,
    pub push: PushStatus,
}

impl BackupReport {
    pub fn snapshot(&self) -> SnapshotId {
        self.commit.snapshot
    }

    /// JSON encoding for host/UI layers.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Run a backup of the tree: maintenance, snapshot commit, optional push.
pub fn run_backup(
    tree: &Path,
    backend: &dyn Backend,
    config: &BackupConfig,
    hooks: &HostHooks<'_>,
) -> Result<BackupReport, EngineError> {
    let maintenance = maintenance::run(tree, backend, config, hooks)?;
    let commit = commit_snapshot(backend, maintenance.world, hooks)?;

    let push = match (&config.remote, config.push_enabled) {
        (Some(link), true) => match push_snapshot(backend, link, commit.snapshot, hooks) {
            Ok(outcome) => PushStatus::Pushed { outcome },
            Err(e @ (EngineError::Transport { .. } | EngineError::IdentityMismatch { .. })) => {
                hooks.report_internal("snapshot push", &e);
                PushStatus::Failed {
                    error: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        },
        _ => PushStatus::Disabled,
    };

    Ok(BackupReport {
        maintenance,
        commit,
        push,
    })
}
