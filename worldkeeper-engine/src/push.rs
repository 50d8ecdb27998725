//! The sync engine: get one snapshot onto the remote.
//!
//! Two strategies exist. The naive push sends the snapshot branch as-is;
//! with no shared ancestry the transport re-sends every object. The smart
//! push first looks for the newest snapshot both sides already have and
//! ships a disposable graft branch whose synthetic merge ancestry lets the
//! transport delta against it, then the real branch rides along for free.

use std::collections::BTreeSet;

use serde::Serialize;

use worldkeeper_core::hooks::{HostHooks, Severity};
use worldkeeper_core::types::{RemoteLink, SnapshotId, WorldId};
use worldkeeper_repo::{Backend, PushPhase};

use crate::error::{transport, EngineError};
use crate::progress::ProgressAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PushStrategy {
    Naive,
    Smart,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushOutcome {
    pub snapshot: SnapshotId,
    pub strategy: PushStrategy,
    /// The shared snapshot the smart push deltas against, when one exists.
    pub common: Option<SnapshotId>,
    pub cleaned_local: bool,
    pub cleaned_remote: bool,
}

/// Push `snapshot` to the remote, choosing the strategy automatically.
pub fn push_snapshot(
    backend: &dyn Backend,
    link: &RemoteLink,
    snapshot: SnapshotId,
    hooks: &HostHooks<'_>,
) -> Result<PushOutcome, EngineError> {
    let remote_names = backend
        .remote_branches(link)
        .map_err(transport("remote branch listing"))?;
    let remote_ids: Vec<SnapshotId> = remote_names
        .iter()
        .filter_map(|name| SnapshotId::decode(name).ok())
        .collect();

    if link.uuid_check {
        verify_remote_identity(snapshot.world(), &remote_ids)?;
    }

    let common = if link.smart_sync {
        find_common(backend, snapshot, &remote_ids)?
    } else {
        None
    };

    let branch = snapshot.branch_name();
    let mut refspecs = vec![format!("refs/heads/{branch}:refs/heads/{branch}")];

    let temp = snapshot.temp_branch_name();
    if let Some(common) = common {
        backend.create_graft_branch(
            &temp,
            &branch,
            &common.branch_name(),
            &format!("Sync {}", snapshot.timestamp_str()),
        )?;
        // Graft first so its delta base is on the wire before the real ref.
        refspecs.insert(0, format!("refs/heads/{temp}:refs/heads/{temp}"));
        tracing::info!(
            "smart push of {branch} against common snapshot {}",
            common.timestamp_str()
        );
    } else if link.smart_sync {
        // Smart sync was asked for but there is no shared base to delta
        // against, so every object goes over the wire.
        let reason = if remote_ids
            .iter()
            .any(|id| id.world() == snapshot.world() && *id < snapshot)
        {
            "the snapshots the remote already has were pruned locally"
        } else {
            "the remote has no earlier snapshot of this world"
        };
        tracing::warn!("falling back to a full upload of {branch}: {reason}");
        hooks
            .sink
            .styled(Severity::Warning, &format!("full upload needed: {reason}"));
    } else {
        tracing::info!("naive push of {branch} (smart sync disabled)");
    }

    let mut adapter = ProgressAdapter::default();
    let sink = hooks.sink;
    let push_result = backend.push(link, &refspecs, &mut |phase, current, total| {
        let percent = match phase {
            PushPhase::Pack => ProgressAdapter::scaled(0, 50, current, total),
            PushPhase::Transfer => ProgressAdapter::scaled(50, 100, current, total),
        };
        if let Some(percent) = adapter.update(percent) {
            sink.progress(percent);
        }
    });

    if let Err(source) = push_result {
        // A failed smart push must not leave the graft branch behind.
        if common.is_some() {
            best_effort(backend.delete_local_branch(&temp), "graft branch cleanup");
        }
        return Err(transport("push")(source));
    }
    if let Some(percent) = adapter.update(100) {
        sink.progress(percent);
    }

    let (mut cleaned_local, mut cleaned_remote) = (false, false);
    if common.is_some() {
        if link.cleanup_temp_local {
            cleaned_local = best_effort(backend.delete_local_branch(&temp), "local graft delete");
            best_effort(
                backend.delete_remote_tracking(&link.name, &temp),
                "graft tracking-ref delete",
            );
        }
        if link.cleanup_temp_remote {
            cleaned_remote =
                best_effort(backend.delete_remote_branch(link, &temp), "remote graft delete");
        }
    }

    Ok(PushOutcome {
        snapshot,
        strategy: if common.is_some() {
            PushStrategy::Smart
        } else {
            PushStrategy::Naive
        },
        common,
        cleaned_local,
        cleaned_remote,
    })
}

/// Abort when the remote holds another world's snapshots.
fn verify_remote_identity(local: WorldId, remote_ids: &[SnapshotId]) -> Result<(), EngineError> {
    let foreign: BTreeSet<WorldId> = remote_ids
        .iter()
        .map(|id| id.world())
        .filter(|world| *world != local)
        .collect();
    let Some(first) = foreign.iter().next().copied() else {
        return Ok(());
    };
    if foreign.len() > 1 {
        tracing::warn!(
            "remote holds snapshots of {} distinct foreign worlds; \
             it looks like a shared dumping ground",
            foreign.len()
        );
    }
    Err(EngineError::IdentityMismatch {
        local,
        remote: first,
    })
}

/// Newest snapshot older than the one being pushed that both sides hold.
fn find_common(
    backend: &dyn Backend,
    snapshot: SnapshotId,
    remote_ids: &[SnapshotId],
) -> Result<Option<SnapshotId>, EngineError> {
    let local_ids: BTreeSet<SnapshotId> = backend
        .local_branches()?
        .iter()
        .filter_map(|name| SnapshotId::decode(name).ok())
        .filter(|id| id.world() == snapshot.world())
        .collect();

    Ok(remote_ids
        .iter()
        .filter(|id| id.world() == snapshot.world())
        .filter(|id| **id < snapshot)
        .filter(|id| local_ids.contains(id))
        .max()
        .copied())
}

/// Cleanup steps degrade to warnings; the push itself already succeeded.
fn best_effort(result: Result<(), worldkeeper_repo::RepoError>, what: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("{what} failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn id(world: WorldId, second: u32) -> SnapshotId {
        SnapshotId::new(world, Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, second).unwrap())
    }

    #[test]
    fn identity_check_passes_on_own_world() {
        let world = WorldId::generate();
        let remote = vec![id(world, 1), id(world, 2)];
        verify_remote_identity(world, &remote).expect("same world");
        verify_remote_identity(world, &[]).expect("empty remote");
    }

    #[test]
    fn identity_check_rejects_foreign_world() {
        let world = WorldId::generate();
        let other = WorldId::generate();
        let err = verify_remote_identity(world, &[id(world, 1), id(other, 2)]).unwrap_err();
        match err {
            EngineError::IdentityMismatch { local, remote } => {
                assert_eq!(local, world);
                assert_eq!(remote, other);
            }
            other => panic!("expected identity mismatch, got {other:?}"),
        }
    }
}
