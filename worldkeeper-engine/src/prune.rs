//! The prune engine: apply a retention policy to one scope.
//!
//! Policies are advisory; the engine re-validates their output before any
//! deletion, so a misbehaving policy cannot take the newest snapshot or
//! touch ids it was never shown.

use serde::Serialize;

use worldkeeper_core::error::PolicyError;
use worldkeeper_core::hooks::{HostHooks, Severity};
use worldkeeper_core::retention::PolicyRegistry;
use worldkeeper_core::types::{PruneScope, RemoteLink, RetentionConfig, SnapshotId, WorldId};
use worldkeeper_repo::Backend;

use crate::error::{transport, EngineError};

#[derive(Debug, Clone, Serialize)]
pub struct PruneOutcome {
    pub scope: PruneScope,
    /// Policy encoding that ran, `None` when the scope has none configured.
    pub policy: Option<String>,
    pub deleted: Vec<SnapshotId>,
}

impl PruneOutcome {
    fn nothing(scope: PruneScope) -> Self {
        Self {
            scope,
            policy: None,
            deleted: Vec::new(),
        }
    }
}

/// Prune one scope of `world` according to the configured retention policy.
///
/// A scope without a configured policy is not an error: the sink gets a
/// notice and nothing is deleted. `remote` is required for the remote scope.
pub fn prune(
    backend: &dyn Backend,
    registry: &PolicyRegistry,
    retention: &RetentionConfig,
    scope: PruneScope,
    remote: Option<&RemoteLink>,
    world: WorldId,
    hooks: &HostHooks<'_>,
) -> Result<PruneOutcome, EngineError> {
    let Some(encoding) = retention.for_scope(scope) else {
        hooks.sink.styled(
            Severity::Info,
            &format!("no retention policy configured for {} pruning", scope.label()),
        );
        return Ok(PruneOutcome::nothing(scope));
    };
    let policy = registry.resolve(encoding)?;

    let branch_names = match scope {
        PruneScope::Local => backend.local_branches()?,
        PruneScope::Remote => {
            let link = remote.ok_or_else(|| {
                EngineError::Config("remote pruning requires a configured remote".into())
            })?;
            backend
                .remote_branches(link)
                .map_err(transport("remote branch listing"))?
        }
    };

    let mut candidates: Vec<SnapshotId> = branch_names
        .iter()
        .filter_map(|name| SnapshotId::decode(name).ok())
        .filter(|id| id.world() == world)
        .collect();
    candidates.sort();

    let selected = policy.select(&candidates);
    validate_selection(policy.name(), &candidates, &selected)?;

    // Deletion follows the policy's own order.
    let mut deleted = Vec::with_capacity(selected.len());
    for id in selected {
        match scope {
            PruneScope::Local => backend.delete_local_branch(&id.branch_name())?,
            PruneScope::Remote => {
                let link = remote.ok_or_else(|| {
                    EngineError::Config("remote pruning requires a configured remote".into())
                })?;
                backend
                    .delete_remote_branch(link, &id.branch_name())
                    .map_err(transport("remote branch delete"))?;
                // Drop the tracking ref too or the next common-snapshot scan
                // would still see the pruned id.
                if let Err(e) = backend.delete_remote_tracking(&link.name, &id.branch_name()) {
                    tracing::warn!("tracking-ref delete for {id} failed: {e}");
                }
            }
        }
        tracing::info!("pruned {} snapshot {id}", scope.label());
        deleted.push(id);
    }

    if !deleted.is_empty() {
        hooks.sink.message(&format!(
            "pruned {} {} snapshot(s)",
            deleted.len(),
            scope.label()
        ));
    }

    Ok(PruneOutcome {
        scope,
        policy: Some(encoding.to_string()),
        deleted,
    })
}

/// Reject selections that are not a subset of the input or that include the
/// newest snapshot.
fn validate_selection(
    name: &str,
    candidates: &[SnapshotId],
    selected: &[SnapshotId],
) -> Result<(), PolicyError> {
    for id in selected {
        if !candidates.contains(id) {
            return Err(PolicyError::NotASubset {
                name: name.to_string(),
            });
        }
    }
    if let Some(newest) = candidates.last() {
        if selected.contains(newest) {
            return Err(PolicyError::SelectsNewest {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
