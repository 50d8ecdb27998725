//! Retention policies: pure selection of snapshots to delete.
//!
//! A policy is a stateless function from the full sorted snapshot set of one
//! world to the subset to delete. Policies are resolved at runtime through a
//! registry keyed by a stable config name with typed parameters, e.g.
//! `keep-last:24` or `max-age:14`. Built-in policies never select the most
//! recent snapshot.

use std::collections::BTreeMap;

use chrono::Duration;

use crate::error::PolicyError;
use crate::types::SnapshotId;

/// Pure, deterministic, side-effect-free snapshot selection.
///
/// Input is sorted ascending (oldest first); output must be a subset of the
/// input. The prune engine additionally rejects any output that contains the
/// newest id.
pub trait RetentionPolicy: Send + Sync {
    /// Stable config name this policy was registered under.
    fn name(&self) -> &'static str;

    /// Select the snapshots to delete from the sorted input set.
    fn select(&self, snapshots: &[SnapshotId]) -> Vec<SnapshotId>;
}

type Constructor = fn(&str) -> Result<Box<dyn RetentionPolicy>, PolicyError>;

/// Registry mapping a stable config name to a policy constructor.
///
/// Replaces per-instance subclassing of an enumerated type in the original
/// design with a plain name → constructor lookup.
pub struct PolicyRegistry {
    constructors: BTreeMap<&'static str, Constructor>,
}

impl PolicyRegistry {
    /// Registry with the built-in policies (`keep-last`, `max-age`).
    pub fn builtin() -> Self {
        let mut constructors: BTreeMap<&'static str, Constructor> = BTreeMap::new();
        constructors.insert(KEEP_LAST, build_keep_last);
        constructors.insert(MAX_AGE, build_max_age);
        Self { constructors }
    }

    /// Register an additional policy constructor under a stable name.
    pub fn register(&mut self, name: &'static str, constructor: Constructor) {
        self.constructors.insert(name, constructor);
    }

    /// Resolve a config encoding of the form `name` or `name:params`.
    pub fn resolve(&self, encoding: &str) -> Result<Box<dyn RetentionPolicy>, PolicyError> {
        let (name, params) = match encoding.split_once(':') {
            Some((name, params)) => (name.trim(), params.trim()),
            None => (encoding.trim(), ""),
        };
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| PolicyError::Unknown {
                name: name.to_string(),
            })?;
        constructor(params)
    }

    /// Names of all registered policies, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// keep-last
// ---------------------------------------------------------------------------

pub const KEEP_LAST: &str = "keep-last";

/// Keep the `n` most recent snapshots, delete everything older.
struct KeepLast {
    keep: usize,
}

impl RetentionPolicy for KeepLast {
    fn name(&self) -> &'static str {
        KEEP_LAST
    }

    fn select(&self, snapshots: &[SnapshotId]) -> Vec<SnapshotId> {
        // keep == 0 still spares the newest snapshot.
        let keep = self.keep.max(1);
        if snapshots.len() <= keep {
            return Vec::new();
        }
        snapshots[..snapshots.len() - keep].to_vec()
    }
}

fn build_keep_last(params: &str) -> Result<Box<dyn RetentionPolicy>, PolicyError> {
    let keep = params
        .parse::<usize>()
        .map_err(|e| PolicyError::InvalidParams {
            name: KEEP_LAST.to_string(),
            params: params.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Box::new(KeepLast { keep }))
}

// ---------------------------------------------------------------------------
// max-age
// ---------------------------------------------------------------------------

pub const MAX_AGE: &str = "max-age";

/// Delete snapshots older than `days`, measured against the newest snapshot
/// in the input (not the wall clock, to stay deterministic).
struct MaxAge {
    days: i64,
}

impl RetentionPolicy for MaxAge {
    fn name(&self) -> &'static str {
        MAX_AGE
    }

    fn select(&self, snapshots: &[SnapshotId]) -> Vec<SnapshotId> {
        let Some(newest) = snapshots.last() else {
            return Vec::new();
        };
        let cutoff = newest.timestamp() - Duration::days(self.days);
        snapshots
            .iter()
            .filter(|id| *id != newest && id.timestamp() < cutoff)
            .copied()
            .collect()
    }
}

fn build_max_age(params: &str) -> Result<Box<dyn RetentionPolicy>, PolicyError> {
    let days = params
        .parse::<i64>()
        .map_err(|e| PolicyError::InvalidParams {
            name: MAX_AGE.to_string(),
            params: params.to_string(),
            reason: e.to_string(),
        })?;
    if days < 0 {
        return Err(PolicyError::InvalidParams {
            name: MAX_AGE.to_string(),
            params: params.to_string(),
            reason: "age must be non-negative".to_string(),
        });
    }
    Ok(Box::new(MaxAge { days }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
