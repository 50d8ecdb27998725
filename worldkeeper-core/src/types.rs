//! Domain types for the worldkeeper backup engine.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem
//! paths. All config types are serializable/deserializable via serde.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Ref namespace for snapshot branches: `snapshots/<world>/<timestamp>`.
pub const SNAPSHOT_NAMESPACE: &str = "snapshots";

/// Ref namespace for disposable sync branches: `temp/<branch-being-pushed>`.
pub const TEMP_NAMESPACE: &str = "temp";

/// Timestamp encoding chosen so lexicographic and chronological order agree.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

// ---------------------------------------------------------------------------
// WorldId
// ---------------------------------------------------------------------------

/// Opaque, globally-unique identifier for one backed-up tree.
///
/// Generated once, persisted beside the tree, immutable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub Uuid);

impl WorldId {
    /// Mint a fresh random id for a tree that has none yet.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for WorldId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// SnapshotId
// ---------------------------------------------------------------------------

/// `(WorldId, timestamp)` identifying one snapshot.
///
/// Timestamps are truncated to one-second resolution at construction, so two
/// ids for the same world within the same second compare equal. The canonical
/// text form doubles as the snapshot's branch name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId {
    world: WorldId,
    timestamp: DateTime<Utc>,
}

impl SnapshotId {
    /// Build an id from a world and a capture time (truncated to seconds).
    pub fn new(world: WorldId, at: DateTime<Utc>) -> Self {
        let truncated = Utc
            .timestamp_opt(at.timestamp(), 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            world,
            timestamp: truncated,
        }
    }

    /// Allocate an id for a snapshot captured right now.
    pub fn now(world: WorldId) -> Self {
        Self::new(world, Utc::now())
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// `yyyy-MM-dd_HH-mm-ss` — sortable, filesystem- and ref-safe.
    pub fn timestamp_str(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Canonical encoding: `snapshots/<world>/<timestamp>` (also the branch name).
    pub fn branch_name(&self) -> String {
        format!(
            "{SNAPSHOT_NAMESPACE}/{}/{}",
            self.world,
            self.timestamp_str()
        )
    }

    /// Branch name of the disposable sync branch for this snapshot.
    pub fn temp_branch_name(&self) -> String {
        format!("{TEMP_NAMESPACE}/{}", self.branch_name())
    }

    /// Decode a branch name back into an id.
    ///
    /// Round-trip invariant: `decode(encode(x)) == x` for all valid ids.
    pub fn decode(branch: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidBranchName(branch.to_string());

        let rest = branch
            .strip_prefix(SNAPSHOT_NAMESPACE)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let (world_part, ts_part) = rest.split_once('/').ok_or_else(invalid)?;

        let world = world_part.parse::<WorldId>().map_err(|_| invalid())?;
        let naive =
            NaiveDateTime::parse_from_str(ts_part, TIMESTAMP_FORMAT).map_err(|_| invalid())?;
        Ok(Self {
            world,
            timestamp: Utc.from_utc_datetime(&naive),
        })
    }

    /// Decode a `temp/<snapshot-branch>` name back into the snapshot it carries.
    pub fn decode_temp(branch: &str) -> Result<Self, CoreError> {
        let rest = branch
            .strip_prefix(TEMP_NAMESPACE)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| CoreError::InvalidBranchName(branch.to_string()))?;
        Self::decode(rest)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.branch_name())
    }
}

/// Order by timestamp; world id only as tiebreaker so `Ord` stays consistent
/// with `Eq`. Snapshot sets are always per-world, so in practice the tiebreak
/// never decides anything.
impl Ord for SnapshotId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.world.cmp(&other.world))
    }
}

impl PartialOrd for SnapshotId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Backend mode
// ---------------------------------------------------------------------------

/// Which object-store backend manages a tree's repository.
///
/// Persisted beside the repository; must not change once any snapshot exists,
/// because the two backends are not byte-compatible in how large files are
/// represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Direct object-store API calls (git2).
    #[default]
    Library,
    /// Shelling out to the `git` binary and its LFS extension.
    Native,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Library => write!(f, "library"),
            BackendMode::Native => write!(f, "native"),
        }
    }
}

// ---------------------------------------------------------------------------
// Prune scope
// ---------------------------------------------------------------------------

/// Where a prune pass deletes snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PruneScope {
    Local,
    Remote,
}

impl PruneScope {
    pub fn label(&self) -> &'static str {
        match self {
            PruneScope::Local => "local",
            PruneScope::Remote => "remote",
        }
    }
}

// ---------------------------------------------------------------------------
// Config surface (read-only for this core)
// ---------------------------------------------------------------------------

/// A configured push target plus its behavior flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLink {
    /// Remote name registered in the repository (e.g. `backup`).
    pub name: String,
    /// Push URL.
    pub url: String,
    /// Abort pushes when the remote holds another world's snapshots.
    #[serde(default = "default_true")]
    pub uuid_check: bool,
    /// Use the dedup (smart) push strategy when a common snapshot exists.
    #[serde(default = "default_true")]
    pub smart_sync: bool,
    /// Delete the disposable sync branch locally after a smart push.
    #[serde(default = "default_true")]
    pub cleanup_temp_local: bool,
    /// Delete the disposable sync branch on the remote after a smart push.
    #[serde(default = "default_true")]
    pub cleanup_temp_remote: bool,
}

impl RemoteLink {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            uuid_check: true,
            smart_sync: true,
            cleanup_temp_local: true,
            cleanup_temp_remote: true,
        }
    }
}

/// Retention policy encodings per scope, e.g. `keep-last:24`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetentionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

impl RetentionConfig {
    pub fn for_scope(&self, scope: PruneScope) -> Option<&str> {
        match scope {
            PruneScope::Local => self.local.as_deref(),
            PruneScope::Remote => self.remote.as_deref(),
        }
    }
}

/// Read-only configuration consumed by the engines.
///
/// Populated by the excluded command/config layer; this core never writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Push new snapshots after each commit.
    pub push_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteLink>,
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Remove a stale repository lock left by a crashed process.
    #[serde(default)]
    pub remove_stale_lock: bool,
    /// Select the native-process backend instead of the library backend.
    #[serde(default)]
    pub native_mode: bool,
    /// Large-file patterns tracked via LFS in native mode.
    #[serde(default)]
    pub lfs_patterns: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            push_enabled: false,
            remote: None,
            retention: RetentionConfig::default(),
            remove_stale_lock: false,
            native_mode: false,
            lfs_patterns: Vec::new(),
        }
    }
}

impl BackupConfig {
    pub fn backend_mode(&self) -> BackendMode {
        if self.native_mode {
            BackendMode::Native
        } else {
            BackendMode::Library
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn world() -> WorldId {
        "5f3a1f2e-9b7c-4d7e-8a1b-2c3d4e5f6a7b".parse().expect("uuid")
    }

    #[test]
    fn branch_name_roundtrip() {
        let id = SnapshotId::new(world(), Utc::now());
        let decoded = SnapshotId::decode(&id.branch_name()).expect("decode");
        assert_eq!(decoded, id);
    }

    #[test]
    fn branch_name_has_expected_shape() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 42).unwrap();
        let id = SnapshotId::new(world(), at);
        assert_eq!(
            id.branch_name(),
            "snapshots/5f3a1f2e-9b7c-4d7e-8a1b-2c3d4e5f6a7b/2024-03-09_17-05-42"
        );
        assert_eq!(
            id.temp_branch_name(),
            "temp/snapshots/5f3a1f2e-9b7c-4d7e-8a1b-2c3d4e5f6a7b/2024-03-09_17-05-42"
        );
    }

    #[test]
    fn same_second_ids_compare_equal() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        let a = SnapshotId::new(world(), at);
        let b = SnapshotId::new(world(), at + Duration::milliseconds(750));
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn ordering_follows_timestamp() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let older = SnapshotId::new(world(), base);
        let newer = SnapshotId::new(world(), base + Duration::seconds(1));
        assert!(older < newer);
    }

    #[test]
    fn lexicographic_order_matches_chronological() {
        let base = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let older = SnapshotId::new(world(), base);
        let newer = SnapshotId::new(world(), base + Duration::seconds(2));
        assert!(older.branch_name() < newer.branch_name());
    }

    #[test]
    fn decode_rejects_foreign_branches() {
        for name in [
            "main",
            "snapshots/not-a-uuid/2024-01-01_00-00-00",
            "snapshots/5f3a1f2e-9b7c-4d7e-8a1b-2c3d4e5f6a7b/not-a-time",
            "snapshots/5f3a1f2e-9b7c-4d7e-8a1b-2c3d4e5f6a7b",
        ] {
            assert!(SnapshotId::decode(name).is_err(), "accepted '{name}'");
        }
    }

    #[test]
    fn decode_temp_unwraps_namespace() {
        let id = SnapshotId::new(world(), Utc::now());
        let decoded = SnapshotId::decode_temp(&id.temp_branch_name()).expect("decode temp");
        assert_eq!(decoded, id);
        assert!(SnapshotId::decode_temp(&id.branch_name()).is_err());
    }

    #[test]
    fn backend_mode_display() {
        assert_eq!(BackendMode::Library.to_string(), "library");
        assert_eq!(BackendMode::Native.to_string(), "native");
    }

    #[test]
    fn retention_config_scope_lookup() {
        let cfg = RetentionConfig {
            local: Some("keep-last:3".into()),
            remote: None,
        };
        assert_eq!(cfg.for_scope(PruneScope::Local), Some("keep-last:3"));
        assert_eq!(cfg.for_scope(PruneScope::Remote), None);
    }
}
