//! Worldkeeper core library — identity types, configuration surface,
//! retention policies, collaborator hooks, errors.
//!
//! Public API surface:
//! - [`types`] — [`WorldId`], [`SnapshotId`], branch codec, config structs
//! - [`identity`] — identity file create / load / migrate
//! - [`retention`] — [`RetentionPolicy`] trait, registry, built-ins
//! - [`hooks`] — [`MessageSink`], [`SaveToggle`] collaborator traits
//! - [`error`] — [`CoreError`], [`PolicyError`]

pub mod error;
pub mod hooks;
pub mod identity;
pub mod retention;
pub mod types;

pub use error::{CoreError, PolicyError};
pub use hooks::{HostHooks, MessageSink, NullSaveToggle, NullSink, SaveToggle, Severity};
pub use retention::{PolicyRegistry, RetentionPolicy};
pub use types::{
    BackendMode, BackupConfig, PruneScope, RemoteLink, RetentionConfig, SnapshotId, WorldId,
};
