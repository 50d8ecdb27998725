//! Engine-level error taxonomy.
//!
//! [`RepoError`] values are classified here at the call site: network-facing
//! operations wrap them as [`EngineError::Transport`], everything else flows
//! through as repository state. Transport failures after a local commit has
//! landed are partial successes, not hard errors; see `backup`.

use thiserror::Error;

use worldkeeper_core::error::{CoreError, PolicyError};
use worldkeeper_core::types::WorldId;
use worldkeeper_repo::RepoError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// An operation was invoked without the configuration it needs.
    #[error("configuration error: {0}")]
    Config(String),

    /// The remote holds snapshots of a different world; pushing would
    /// interleave unrelated histories.
    #[error("remote holds snapshots of world {remote} but this tree is world {local}")]
    IdentityMismatch { local: WorldId, remote: WorldId },

    /// A network-facing operation failed. The local repository is intact.
    #[error("transport failure during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: RepoError,
    },

    /// A local repository operation failed.
    #[error(transparent)]
    State(#[from] RepoError),

    /// Retention policy resolution or validation failed.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Wrap a repo error as a transport failure of the named operation.
pub(crate) fn transport(operation: &'static str) -> impl FnOnce(RepoError) -> EngineError {
    move |source| EngineError::Transport { operation, source }
}
