//! Error types for worldkeeper-repo.

use std::path::PathBuf;

use thiserror::Error;

use worldkeeper_core::types::BackendMode;

/// All errors that can arise at the object-store boundary.
///
/// Classification into the engine-level taxonomy (transport vs. repository
/// state) happens at the call site, which knows which operation failed.
#[derive(Debug, Error)]
pub enum RepoError {
    /// An error from the embedded object-store library.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Repo metadata (de)serialization error.
    #[error("repo metadata YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A child process (git / git-lfs) failed or could not be spawned.
    #[error("{program} failed: {detail}")]
    Process { program: String, detail: String },

    /// The repository is in a shape the backend does not expect.
    #[error("repository state error: {0}")]
    State(String),

    /// The persisted backend mode differs from the configured one and
    /// snapshots already exist, so the change is rejected.
    #[error("backend mode is locked to {persisted} (requested {requested}); \
             it cannot change once snapshots exist")]
    ModeLocked {
        persisted: BackendMode,
        requested: BackendMode,
    },
}

/// Convenience constructor for [`RepoError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RepoError {
    RepoError::Io {
        path: path.into(),
        source,
    }
}
