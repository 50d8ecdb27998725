//! Error types for worldkeeper-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from identity and configuration handling.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The identity file exists but does not hold a valid world id.
    #[error("invalid world id '{value}' in {path}")]
    InvalidWorldId { path: PathBuf, value: String },

    /// A snapshot branch name that does not follow the canonical encoding.
    #[error("invalid snapshot branch name '{0}'")]
    InvalidBranchName(String),
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}

/// Retention policy resolution and validation errors.
///
/// `NotConfigured` is fail-soft at the prune layer (visible notice, zero
/// deletions); the remaining variants abort a prune request outright.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// No policy encoding configured for the requested scope.
    #[error("no retention policy configured for {scope} pruning")]
    NotConfigured { scope: &'static str },

    /// The configured name does not match any registered policy.
    #[error("unknown retention policy '{name}'")]
    Unknown { name: String },

    /// The policy name resolved but its parameters did not parse.
    #[error("invalid parameters '{params}' for retention policy '{name}': {reason}")]
    InvalidParams {
        name: String,
        params: String,
        reason: String,
    },

    /// A policy returned ids that were not part of its input.
    #[error("retention policy '{name}' selected snapshots outside its input")]
    NotASubset { name: String },

    /// A policy selected the most recent snapshot for deletion.
    #[error("retention policy '{name}' selected the most recent snapshot")]
    SelectsNewest { name: String },
}
