use thiserror::Error;

use crate::coordinator::LockClass;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The thread pool could not be built.
    #[error("runtime build failed: {0}")]
    Build(#[source] std::io::Error),

    /// The requested lock class is already held; the job was never queued.
    #[error("a {0} operation is already running")]
    Busy(LockClass),

    /// A submitted job panicked or was cancelled before completion.
    #[error("background job failed: {0}")]
    Join(String),
}
