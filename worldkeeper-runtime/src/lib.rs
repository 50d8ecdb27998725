//! Host-side runtime for the backup engines.
//!
//! The engine crates are synchronous by design; this crate supplies the
//! thread pool and the single-writer discipline around them, plus tracing
//! setup for embedding hosts.

pub mod coordinator;
pub mod error;

pub use coordinator::{Coordinator, LockClass, RuntimeSettings, TaskHandle};
pub use error::RuntimeError;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
