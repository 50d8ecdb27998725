//! Object-store backends for worldkeeper.
//!
//! Everything above this crate talks to the [`Backend`] trait; the two
//! implementations are the embedded library ([`library::LibraryBackend`])
//! and the installed `git` binary ([`native::NativeBackend`]). The mode a
//! tree uses is persisted by [`mode`] and locked once snapshots exist.

pub mod backend;
pub mod error;
pub mod library;
pub mod lock;
pub mod mode;
pub mod native;

mod process;

pub use backend::{open, Backend, ProgressFn, PushPhase, WorkStatus};
pub use error::RepoError;
pub use library::LibraryBackend;
pub use lock::{clear_stale_index_lock, StaleLock};
pub use mode::{ensure_mode, RepoMeta};
pub use native::NativeBackend;
