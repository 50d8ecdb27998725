//! The `Backend` seam between the engines and the object store.
//!
//! Two functionally-equivalent implementations exist: [`crate::library`]
//! (direct git2 calls) and [`crate::native`] (the `git` binary plus its LFS
//! extension). Which one manages a tree is persisted by [`crate::mode`] and
//! must not change once snapshots exist.

use std::path::{Path, PathBuf};

use worldkeeper_core::types::{BackendMode, RemoteLink};

use crate::error::RepoError;
use crate::library::LibraryBackend;
use crate::native::NativeBackend;

/// Working-tree status split into explicit add and remove sets.
///
/// Snapshots stage these path-by-path; an unqualified "add everything" is
/// both slow and unreliable on large trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkStatus {
    /// Modified or untracked paths to stage.
    pub upserts: Vec<PathBuf>,
    /// Removed/missing paths to drop from the index.
    pub removals: Vec<PathBuf>,
}

impl WorkStatus {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.removals.len()
    }
}

/// Transport phase for push progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPhase {
    /// Object packing, before bytes hit the wire.
    Pack,
    /// Byte transfer to the remote.
    Transfer,
}

/// `(phase, current, total)` transport progress callback.
pub type ProgressFn<'a> = &'a mut dyn FnMut(PushPhase, u64, u64);

/// Object-store operations the engines need, mode-agnostic.
pub trait Backend: Send {
    fn mode(&self) -> BackendMode;

    fn work_dir(&self) -> &Path;

    /// Absolute path of the repository metadata directory (`.git`).
    fn git_dir(&self) -> Result<PathBuf, RepoError>;

    /// Initialize a repository in the work dir if none exists yet.
    /// Returns true when one was created.
    fn init_if_needed(&self) -> Result<bool, RepoError>;

    /// Point HEAD at a new branch with no ancestry. Neither the working tree
    /// nor the index are touched.
    fn checkout_orphan(&self, branch: &str) -> Result<(), RepoError>;

    /// Drop every entry from the index so no prior snapshot state leaks in.
    fn clear_index(&self) -> Result<(), RepoError>;

    /// Compute the working-tree status relative to the (cleared) index.
    fn status(&self) -> Result<WorkStatus, RepoError>;

    /// Stage the given adds and removals explicitly, path by path.
    fn stage(&self, status: &WorkStatus) -> Result<(), RepoError>;

    /// Commit the index to HEAD as a parentless commit.
    fn commit(&self, message: &str) -> Result<(), RepoError>;

    fn local_branches(&self) -> Result<Vec<String>, RepoError>;

    fn has_local_branch(&self, name: &str) -> Result<bool, RepoError>;

    /// List branch names on the remote (network read, no write).
    fn remote_branches(&self, remote: &RemoteLink) -> Result<Vec<String>, RepoError>;

    /// Create `temp` pointing at a merge commit whose tree is exactly the
    /// tree of `snapshot` and whose parents are `[snapshot, common]`. The
    /// synthetic ancestry only exists so the transport can delta against
    /// objects the remote already has.
    fn create_graft_branch(
        &self,
        temp: &str,
        snapshot: &str,
        common: &str,
        message: &str,
    ) -> Result<(), RepoError>;

    /// Push the given refspecs to the remote in one operation.
    fn push(
        &self,
        remote: &RemoteLink,
        refspecs: &[String],
        progress: ProgressFn<'_>,
    ) -> Result<(), RepoError>;

    fn delete_local_branch(&self, name: &str) -> Result<(), RepoError>;

    /// Remote delete via a zero-source push refspec.
    fn delete_remote_branch(&self, remote: &RemoteLink, branch: &str) -> Result<(), RepoError>;

    /// Drop a remote-tracking ref a push created as a side effect. Missing
    /// refs are not an error.
    fn delete_remote_tracking(&self, remote_name: &str, branch: &str) -> Result<(), RepoError>;

    /// Delete all historical operation logs outright. They are meaningless
    /// for an append-only independent-snapshot model and keep pruned objects
    /// alive past expectation.
    fn purge_reflogs(&self) -> Result<(), RepoError>;

    /// Run storage compaction with zero grace period and delta compression
    /// disabled.
    fn compact(&self) -> Result<(), RepoError>;

    /// Prune large-file storage with zero grace period (native mode only).
    fn lfs_prune(&self) -> Result<(), RepoError>;

    /// Whether large-file support is installed into this repository.
    fn lfs_installed(&self) -> Result<bool, RepoError>;

    /// Bring the large-file installation state in line with the backend.
    /// Returns true when something changed.
    fn set_lfs_installed(&self, wanted: bool) -> Result<bool, RepoError>;

    /// Clone exactly one branch of `source_url` into `target`.
    fn clone_branch(
        &self,
        source_url: &str,
        branch: &str,
        target: &Path,
    ) -> Result<(), RepoError>;
}

/// Construct the backend for a mode over a work dir. No I/O happens here;
/// the repository is opened per operation.
pub fn open(mode: BackendMode, work_dir: &Path) -> Box<dyn Backend> {
    match mode {
        BackendMode::Library => Box::new(LibraryBackend::new(work_dir)),
        BackendMode::Native => Box::new(NativeBackend::new(work_dir)),
    }
}
