//! Embedded object-store backend built on git2.
//!
//! No subprocess is spawned for regular operations; only storage compaction
//! shells out, because the library exposes no GC entry point. Large-file
//! support is deliberately absent here, it belongs to the native backend.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use git2::build::RepoBuilder;
use git2::{
    BranchType, Cred, CredentialType, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks,
    Repository, Signature, StatusOptions,
};

use worldkeeper_core::types::{BackendMode, RemoteLink};

use crate::backend::{Backend, ProgressFn, PushPhase, WorkStatus};
use crate::error::{io_err, RepoError};

/// Fallback committer identity when no global git config exists. Hosts that
/// embed the engine rarely have one.
const FALLBACK_NAME: &str = "worldkeeper";
const FALLBACK_EMAIL: &str = "worldkeeper@localhost";

pub struct LibraryBackend {
    work_dir: PathBuf,
}

impl LibraryBackend {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
        }
    }

    // -----------------------------------------------------------------------
    // 1. Internal plumbing
    // -----------------------------------------------------------------------

    fn repo(&self) -> Result<Repository, RepoError> {
        Ok(Repository::open(&self.work_dir)?)
    }

    fn signature(repo: &Repository) -> Result<Signature<'static>, RepoError> {
        match repo.signature() {
            Ok(sig) => Ok(sig),
            Err(_) => Ok(Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)?),
        }
    }

    /// Resolve the configured remote, creating it or refreshing its URL so a
    /// renamed remote in config cannot point pushes at a stale host.
    fn ensure_remote<'r>(
        repo: &'r Repository,
        link: &RemoteLink,
    ) -> Result<git2::Remote<'r>, RepoError> {
        match repo.find_remote(&link.name) {
            Ok(remote) => {
                if remote.url().ok() != Some(link.url.as_str()) {
                    repo.remote_set_url(&link.name, &link.url)?;
                    return Ok(repo.find_remote(&link.name)?);
                }
                Ok(remote)
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(repo.remote(&link.name, &link.url)?),
            Err(e) => Err(e.into()),
        }
    }

    fn auth_callbacks<'cb>() -> RemoteCallbacks<'cb> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, allowed| {
            if allowed.contains(CredentialType::SSH_KEY) {
                Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
            } else {
                Cred::default()
            }
        });
        callbacks
    }

    /// One push of all refspecs, surfacing per-ref rejections as a state
    /// error so a denied delete does not pass silently.
    fn push_refspecs(
        &self,
        link: &RemoteLink,
        refspecs: &[String],
        progress: ProgressFn<'_>,
    ) -> Result<(), RepoError> {
        let repo = self.repo()?;
        let mut remote = Self::ensure_remote(&repo, link)?;

        // Three independent callbacks need the same sink.
        let progress = RefCell::new(progress);
        let rejections: RefCell<Vec<String>> = RefCell::new(Vec::new());

        let mut callbacks = Self::auth_callbacks();
        callbacks.pack_progress(|_stage, current, total| {
            (*progress.borrow_mut())(PushPhase::Pack, current as u64, total as u64);
        });
        callbacks.push_transfer_progress(|current, total, _bytes| {
            (*progress.borrow_mut())(PushPhase::Transfer, current as u64, total as u64);
        });
        callbacks.push_update_reference(|refname, status| {
            if let Some(reason) = status {
                rejections.borrow_mut().push(format!("{refname}: {reason}"));
            }
            Ok(())
        });

        {
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            let specs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
            remote.push(&specs, Some(&mut options))?;
        }

        let rejections = rejections.into_inner();
        if !rejections.is_empty() {
            return Err(RepoError::State(format!(
                "remote rejected refs: {}",
                rejections.join("; ")
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 2. Backend implementation
// ---------------------------------------------------------------------------

impl Backend for LibraryBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Library
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn git_dir(&self) -> Result<PathBuf, RepoError> {
        Ok(self.repo()?.path().to_path_buf())
    }

    fn init_if_needed(&self) -> Result<bool, RepoError> {
        match Repository::open(&self.work_dir) {
            Ok(_) => Ok(false),
            Err(e) if e.code() == ErrorCode::NotFound => {
                Repository::init(&self.work_dir)?;
                tracing::info!("initialized repository at {}", self.work_dir.display());
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn checkout_orphan(&self, branch: &str) -> Result<(), RepoError> {
        // Pointing HEAD at an unborn branch is legal; the next commit
        // creates the ref with no ancestry.
        self.repo()?.set_head(&format!("refs/heads/{branch}"))?;
        Ok(())
    }

    fn clear_index(&self) -> Result<(), RepoError> {
        let repo = self.repo()?;
        let mut index = repo.index()?;
        index.clear()?;
        index.write()?;
        Ok(())
    }

    fn status(&self) -> Result<WorkStatus, RepoError> {
        let repo = self.repo()?;
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .exclude_submodules(true);

        let mut result = WorkStatus::default();
        for entry in repo.statuses(Some(&mut options))?.iter() {
            let Ok(path) = entry.path() else { continue };
            let flags = entry.status();
            if flags.is_wt_deleted() || flags.is_index_deleted() {
                result.removals.push(PathBuf::from(path));
            } else {
                result.upserts.push(PathBuf::from(path));
            }
        }
        Ok(result)
    }

    fn stage(&self, status: &WorkStatus) -> Result<(), RepoError> {
        let repo = self.repo()?;
        let mut index = repo.index()?;
        for path in &status.upserts {
            index.add_path(path)?;
        }
        for path in &status.removals {
            index.remove_path(path)?;
        }
        index.write()?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<(), RepoError> {
        let repo = self.repo()?;
        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = Self::signature(&repo)?;
        // Parentless even when HEAD is born: every snapshot is its own root.
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?;
        Ok(())
    }

    fn local_branches(&self) -> Result<Vec<String>, RepoError> {
        let repo = self.repo()?;
        let mut names = Vec::new();
        for branch in repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn has_local_branch(&self, name: &str) -> Result<bool, RepoError> {
        match self.repo()?.find_branch(name, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remote_branches(&self, link: &RemoteLink) -> Result<Vec<String>, RepoError> {
        let repo = self.repo()?;
        let mut remote = repo.remote_anonymous(&link.url)?;
        let connection =
            remote.connect_auth(git2::Direction::Fetch, Some(Self::auth_callbacks()), None)?;
        let names = connection
            .list()?
            .iter()
            .filter_map(|head| head.name().strip_prefix("refs/heads/"))
            .map(str::to_string)
            .collect();
        Ok(names)
    }

    fn create_graft_branch(
        &self,
        temp: &str,
        snapshot: &str,
        common: &str,
        message: &str,
    ) -> Result<(), RepoError> {
        let repo = self.repo()?;
        let snap_commit = repo
            .find_branch(snapshot, BranchType::Local)?
            .get()
            .peel_to_commit()?;
        let common_commit = repo
            .find_branch(common, BranchType::Local)?
            .get()
            .peel_to_commit()?;
        let tree = snap_commit.tree()?;
        let sig = Self::signature(&repo)?;
        repo.commit(
            Some(&format!("refs/heads/{temp}")),
            &sig,
            &sig,
            message,
            &tree,
            &[&snap_commit, &common_commit],
        )?;
        Ok(())
    }

    fn push(
        &self,
        remote: &RemoteLink,
        refspecs: &[String],
        progress: ProgressFn<'_>,
    ) -> Result<(), RepoError> {
        self.push_refspecs(remote, refspecs, progress)
    }

    fn delete_local_branch(&self, name: &str) -> Result<(), RepoError> {
        let repo = self.repo()?;
        let mut branch = repo.find_branch(name, BranchType::Local)?;
        branch.delete()?;
        Ok(())
    }

    fn delete_remote_branch(&self, remote: &RemoteLink, branch: &str) -> Result<(), RepoError> {
        let refspec = format!(":refs/heads/{branch}");
        self.push_refspecs(remote, &[refspec], &mut |_, _, _| {})
    }

    fn delete_remote_tracking(&self, remote_name: &str, branch: &str) -> Result<(), RepoError> {
        let repo = self.repo()?;
        let result = match repo.find_reference(&format!("refs/remotes/{remote_name}/{branch}")) {
            Ok(mut reference) => {
                reference.delete()?;
                Ok(())
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        };
        result
    }

    fn purge_reflogs(&self) -> Result<(), RepoError> {
        let logs = self.git_dir()?.join("logs");
        match fs::remove_dir_all(&logs) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(logs, e)),
        }
    }

    fn compact(&self) -> Result<(), RepoError> {
        crate::process::compact(&self.work_dir)
    }

    fn lfs_prune(&self) -> Result<(), RepoError> {
        Err(RepoError::State(
            "large-file pruning requires the native backend".into(),
        ))
    }

    fn lfs_installed(&self) -> Result<bool, RepoError> {
        let repo = self.repo()?;
        let config = repo.config()?.snapshot()?;
        match config.get_str("filter.lfs.clean") {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn set_lfs_installed(&self, wanted: bool) -> Result<bool, RepoError> {
        if wanted {
            return Err(RepoError::State(
                "large-file support requires the native backend".into(),
            ));
        }
        let repo = self.repo()?;
        let mut config = repo.config()?.open_level(git2::ConfigLevel::Local)?;
        let mut changed = false;
        for key in [
            "filter.lfs.clean",
            "filter.lfs.smudge",
            "filter.lfs.process",
            "filter.lfs.required",
        ] {
            match config.remove(key) {
                Ok(()) => changed = true,
                Err(e) if e.code() == ErrorCode::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(changed)
    }

    fn clone_branch(&self, source_url: &str, branch: &str, target: &Path) -> Result<(), RepoError> {
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(Self::auth_callbacks());

        let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
        RepoBuilder::new()
            .branch(branch)
            .fetch_options(fetch)
            .remote_create(move |repo, name, url| repo.remote_with_fetch(name, url, &refspec))
            .clone(source_url, target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend(dir: &TempDir) -> LibraryBackend {
        LibraryBackend::new(dir.path())
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().expect("dir");
        let lib = backend(&dir);
        assert!(lib.init_if_needed().expect("first init"));
        assert!(!lib.init_if_needed().expect("second init"));
        assert!(lib.git_dir().expect("git dir").exists());
    }

    #[test]
    fn orphan_commit_has_no_parent() {
        let dir = TempDir::new().expect("dir");
        let lib = backend(&dir);
        lib.init_if_needed().expect("init");
        std::fs::write(dir.path().join("level.dat"), b"chunk").expect("write");

        lib.checkout_orphan("snapshots/w/2025-01-01_00-00-00")
            .expect("orphan");
        lib.clear_index().expect("clear");
        let status = lib.status().expect("status");
        assert_eq!(status.upserts, vec![PathBuf::from("level.dat")]);
        lib.stage(&status).expect("stage");
        lib.commit("snapshot").expect("commit");

        let repo = Repository::open(dir.path()).expect("open");
        let head = repo.head().expect("head").peel_to_commit().expect("commit");
        assert_eq!(head.parent_count(), 0);
        assert_eq!(
            lib.local_branches().expect("branches"),
            vec!["snapshots/w/2025-01-01_00-00-00".to_string()]
        );
    }

    #[test]
    fn second_orphan_sees_full_tree_not_diff() {
        let dir = TempDir::new().expect("dir");
        let lib = backend(&dir);
        lib.init_if_needed().expect("init");
        std::fs::write(dir.path().join("a.dat"), b"a").expect("write");

        lib.checkout_orphan("one").expect("orphan");
        lib.clear_index().expect("clear");
        let status = lib.status().expect("status");
        lib.stage(&status).expect("stage");
        lib.commit("one").expect("commit");

        // Unchanged files must still show up after the index is cleared.
        lib.checkout_orphan("two").expect("orphan");
        lib.clear_index().expect("clear");
        let status = lib.status().expect("status");
        assert_eq!(status.upserts, vec![PathBuf::from("a.dat")]);
    }

    #[test]
    fn status_classifies_removals() {
        let dir = TempDir::new().expect("dir");
        let lib = backend(&dir);
        lib.init_if_needed().expect("init");
        std::fs::write(dir.path().join("keep.dat"), b"k").expect("write");
        std::fs::write(dir.path().join("gone.dat"), b"g").expect("write");

        lib.checkout_orphan("one").expect("orphan");
        let status = lib.status().expect("status");
        lib.stage(&status).expect("stage");
        lib.commit("one").expect("commit");

        std::fs::remove_file(dir.path().join("gone.dat")).expect("remove");
        let status = lib.status().expect("status");
        assert_eq!(status.removals, vec![PathBuf::from("gone.dat")]);
        assert!(status.upserts.is_empty());
    }

    #[test]
    fn lfs_install_is_rejected() {
        let dir = TempDir::new().expect("dir");
        let lib = backend(&dir);
        lib.init_if_needed().expect("init");
        assert!(!lib.lfs_installed().expect("query"));
        assert!(lib.set_lfs_installed(true).is_err());
        assert!(!lib.set_lfs_installed(false).expect("noop removal"));
    }

    #[test]
    fn delete_missing_tracking_ref_is_ok() {
        let dir = TempDir::new().expect("dir");
        let lib = backend(&dir);
        lib.init_if_needed().expect("init");
        lib.delete_remote_tracking("origin", "snapshots/x/t")
            .expect("missing ref tolerated");
    }
}
