//! Backend that shells out to the installed `git` binary.
//!
//! This is the only mode with large-file (git-lfs) support, since LFS is an
//! extension of the binary rather than of the object format. Everything goes
//! through [`crate::process`] so failures carry the child's stderr.

use std::fs;
use std::path::{Path, PathBuf};

use worldkeeper_core::types::{BackendMode, RemoteLink};

use crate::backend::{Backend, ProgressFn, PushPhase, WorkStatus};
use crate::error::{io_err, RepoError};
use crate::process;

pub struct NativeBackend {
    work_dir: PathBuf,
}

impl NativeBackend {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
        }
    }

    // -----------------------------------------------------------------------
    // 1. Internal plumbing
    // -----------------------------------------------------------------------

    fn git(&self, args: &[&str]) -> Result<String, RepoError> {
        process::run("git", &self.work_dir, args)
    }

    fn git_ok(&self, args: &[&str]) -> bool {
        process::succeeds("git", &self.work_dir, args)
    }

    fn ensure_remote(&self, link: &RemoteLink) -> Result<(), RepoError> {
        match self.git(&["remote", "get-url", &link.name]) {
            Ok(url) if url == link.url => Ok(()),
            Ok(_) => self
                .git(&["remote", "set-url", &link.name, &link.url])
                .map(|_| ()),
            Err(_) => self
                .git(&["remote", "add", &link.name, &link.url])
                .map(|_| ()),
        }
    }

    fn has_committer_identity(&self) -> bool {
        self.git_ok(&["config", "user.email"])
    }

    fn path_arg(path: &Path) -> Result<&str, RepoError> {
        path.to_str()
            .ok_or_else(|| RepoError::State(format!("non-UTF-8 path: {}", path.display())))
    }
}

/// Parse `git status --porcelain -z` output into add and remove sets.
///
/// Records are NUL-terminated; a rename/copy record is followed by one extra
/// NUL-terminated field holding the original path.
fn parse_porcelain_z(output: &str) -> WorkStatus {
    let mut status = WorkStatus::default();
    let mut fields = output.split('\0');
    while let Some(record) = fields.next() {
        if record.len() < 4 {
            continue;
        }
        let (code, path) = record.split_at(3);
        let mut chars = code.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');

        if x == 'R' || x == 'C' {
            // The new path is staged as an add, the original as a removal.
            status.upserts.push(PathBuf::from(path));
            if let Some(original) = fields.next() {
                if x == 'R' {
                    status.removals.push(PathBuf::from(original));
                }
            }
            continue;
        }

        if x == 'D' || y == 'D' {
            status.removals.push(PathBuf::from(path));
        } else {
            status.upserts.push(PathBuf::from(path));
        }
    }
    status
}

// ---------------------------------------------------------------------------
// 2. Backend implementation
// ---------------------------------------------------------------------------

impl Backend for NativeBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Native
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn git_dir(&self) -> Result<PathBuf, RepoError> {
        let reported = PathBuf::from(self.git(&["rev-parse", "--git-dir"])?);
        if reported.is_absolute() {
            Ok(reported)
        } else {
            Ok(self.work_dir.join(reported))
        }
    }

    fn init_if_needed(&self) -> Result<bool, RepoError> {
        // Checked against this directory rather than by ref discovery, which
        // would also accept an enclosing repository.
        if self.work_dir.join(".git").exists() {
            return Ok(false);
        }
        self.git(&["init", "-q"])?;
        tracing::info!("initialized repository at {}", self.work_dir.display());
        Ok(true)
    }

    fn checkout_orphan(&self, branch: &str) -> Result<(), RepoError> {
        self.git(&["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")])
            .map(|_| ())
    }

    fn clear_index(&self) -> Result<(), RepoError> {
        self.git(&["read-tree", "--empty"]).map(|_| ())
    }

    fn status(&self) -> Result<WorkStatus, RepoError> {
        let output = self.git(&["status", "--porcelain", "-z"])?;
        Ok(parse_porcelain_z(&output))
    }

    fn stage(&self, status: &WorkStatus) -> Result<(), RepoError> {
        if status.is_empty() {
            return Ok(());
        }
        // One invocation, pathspecs over stdin. `-A` stages removals too, so
        // both sets go in the same list.
        let mut pathspecs = Vec::new();
        for path in status.upserts.iter().chain(&status.removals) {
            pathspecs.extend_from_slice(Self::path_arg(path)?.as_bytes());
            pathspecs.push(0);
        }
        process::run_with_stdin(
            "git",
            &self.work_dir,
            &["add", "-A", "--pathspec-from-file=-", "--pathspec-file-nul"],
            Some(&pathspecs),
        )
        .map(|_| ())
    }

    fn commit(&self, message: &str) -> Result<(), RepoError> {
        if self.has_committer_identity() {
            self.git(&["commit", "-q", "-m", message]).map(|_| ())
        } else {
            self.git(&[
                "-c",
                "user.name=worldkeeper",
                "-c",
                "user.email=worldkeeper@localhost",
                "commit",
                "-q",
                "-m",
                message,
            ])
            .map(|_| ())
        }
    }

    fn local_branches(&self) -> Result<Vec<String>, RepoError> {
        let output = self.git(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn has_local_branch(&self, name: &str) -> Result<bool, RepoError> {
        Ok(self.git_ok(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{name}"),
        ]))
    }

    fn remote_branches(&self, remote: &RemoteLink) -> Result<Vec<String>, RepoError> {
        let output = self.git(&["ls-remote", "--heads", &remote.url])?;
        Ok(output
            .lines()
            .filter_map(|line| line.split('\t').nth(1))
            .filter_map(|refname| refname.strip_prefix("refs/heads/"))
            .map(str::to_string)
            .collect())
    }

    fn create_graft_branch(
        &self,
        temp: &str,
        snapshot: &str,
        common: &str,
        message: &str,
    ) -> Result<(), RepoError> {
        let snap_ref = format!("refs/heads/{snapshot}");
        let common_ref = format!("refs/heads/{common}");
        let oid = self.git(&[
            "commit-tree",
            &format!("{snap_ref}^{{tree}}"),
            "-p",
            &snap_ref,
            "-p",
            &common_ref,
            "-m",
            message,
        ])?;
        self.git(&["update-ref", &format!("refs/heads/{temp}"), &oid])
            .map(|_| ())
    }

    fn push(
        &self,
        remote: &RemoteLink,
        refspecs: &[String],
        progress: ProgressFn<'_>,
    ) -> Result<(), RepoError> {
        self.ensure_remote(remote)?;
        let mut args = vec!["push", "-q", remote.name.as_str()];
        args.extend(refspecs.iter().map(String::as_str));
        // The binary gives no machine-readable progress; report coarse
        // start/finish so callers still see movement.
        progress(PushPhase::Transfer, 0, 1);
        self.git(&args)?;
        progress(PushPhase::Transfer, 1, 1);
        Ok(())
    }

    fn delete_local_branch(&self, name: &str) -> Result<(), RepoError> {
        self.git(&["branch", "-D", "-q", name]).map(|_| ())
    }

    fn delete_remote_branch(&self, remote: &RemoteLink, branch: &str) -> Result<(), RepoError> {
        self.ensure_remote(remote)?;
        self.git(&["push", "-q", &remote.name, &format!(":refs/heads/{branch}")])
            .map(|_| ())
    }

    fn delete_remote_tracking(&self, remote_name: &str, branch: &str) -> Result<(), RepoError> {
        let refname = format!("refs/remotes/{remote_name}/{branch}");
        if !self.git_ok(&["show-ref", "--verify", "--quiet", &refname]) {
            return Ok(());
        }
        self.git(&["update-ref", "-d", &refname]).map(|_| ())
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
        process::compact(&self.work_dir)
    }

    fn lfs_prune(&self) -> Result<(), RepoError> {
        self.git(&["-c", "lfs.pruneoffsetdays=0", "lfs", "prune"])
            .map(|_| ())
    }

    fn lfs_installed(&self) -> Result<bool, RepoError> {
        Ok(self.git_ok(&["config", "--local", "--get", "filter.lfs.clean"]))
    }

    fn set_lfs_installed(&self, wanted: bool) -> Result<bool, RepoError> {
        let installed = self.lfs_installed()?;
        if wanted == installed {
            return Ok(false);
        }
        if wanted {
            self.git(&["lfs", "install", "--local"])?;
        } else {
            self.git(&["lfs", "uninstall", "--local"])?;
        }
        Ok(true)
    }

    fn clone_branch(&self, source_url: &str, branch: &str, target: &Path) -> Result<(), RepoError> {
        self.git(&[
            "clone",
            "-q",
            "--branch",
            branch,
            "--single-branch",
            source_url,
            Self::path_arg(target)?,
        ])
        .map(|_| ())
    }
}
