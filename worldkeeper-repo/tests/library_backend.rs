//! End-to-end backend tests against real on-disk repositories.
//!
//! Remotes are local bare repositories addressed by path, so no network or
//! credentials are involved.

use std::fs;
use std::path::PathBuf;

use git2::Repository;
use tempfile::TempDir;

use worldkeeper_core::types::{BackendMode, RemoteLink};
use worldkeeper_repo::{open, Backend};

struct Fixture {
    work: TempDir,
    backend: Box<dyn Backend>,
}

fn fixture() -> Fixture {
    let work = TempDir::new().expect("work dir");
    let backend = open(BackendMode::Library, work.path());
    backend.init_if_needed().expect("init");
    Fixture { work, backend }
}

fn bare_remote() -> (TempDir, RemoteLink) {
    let dir = TempDir::new().expect("remote dir");
    Repository::init_bare(dir.path()).expect("init bare");
    let link = RemoteLink::new("backup", dir.path().display().to_string());
    (dir, link)
}

/// Write files and commit them as a fresh parentless snapshot branch.
fn snapshot(fx: &Fixture, branch: &str, files: &[(&str, &str)]) {
    for (name, contents) in files {
        let path = fx.work.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, contents).expect("write");
    }
    fx.backend.checkout_orphan(branch).expect("orphan");
    fx.backend.clear_index().expect("clear index");
    let status = fx.backend.status().expect("status");
    fx.backend.stage(&status).expect("stage");
    fx.backend.commit(branch).expect("commit");
}

// ---------------------------------------------------------------------------
// Snapshot commits
// ---------------------------------------------------------------------------

#[test]
fn every_snapshot_is_an_independent_root() {
    let fx = fixture();
    snapshot(&fx, "snap-1", &[("level.dat", "v1")]);
    snapshot(&fx, "snap-2", &[("level.dat", "v2")]);

    let repo = Repository::open(fx.work.path()).expect("open");
    for name in ["snap-1", "snap-2"] {
        let commit = repo
            .find_branch(name, git2::BranchType::Local)
            .expect("branch")
            .get()
            .peel_to_commit()
            .expect("commit");
        assert_eq!(commit.parent_count(), 0, "{name} must be parentless");
    }

    let mut branches = fx.backend.local_branches().expect("branches");
    branches.sort();
    assert_eq!(branches, vec!["snap-1".to_string(), "snap-2".to_string()]);
    assert!(fx.backend.has_local_branch("snap-1").expect("query"));
    assert!(!fx.backend.has_local_branch("snap-9").expect("query"));
}

#[test]
fn graft_branch_carries_snapshot_tree_with_two_parents() {
    let fx = fixture();
    snapshot(&fx, "snap-1", &[("level.dat", "v1"), ("region/r.mca", "a")]);
    snapshot(&fx, "snap-2", &[("level.dat", "v2")]);

    fx.backend
        .create_graft_branch("temp/snap-2", "snap-2", "snap-1", "sync snap-2")
        .expect("graft");

    let repo = Repository::open(fx.work.path()).expect("open");
    let graft = repo
        .find_branch("temp/snap-2", git2::BranchType::Local)
        .expect("branch")
        .get()
        .peel_to_commit()
        .expect("commit");
    let snap2 = repo
        .find_branch("snap-2", git2::BranchType::Local)
        .expect("branch")
        .get()
        .peel_to_commit()
        .expect("commit");
    let snap1 = repo
        .find_branch("snap-1", git2::BranchType::Local)
        .expect("branch")
        .get()
        .peel_to_commit()
        .expect("commit");

    assert_eq!(graft.parent_count(), 2);
    assert_eq!(graft.parent_id(0).expect("p0"), snap2.id());
    assert_eq!(graft.parent_id(1).expect("p1"), snap1.id());
    // The graft exists only for transport; its content is exactly snap-2.
    assert_eq!(graft.tree_id(), snap2.tree_id());
}

// ---------------------------------------------------------------------------
// Remote transport against a local bare repository
// ---------------------------------------------------------------------------

#[test]
fn push_list_and_delete_remote_branches() {
    let fx = fixture();
    let (_remote_dir, link) = bare_remote();
    snapshot(&fx, "snap-1", &[("level.dat", "v1")]);
    snapshot(&fx, "snap-2", &[("level.dat", "v2")]);

    let refspecs = vec![
        "refs/heads/snap-1:refs/heads/snap-1".to_string(),
        "refs/heads/snap-2:refs/heads/snap-2".to_string(),
    ];
    let mut seen_progress = false;
    fx.backend
        .push(&link, &refspecs, &mut |_phase, _cur, _total| {
            seen_progress = true;
        })
        .expect("push");

    let mut remote = fx.backend.remote_branches(&link).expect("list");
    remote.sort();
    assert_eq!(remote, vec!["snap-1".to_string(), "snap-2".to_string()]);

    fx.backend
        .delete_remote_branch(&link, "snap-1")
        .expect("remote delete");
    assert_eq!(
        fx.backend.remote_branches(&link).expect("list"),
        vec!["snap-2".to_string()]
    );
}

#[test]
fn local_branch_delete_does_not_touch_remote() {
    let fx = fixture();
    let (_remote_dir, link) = bare_remote();
    snapshot(&fx, "snap-1", &[("level.dat", "v1")]);

    fx.backend
        .push(
            &link,
            &["refs/heads/snap-1:refs/heads/snap-1".to_string()],
            &mut |_, _, _| {},
        )
        .expect("push");
    fx.backend.delete_local_branch("snap-1").expect("delete");

    assert!(!fx.backend.has_local_branch("snap-1").expect("query"));
    assert_eq!(
        fx.backend.remote_branches(&link).expect("list"),
        vec!["snap-1".to_string()]
    );
}

#[test]
fn clone_single_branch_restores_tree() {
    let fx = fixture();
    snapshot(&fx, "snap-1", &[("level.dat", "v1"), ("region/r.mca", "blob")]);
    snapshot(&fx, "snap-2", &[("level.dat", "v2")]);

    let target_dir = TempDir::new().expect("target");
    let target: PathBuf = target_dir.path().join("restored");
    fx.backend
        .clone_branch(&fx.work.path().display().to_string(), "snap-1", &target)
        .expect("clone");

    assert_eq!(fs::read_to_string(target.join("level.dat")).expect("read"), "v1");
    assert_eq!(
        fs::read_to_string(target.join("region/r.mca")).expect("read"),
        "blob"
    );
}

// ---------------------------------------------------------------------------
// Reclamation plumbing
// ---------------------------------------------------------------------------

#[test]
fn purging_reflogs_removes_the_logs_dir() {
    let fx = fixture();
    snapshot(&fx, "snap-1", &[("level.dat", "v1")]);

    let logs = fx.backend.git_dir().expect("git dir").join("logs");
    assert!(logs.exists(), "commits should have produced reflogs");
    fx.backend.purge_reflogs().expect("purge");
    assert!(!logs.exists());
    // Purging twice must stay quiet.
    fx.backend.purge_reflogs().expect("second purge");
}
