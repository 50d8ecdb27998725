//! Pre-flight maintenance run before every snapshot.
//!
//! Idempotent by construction: a second run over an unchanged tree reports
//! no changes and writes nothing.

use std::fs;
use std::path::Path;

use serde::Serialize;

use worldkeeper_core::hooks::{HostHooks, Severity};
use worldkeeper_core::types::{BackupConfig, WorldId};
use worldkeeper_core::identity;
use worldkeeper_repo::lock::{clear_stale_index_lock, StaleLock};
use worldkeeper_repo::Backend;

use crate::error::EngineError;

const GITIGNORE: &str = ".gitignore";
const GITATTRIBUTES: &str = ".gitattributes";

/// Lines that must be in `.gitignore`: engine state and the host's own
/// session lock never belong in a snapshot.
const IGNORED_ENTRIES: &[&str] = &[".worldkeeper/", "session.lock"];

/// Binary world data must never go through newline normalization.
const NO_TEXT_CONVERSION: &str = "* -text";

/// What the pre-flight pass found and fixed.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub world: WorldId,
    pub identity_created: bool,
    pub repo_created: bool,
    pub gitignore_updated: bool,
    pub gitattributes_updated: bool,
    pub lfs_changed: bool,
    pub stale_lock_removed: bool,
}

/// Bring a tree to a snapshot-ready state.
pub fn run(
    tree: &Path,
    backend: &dyn Backend,
    config: &BackupConfig,
    hooks: &HostHooks<'_>,
) -> Result<MaintenanceReport, EngineError> {
    let repo_created = backend.init_if_needed()?;
    let (world, identity_created) = identity::ensure(tree)?;

    let gitignore_updated = ensure_lines(&tree.join(GITIGNORE), IGNORED_ENTRIES)?;

    let mut attribute_lines: Vec<String> = vec![NO_TEXT_CONVERSION.to_string()];
    let lfs_wanted = config.native_mode && !config.lfs_patterns.is_empty();
    if lfs_wanted {
        for pattern in &config.lfs_patterns {
            attribute_lines.push(format!("{pattern} filter=lfs diff=lfs merge=lfs -text"));
        }
    }
    let attribute_refs: Vec<&str> = attribute_lines.iter().map(String::as_str).collect();
    let gitattributes_updated = ensure_lines(&tree.join(GITATTRIBUTES), &attribute_refs)?;

    let lfs_changed = backend.set_lfs_installed(lfs_wanted)?;
    if lfs_changed {
        tracing::info!(
            "large-file support {} for {}",
            if lfs_wanted { "installed" } else { "removed" },
            tree.display()
        );
    }

    let stale_lock_removed = match clear_stale_index_lock(
        &backend.git_dir()?,
        config.remove_stale_lock,
    )? {
        StaleLock::Clear => false,
        StaleLock::Removed(path) => {
            hooks.sink.styled(
                Severity::Warning,
                &format!("removed stale repository lock ({})", path.display()),
            );
            true
        }
        StaleLock::Present(path) => {
            hooks.sink.styled(
                Severity::Warning,
                &format!(
                    "repository lock present at {}; snapshots will fail while it remains",
                    path.display()
                ),
            );
            false
        }
    };

    Ok(MaintenanceReport {
        world,
        identity_created,
        repo_created,
        gitignore_updated,
        gitattributes_updated,
        lfs_changed,
        stale_lock_removed,
    })
}

/// Append any of `wanted` missing from the file, preserving existing content
/// and order. Returns true when the file was rewritten.
fn ensure_lines(path: &Path, wanted: &[&str]) -> Result<bool, EngineError> {
    let existing = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(EngineError::State(worldkeeper_repo::RepoError::Io {
                path: path.to_path_buf(),
                source: e,
            }))
        }
    };

    let present: Vec<&str> = existing.lines().map(str::trim).collect();
    let missing: Vec<&str> = wanted
        .iter()
        .copied()
        .filter(|line| !present.contains(line))
        .collect();
    if missing.is_empty() {
        return Ok(false);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    for line in missing {
        updated.push_str(line);
        updated.push('\n');
    }

    let tmp = path.with_extension("tmp");
    let write = |p: &Path, e: std::io::Error| {
        EngineError::State(worldkeeper_repo::RepoError::Io {
            path: p.to_path_buf(),
            source: e,
        })
    };
    fs::write(&tmp, &updated).map_err(|e| write(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| write(path, e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gets_all_lines() {
        let dir = TempDir::new().expect("dir");
        let path = dir.path().join(GITIGNORE);
        assert!(ensure_lines(&path, IGNORED_ENTRIES).expect("ensure"));
        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text, ".worldkeeper/\nsession.lock\n");
    }

    #[test]
    fn existing_lines_are_not_duplicated() {
        let dir = TempDir::new().expect("dir");
        let path = dir.path().join(GITIGNORE);
        fs::write(&path, "session.lock\ncustom-entry\n").expect("write");

        assert!(ensure_lines(&path, IGNORED_ENTRIES).expect("ensure"));
        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text, "session.lock\ncustom-entry\n.worldkeeper/\n");

        assert!(!ensure_lines(&path, IGNORED_ENTRIES).expect("second run"));
    }

    #[test]
    fn file_without_trailing_newline_is_repaired() {
        let dir = TempDir::new().expect("dir");
        let path = dir.path().join(GITATTRIBUTES);
        fs::write(&path, "existing").expect("write");

        ensure_lines(&path, &[NO_TEXT_CONVERSION]).expect("ensure");
        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text, "existing\n* -text\n");
    }
}
