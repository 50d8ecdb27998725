//! Identity file handling.
//!
//! # Storage layout
//!
//! ```text
//! <tree>/
//!   .worldkeeper/
//!     world-id      (current location — one hyphenated UUID, mode 0600)
//!   .world-id       (legacy location — migrated forward when found)
//! ```
//!
//! The id is created on the first maintenance pass over a tree that lacks
//! one and never changes afterwards. Writes use an atomic `.tmp` + rename.

use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};
use crate::types::WorldId;

/// Directory beside the tree root holding worldkeeper state.
pub const STATE_DIR: &str = ".worldkeeper";

/// Identity file name inside [`STATE_DIR`].
pub const IDENTITY_FILE: &str = "world-id";

/// Legacy identity file at the tree root, from older releases.
pub const LEGACY_IDENTITY_FILE: &str = ".world-id";

/// `<tree>/.worldkeeper/world-id` — pure, no I/O.
pub fn identity_path(tree: &Path) -> PathBuf {
    tree.join(STATE_DIR).join(IDENTITY_FILE)
}

/// `<tree>/.world-id` — pure, no I/O.
pub fn legacy_identity_path(tree: &Path) -> PathBuf {
    tree.join(LEGACY_IDENTITY_FILE)
}

/// Load the world id if an identity file exists at either location.
///
/// Does not create or migrate anything; returns `Ok(None)` when the tree has
/// no identity yet.
pub fn load(tree: &Path) -> Result<Option<WorldId>, CoreError> {
    for path in [identity_path(tree), legacy_identity_path(tree)] {
        if path.exists() {
            return read_id(&path).map(Some);
        }
    }
    Ok(None)
}

/// Ensure the tree has an identity at the current location.
///
/// Creates a fresh id if none exists, migrates a legacy file forward, and
/// returns `(id, changed)` where `changed` is false when nothing was touched
/// (so running this twice on an unchanged tree is a no-op the second time).
pub fn ensure(tree: &Path) -> Result<(WorldId, bool), CoreError> {
    let current = identity_path(tree);
    if current.exists() {
        return Ok((read_id(&current)?, false));
    }

    let legacy = legacy_identity_path(tree);
    if legacy.exists() {
        let id = read_id(&legacy)?;
        write_id(&current, id)?;
        std::fs::remove_file(&legacy).map_err(|e| io_err(&legacy, e))?;
        tracing::info!(
            "migrated world id {id} from {} to {}",
            legacy.display(),
            current.display()
        );
        return Ok((id, true));
    }

    let id = WorldId::generate();
    write_id(&current, id)?;
    tracing::info!("created world id {id} at {}", current.display());
    Ok((id, true))
}

fn read_id(path: &Path) -> Result<WorldId, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let value = contents.trim();
    value.parse::<WorldId>().map_err(|_| CoreError::InvalidWorldId {
        path: path.to_path_buf(),
        value: value.to_string(),
    })
}

fn write_id(path: &Path, id: WorldId) -> Result<(), CoreError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid identity path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, format!("{id}\n")).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_creates_identity_once() {
        let tree = TempDir::new().expect("tree");
        let (first, changed) = ensure(tree.path()).expect("ensure");
        assert!(changed, "first run must create the file");

        let (second, changed) = ensure(tree.path()).expect("ensure again");
        assert!(!changed, "second run must be a no-op");
        assert_eq!(first, second);
    }

    #[test]
    fn load_returns_none_for_fresh_tree() {
        let tree = TempDir::new().expect("tree");
        assert!(load(tree.path()).expect("load").is_none());
    }

    #[test]
    fn legacy_identity_is_migrated_forward() {
        let tree = TempDir::new().expect("tree");
        let id = WorldId::generate();
        std::fs::write(legacy_identity_path(tree.path()), format!("{id}\n")).expect("write legacy");

        let (loaded, changed) = ensure(tree.path()).expect("ensure");
        assert_eq!(loaded, id, "migration must preserve the id");
        assert!(changed);
        assert!(!legacy_identity_path(tree.path()).exists());
        assert!(identity_path(tree.path()).exists());
    }

    #[test]
    fn corrupt_identity_file_is_an_error() {
        let tree = TempDir::new().expect("tree");
        let path = identity_path(tree.path());
        std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
        std::fs::write(&path, "not-a-uuid\n").expect("write");

        let err = ensure(tree.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidWorldId { .. }));
    }

    #[test]
    fn tmp_file_cleaned_up_after_write() {
        let tree = TempDir::new().expect("tree");
        ensure(tree.path()).expect("ensure");
        let tmp = identity_path(tree.path()).with_extension("tmp");
        assert!(!tmp.exists(), ".tmp must be gone after atomic rename");
    }
}
