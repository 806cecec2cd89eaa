//! Project root discovery
//!
//! The project root is the closest ancestor whose `Cargo.toml` declares a
//! `[workspace]`. Member manifests along the way are skipped.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{InteropError, InteropResult};

/// Manifest file checked in each directory
pub const MANIFEST_FILE: &str = "Cargo.toml";

/// Location of the application under test, relative to the project root
pub const SITE_RELATIVE_PATH: &[&str] = &["crates", "interop-site"];

/// Walk upward from `start_dir` to the closest workspace root.
pub fn find_project_root(start_dir: &Path) -> InteropResult<PathBuf> {
    let start = if start_dir.is_absolute() {
        start_dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(start_dir)
    };

    for dir in start.ancestors() {
        if is_workspace_root(dir) {
            debug!("Project root: {}", dir.display());
            return Ok(dir.to_path_buf());
        }
    }

    Err(InteropError::ProjectRootNotFound(start))
}

/// Project root above the process working directory
pub fn find_project_root_from_cwd() -> InteropResult<PathBuf> {
    find_project_root(&std::env::current_dir()?)
}

/// Path of the interop site inside a project root
pub fn site_application_path(root: &Path) -> PathBuf {
    SITE_RELATIVE_PATH
        .iter()
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

fn is_workspace_root(dir: &Path) -> bool {
    let manifest = dir.join(MANIFEST_FILE);
    let Ok(contents) = std::fs::read_to_string(&manifest) else {
        return false;
    };

    match contents.parse::<toml::Table>() {
        Ok(table) => table.contains_key("workspace"),
        Err(e) => {
            warn!("Ignoring unparseable manifest {}: {}", manifest.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const WORKSPACE_MANIFEST: &str = "[workspace]\nmembers = [\"crates/a\"]\n";
    const MEMBER_MANIFEST: &str = "[package]\nname = \"a\"\nversion = \"0.1.0\"\n";

    fn tree() -> TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let member = tmp.path().join("crates").join("a").join("src");
        fs::create_dir_all(&member).unwrap();
        fs::write(tmp.path().join(MANIFEST_FILE), WORKSPACE_MANIFEST).unwrap();
        fs::write(tmp.path().join("crates/a").join(MANIFEST_FILE), MEMBER_MANIFEST).unwrap();
        tmp
    }

    #[test]
    fn test_finds_root_from_nested_dir() {
        let tmp = tree();
        let start = tmp.path().join("crates/a/src");
        assert_eq!(find_project_root(&start).unwrap(), tmp.path());
    }

    #[test]
    fn test_member_manifest_is_not_a_marker() {
        let tmp = tree();
        let start = tmp.path().join("crates/a");
        assert_eq!(find_project_root(&start).unwrap(), tmp.path());
    }

    #[test]
    fn test_closest_workspace_wins() {
        let tmp = tree();
        let inner = tmp.path().join("vendor").join("inner");
        fs::create_dir_all(inner.join("deep")).unwrap();
        fs::write(inner.join(MANIFEST_FILE), WORKSPACE_MANIFEST).unwrap();

        assert_eq!(find_project_root(&inner.join("deep")).unwrap(), inner);
    }

    #[test]
    fn test_idempotent_from_result() {
        let tmp = tree();
        let root = find_project_root(&tmp.path().join("crates/a/src")).unwrap();
        assert_eq!(find_project_root(&root).unwrap(), root);
    }

    #[test]
    fn test_unparseable_manifest_is_skipped() {
        let tmp = tree();
        let broken = tmp.path().join("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(MANIFEST_FILE), "[workspace\nthis is not toml").unwrap();

        assert_eq!(find_project_root(&broken).unwrap(), tmp.path());
    }

    #[test]
    fn test_no_marker_up_to_filesystem_root() {
        let tmp = tempfile::tempdir().unwrap();
        let start = tmp.path().join("lonely").join("dir");
        fs::create_dir_all(&start).unwrap();
        fs::write(start.join(MANIFEST_FILE), MEMBER_MANIFEST).unwrap();

        match find_project_root(&start) {
            Err(InteropError::ProjectRootNotFound(from)) => assert_eq!(from, start),
            other => panic!("expected ProjectRootNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_site_application_path() {
        let path = site_application_path(Path::new("/repo"));
        assert_eq!(path, Path::new("/repo").join("crates").join("interop-site"));
    }

    #[test]
    fn test_this_repository_has_a_root() {
        let root = find_project_root(Path::new(env!("CARGO_MANIFEST_DIR"))).unwrap();
        assert!(site_application_path(&root).join(MANIFEST_FILE).exists());
    }
}
