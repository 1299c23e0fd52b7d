//! Environment file discovery and replication
//!
//! Copies `.env*` files from the source repository into a new worktree,
//! preserving relative paths. The copy is not atomic: per-file failures are
//! logged and skipped, and the returned count reflects successes only.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Directories that never contain environment files worth copying
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    "dist",
    "build",
    "vendor",
    ".next",
];

fn is_searchable(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return true;
    }
    entry
        .file_name()
        .to_str()
        .map(|name| !SKIPPED_DIRS.contains(&name))
        .unwrap_or(true)
}

fn is_env_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(".env"))
            .unwrap_or(false)
}

/// Recursively locate `.env*` files under `source_root`.
///
/// Traversal errors are logged and skipped; a completely failed search
/// yields an empty list rather than an error.
pub fn find_env_files(source_root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(source_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(is_searchable)
    {
        match entry {
            Ok(entry) if is_env_file(&entry) => files.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => debug!("Skipping unreadable entry during env search: {err}"),
        }
    }

    files
}

/// Copy discovered env files into `target_root`, recreating relative paths.
///
/// Returns the number of files successfully copied.
pub fn copy_env_files(source_root: &Path, target_root: &Path) -> usize {
    let mut copied = 0;

    for file in find_env_files(source_root) {
        let relative = match file.strip_prefix(source_root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => {
                warn!("Skipping env file outside source root: {}", file.display());
                continue;
            }
        };

        let destination = target_root.join(&relative);
        if let Some(parent) = destination.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!("Could not create {}: {err}", parent.display());
                continue;
            }
        }

        match fs::copy(&file, &destination) {
            Ok(_) => {
                debug!("Copied {}", relative.display());
                copied += 1;
            }
            Err(err) => {
                warn!("Could not copy {}: {err}", relative.display());
            }
        }
    }

    copied
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "KEY=value\n").unwrap();
    }

    #[test]
    fn test_find_env_files_recursive() {
        let source = TempDir::new().unwrap();
        touch(&source.path().join(".env"));
        touch(&source.path().join(".env.local"));
        touch(&source.path().join("packages/api/.env.local"));
        touch(&source.path().join("README.md"));

        let mut found: Vec<_> = find_env_files(source.path())
            .into_iter()
            .map(|path| path.strip_prefix(source.path()).unwrap().to_path_buf())
            .collect();
        found.sort();

        assert_eq!(
            found,
            vec![
                PathBuf::from(".env"),
                PathBuf::from(".env.local"),
                PathBuf::from("packages/api/.env.local"),
            ]
        );
    }

    #[test]
    fn test_find_env_files_skips_dependency_dirs() {
        let source = TempDir::new().unwrap();
        touch(&source.path().join(".env"));
        touch(&source.path().join("node_modules/pkg/.env"));
        touch(&source.path().join(".git/.env"));
        touch(&source.path().join("target/.env.production"));

        let found = find_env_files(source.path());
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with(".env"));
    }

    #[test]
    fn test_find_env_files_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(find_env_files(&missing).is_empty());
    }

    #[test]
    fn test_copy_preserves_relative_paths() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        touch(&source.path().join(".env"));
        touch(&source.path().join("packages/api/.env.local"));

        let copied = copy_env_files(source.path(), target.path());

        assert_eq!(copied, 2);
        assert!(target.path().join(".env").is_file());
        assert!(target.path().join("packages/api/.env.local").is_file());
        assert_eq!(
            fs::read_to_string(target.path().join("packages/api/.env.local")).unwrap(),
            "KEY=value\n"
        );
    }

    #[test]
    fn test_copy_with_no_env_files_is_zero() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        touch(&source.path().join("src/main.rs"));

        assert_eq!(copy_env_files(source.path(), target.path()), 0);
    }
}
