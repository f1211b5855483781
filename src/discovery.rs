//! Input discovery
//!
//! Recursively enumerates the documents under the input root. The result is
//! sorted so chunk indices stay stable across runs over an unchanged tree.

use crate::error::ConfigError;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Collect every regular file under `root` whose extension is `extension`
///
/// Paths matching any of `excludes` are dropped. An entry the walk cannot
/// read fails discovery, since a partial listing would shift chunk indices.
pub fn discover_inputs(
    root: &Path,
    extension: &str,
    excludes: &[Regex],
) -> Result<Vec<PathBuf>, ConfigError> {
    if !root.is_dir() {
        return Err(ConfigError::MissingInputRoot {
            path: root.to_path_buf(),
        });
    }

    let extension = extension.trim_start_matches('.');
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                warn!(path = %path.display(), error = %e, "Discovery failed");
                return Err(ConfigError::Discovery {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }

        let shown = path.to_string_lossy();
        if excludes.iter().any(|re| re.is_match(&shown)) {
            debug!(path = %shown, "Excluded");
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_recursive_match_sorted() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("b/nested/z.txt"), "z").unwrap();
        fs::write(root.join("a/y.txt"), "y").unwrap();
        fs::write(root.join("top.txt"), "t").unwrap();
        fs::write(root.join("a/skip.json"), "{}").unwrap();

        let files = discover_inputs(root, "txt", &[]).unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert_eq!(rel, vec!["a/y.txt", "b/nested/z.txt", "top.txt"]);
    }

    #[test]
    fn test_exclude_patterns() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".snapshot")).unwrap();
        fs::write(dir.path().join(".snapshot/old.txt"), "x").unwrap();
        fs::write(dir.path().join("keep.txt"), "x").unwrap();

        let excludes = vec![Regex::new(r"\.snapshot").unwrap()];
        let files = discover_inputs(dir.path(), ".txt", &excludes).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.txt"));
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let err = discover_inputs(&dir.path().join("nope"), "txt", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingInputRoot { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_fails() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("hidden.txt"), "x").unwrap();
        fs::write(dir.path().join("open.txt"), "x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind a privileged user
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = discover_inputs(dir.path(), "txt", &[]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        match result {
            Err(ConfigError::Discovery { path, .. }) => assert!(path.ends_with("locked")),
            other => panic!("expected discovery error, got {other:?}"),
        }
    }
}
