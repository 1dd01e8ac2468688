//! Tree scanning: walk a root and fingerprint every regular file

use std::path::PathBuf;

use color_eyre::Result;
use color_eyre::eyre::{WrapErr as _, eyre};
use ignore::WalkBuilder;
use tracing::debug;

use crate::hash::ContentHash;
use crate::snapshot::{FileFingerprint, Snapshot, resolve_relative, to_slash_path};

/// Scanner for a file root
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    excluded: Vec<PathBuf>,
}

impl Scanner {
    /// Create a new scanner for the given root directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: Vec::new(),
        }
    }

    /// Leave `dir` and everything below it out of full scans
    #[must_use]
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    /// Walk builder that sees everything, depth-first, names sorted per directory
    fn walk_builder(&self) -> WalkBuilder {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(false) // No ignore files, include hidden
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b));
        if !self.excluded.is_empty() {
            let excluded = self.excluded.clone();
            builder.filter_entry(move |entry| {
                !excluded.iter().any(|dir| entry.path().starts_with(dir))
            });
        }
        builder
    }

    /// Scan the whole root and return its snapshot
    ///
    /// # Errors
    /// Returns an error if traversal or hashing of any file fails; no partial
    /// snapshot is produced.
    pub fn scan(&self) -> Result<Snapshot> {
        let mut files = Vec::new();

        for result in self.walk_builder().build() {
            let entry = result?;
            let path = entry.path();

            // Skip directories, only process files
            if !path.is_file() {
                continue;
            }

            let relative = path.strip_prefix(&self.root)?;
            let relative = to_slash_path(relative)
                .ok_or_else(|| eyre!("unsupported path {}", path.display()))?;

            let (hash, size) = ContentHash::from_file(path)
                .wrap_err_with(|| format!("failed to hash {}", path.display()))?;

            files.push(FileFingerprint {
                hash,
                path: relative,
                size,
            });
        }

        Ok(Snapshot::from_files(files))
    }

    /// Fingerprint the files named by an authoritative listing, in its order
    ///
    /// Files that cannot be resolved or hashed are left out of the result.
    #[must_use]
    pub fn scan_listed(&self, listed: &[FileFingerprint]) -> Snapshot {
        let files = listed
            .iter()
            .filter_map(|remote| match self.fingerprint(&remote.path) {
                Ok(local) => Some(local),
                Err(e) => {
                    debug!("Skipping {}: {e}", remote.path);
                    None
                }
            })
            .collect();

        Snapshot::from_files(files)
    }

    /// Fingerprint a single file by its `/`-separated relative path
    ///
    /// # Errors
    /// Returns an error if the path escapes the root or cannot be hashed
    pub fn fingerprint(&self, relative: &str) -> Result<FileFingerprint> {
        let path = resolve_relative(&self.root, relative)
            .ok_or_else(|| eyre!("path {relative:?} escapes the scan root"))?;
        let (hash, size) = ContentHash::from_file(&path)?;

        Ok(FileFingerprint {
            hash,
            path: relative.to_string(),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_simple_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("file1.txt"), "hello").unwrap();
        fs::write(dir.path().join("file2.txt"), "world").unwrap();

        let snapshot = Scanner::new(dir.path()).scan().unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.total_size, 10);
        assert!(snapshot.files.iter().any(|f| f.path == "file1.txt"));
        assert!(snapshot.files.iter().any(|f| f.path == "file2.txt"));
    }

    #[test]
    fn test_scan_nested_directories_in_lexical_order() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub/dir")).unwrap();
        fs::write(dir.path().join("root.txt"), "root").unwrap();
        fs::write(dir.path().join("sub/nested.txt"), "nested").unwrap();
        fs::write(dir.path().join("sub/dir/deep.txt"), "deep").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let snapshot = Scanner::new(dir.path()).scan().unwrap();
        let paths: Vec<_> = snapshot.files.iter().map(|f| f.path.as_str()).collect();

        assert_eq!(
            paths,
            vec!["a.txt", "root.txt", "sub/dir/deep.txt", "sub/nested.txt"]
        );
    }

    #[test]
    fn test_scan_includes_hidden_and_ignored_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        fs::write(dir.path().join("game.log"), "log").unwrap();
        fs::write(dir.path().join(".hidden"), "h").unwrap();

        let snapshot = Scanner::new(dir.path()).scan().unwrap();
        let paths: Vec<_> = snapshot.files.iter().map(|f| f.path.clone()).collect();

        assert!(paths.contains(&"game.log".to_string()), "paths: {paths:?}");
        assert!(paths.contains(&".hidden".to_string()), "paths: {paths:?}");
        assert!(paths.contains(&".gitignore".to_string()), "paths: {paths:?}");
    }

    #[test]
    fn test_rescan_is_deterministic() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("x/y")).unwrap();
        fs::write(dir.path().join("x/y/z.bin"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join("x/w.txt"), "w").unwrap();

        let scanner = Scanner::new(dir.path());
        let first = scanner.scan().unwrap();
        let second = scanner.scan().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let result = Scanner::new(dir.path().join("missing")).scan();
        assert!(result.is_err());
    }

    #[test]
    fn test_excluded_directory_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".meta/nested")).unwrap();
        fs::write(dir.path().join(".meta/meta.json"), "{}").unwrap();
        fs::write(dir.path().join(".meta/nested/x"), "x").unwrap();
        fs::write(dir.path().join(".metadata"), "kept").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let snapshot = Scanner::new(dir.path())
            .exclude(dir.path().join(".meta"))
            .scan()
            .unwrap();
        let paths: Vec<_> = snapshot.files.iter().map(|f| f.path.as_str()).collect();

        assert_eq!(paths, vec![".metadata", "a.txt"]);
        assert_eq!(snapshot.total_size, 5);
    }

    #[test]
    fn test_scan_listed_skips_missing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("present.txt"), "here").unwrap();

        let listed = vec![
            FileFingerprint {
                hash: ContentHash::from_bytes(b"whatever"),
                path: "missing.txt".into(),
                size: 8,
            },
            FileFingerprint {
                hash: ContentHash::from_bytes(b"stale"),
                path: "present.txt".into(),
                size: 5,
            },
            FileFingerprint {
                hash: ContentHash::from_bytes(b"x"),
                path: "../outside.txt".into(),
                size: 1,
            },
        ];

        let snapshot = Scanner::new(dir.path()).scan_listed(&listed);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.files[0].path, "present.txt");
        assert_eq!(snapshot.files[0].hash, ContentHash::from_bytes(b"here"));
        assert_eq!(snapshot.total_size, 4);
    }

    #[test]
    fn test_scan_listed_matches_full_scan_when_in_sync() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("sub/b.txt"), "bb").unwrap();

        let scanner = Scanner::new(dir.path());
        let full = scanner.scan().unwrap();
        let listed = scanner.scan_listed(&full.files);
        assert_eq!(full.summary(), listed.summary());
    }
}
