//! Source file descriptors and change detection.
//!
//! A [`FileDescriptor`] captures what the cache knows about one file: its
//! location (root-relative when possible), its last-modified time, and,
//! when checksums are enabled, its content hash. Comparing the descriptors of
//! the current build against the recorded ones yields a [`ChangeSet`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ffwd_common::ContentHash;
use filetime::FileTime;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Recorded facts about a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// `/`-separated path relative to the build root when `portable`,
    /// otherwise the absolute path.
    pub path: String,
    /// Whether `path` is relative to the build root.
    pub portable: bool,
    /// Last modification time in milliseconds since the Unix epoch.
    pub last_modified: i64,
    /// Content hash, present when checksums are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ContentHash>,
}

impl FileDescriptor {
    /// Resolves the descriptor's location against the build root.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        if self.portable {
            root.join(&self.path)
        } else {
            PathBuf::from(&self.path)
        }
    }

    /// Returns `true` if `current` describes the same file state.
    ///
    /// With checksums, only the content hash is compared; otherwise only the
    /// modification time.
    pub fn is_current(&self, current: &FileDescriptor, checksums: bool) -> bool {
        if checksums {
            self.checksum.is_some() && self.checksum == current.checksum
        } else {
            self.last_modified == current.last_modified
        }
    }
}

/// Result of comparing current file descriptors against recorded ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Files that were not recorded.
    pub new_files: Vec<String>,
    /// Files whose checksum or timestamp differs from the record.
    pub modified_files: Vec<String>,
    /// Files that were recorded but are gone from the current set.
    pub deleted_files: Vec<String>,
    /// Files that match their record.
    pub unchanged_files: Vec<String>,
}

impl ChangeSet {
    /// Returns `true` if there are no changes (no new, modified, or deleted files).
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.modified_files.is_empty() && self.deleted_files.is_empty()
    }

    /// Returns the total number of files that need reprocessing (new + modified).
    pub fn dirty_count(&self) -> usize {
        self.new_files.len() + self.modified_files.len()
    }
}

/// Compiled file exclude globs, matched against module-relative paths.
#[derive(Debug, Clone, Default)]
pub struct FileExcludes {
    patterns: Vec<glob::Pattern>,
}

impl FileExcludes {
    /// Compiles the given globs.
    pub fn new(patterns: &[String]) -> Result<Self, CacheError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| CacheError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Returns `true` if `file` is excluded. Files under `base_dir` are matched
    /// by their `/`-separated path relative to it, others by their full path.
    pub fn is_excluded(&self, base_dir: &Path, file: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let candidate = match file.strip_prefix(base_dir) {
            Ok(rel) => slash_path(rel),
            Err(_) => slash_path(file),
        };
        self.patterns.iter().any(|p| p.matches(&candidate))
    }
}

/// Utility for describing files and detecting changes.
#[derive(Debug, Clone)]
pub struct SourceHasher {
    root: PathBuf,
    checksums: bool,
}

impl SourceHasher {
    /// Creates a hasher for files under the build `root`.
    pub fn new(root: &Path, checksums: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            checksums,
        }
    }

    /// Whether descriptors carry content hashes.
    pub fn checksums(&self) -> bool {
        self.checksums
    }

    /// Computes the content hash of a single file.
    pub fn hash_file(path: &Path) -> Result<ContentHash, CacheError> {
        let content = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
        Ok(ContentHash::from_bytes(&content))
    }

    /// Builds the descriptor of one file as it is now.
    pub fn describe(&self, file: &Path) -> Result<FileDescriptor, CacheError> {
        let metadata = std::fs::metadata(file).map_err(|e| CacheError::io(file, e))?;
        let mtime = FileTime::from_last_modification_time(&metadata);
        let checksum = if self.checksums {
            Some(Self::hash_file(file)?)
        } else {
            None
        };
        let (path, portable) = self.portable_path(file);
        Ok(FileDescriptor {
            path,
            portable,
            last_modified: mtime_millis(mtime),
            checksum,
        })
    }

    /// Describes every readable, non-excluded file, sorted by path.
    ///
    /// Files that cannot be read are skipped; a recorded file that has
    /// disappeared therefore shows up as deleted in the change set.
    pub fn describe_all(
        &self,
        files: &[PathBuf],
        base_dir: &Path,
        excludes: &FileExcludes,
    ) -> Vec<FileDescriptor> {
        let mut by_path = BTreeMap::new();
        for file in files {
            if excludes.is_excluded(base_dir, file) {
                continue;
            }
            match self.describe(file) {
                Ok(descriptor) => {
                    by_path.insert(descriptor.path.clone(), descriptor);
                }
                Err(e) => tracing::debug!("skipping {}: {e}", file.display()),
            }
        }
        by_path.into_values().collect()
    }

    /// Splits `file` into the recorded path string and its portability flag.
    pub fn portable_path(&self, file: &Path) -> (String, bool) {
        match file.strip_prefix(&self.root) {
            Ok(rel) => (slash_path(rel), true),
            Err(_) => (slash_path(file), false),
        }
    }

    /// Compares current descriptors against recorded ones.
    ///
    /// Recorded descriptors that match an exclude are ignored, so adding an
    /// exclude never dirties a module by itself.
    pub fn detect_changes(
        &self,
        current: &[FileDescriptor],
        recorded: &[FileDescriptor],
        base_dir: &Path,
        excludes: &FileExcludes,
    ) -> ChangeSet {
        let recorded: BTreeMap<&str, &FileDescriptor> = recorded
            .iter()
            .filter(|d| !excludes.is_excluded(base_dir, &d.resolve(&self.root)))
            .map(|d| (d.path.as_str(), d))
            .collect();
        let current: BTreeMap<&str, &FileDescriptor> =
            current.iter().map(|d| (d.path.as_str(), d)).collect();

        let mut changes = ChangeSet::default();
        for (path, now) in &current {
            match recorded.get(path) {
                Some(before) if before.is_current(now, self.checksums) => {
                    changes.unchanged_files.push(path.to_string());
                }
                Some(_) => changes.modified_files.push(path.to_string()),
                None => changes.new_files.push(path.to_string()),
            }
        }
        changes.deleted_files = recorded
            .keys()
            .filter(|p| !current.contains_key(*p))
            .map(|p| p.to_string())
            .collect();
        changes
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn mtime_millis(time: FileTime) -> i64 {
    time.unix_seconds() * 1000 + i64::from(time.nanoseconds() / 1_000_000)
}

/// Inverse of [`mtime_millis`].
pub(crate) fn millis_to_filetime(millis: i64) -> FileTime {
    let seconds = millis.div_euclid(1000);
    let nanos = (millis.rem_euclid(1000) * 1_000_000) as u32;
    FileTime::from_unix_time(seconds, nanos)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn hash_file_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "A.java", "class A {}");
        let h1 = SourceHasher::hash_file(&path).unwrap();
        let h2 = SourceHasher::hash_file(&path).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_file_nonexistent_errors() {
        assert!(SourceHasher::hash_file(Path::new("/nonexistent/A.java")).is_err());
    }

    #[test]
    fn describe_under_root_is_portable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "core/src/main/A.java", "class A {}");
        let hasher = SourceHasher::new(dir.path(), true);
        let d = hasher.describe(&path).unwrap();
        assert!(d.portable);
        assert_eq!(d.path, "core/src/main/A.java");
        assert_eq!(d.checksum, Some(ContentHash::from_bytes(b"class A {}")));
        assert_eq!(d.resolve(dir.path()), path);
    }

    #[test]
    fn describe_outside_root_is_not_portable() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let path = write(other.path(), "lib.jar", "jar");
        let hasher = SourceHasher::new(root.path(), false);
        let d = hasher.describe(&path).unwrap();
        assert!(!d.portable);
        assert!(d.checksum.is_none());
        assert_eq!(d.resolve(root.path()), path);
    }

    #[test]
    fn describe_all_sorts_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let b = write(dir.path(), "m/b.txt", "b");
        let a = write(dir.path(), "m/a.txt", "a");
        let missing = dir.path().join("m/gone.txt");
        let hasher = SourceHasher::new(dir.path(), true);
        let ds = hasher.describe_all(
            &[b, missing, a],
            &dir.path().join("m"),
            &FileExcludes::default(),
        );
        let paths: Vec<&str> = ds.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["m/a.txt", "m/b.txt"]);
    }

    #[test]
    fn excludes_match_module_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("core");
        let keep = write(&base, "src/A.java", "a");
        let drop = write(&base, "src/generated/G.java", "g");
        let excludes = FileExcludes::new(&["src/generated/**".to_string()]).unwrap();
        assert!(!excludes.is_excluded(&base, &keep));
        assert!(excludes.is_excluded(&base, &drop));

        let hasher = SourceHasher::new(dir.path(), true);
        let ds = hasher.describe_all(&[keep, drop], &base, &excludes);
        assert_eq!(ds.len(), 1);
        assert_eq!(ds[0].path, "core/src/A.java");
    }

    #[test]
    fn invalid_exclude_pattern_errors() {
        let err = FileExcludes::new(&["src/[".to_string()]).unwrap_err();
        assert!(matches!(err, CacheError::InvalidPattern { .. }));
    }

    #[test]
    fn detect_changes_categorizes_files() {
        let dir = tempfile::tempdir().unwrap();
        let same = write(dir.path(), "same.txt", "same");
        let changed = write(dir.path(), "changed.txt", "v1");
        let gone = write(dir.path(), "gone.txt", "gone");
        let hasher = SourceHasher::new(dir.path(), true);
        let none = FileExcludes::default();
        let recorded = hasher.describe_all(&[same.clone(), changed.clone(), gone], dir.path(), &none);

        std::fs::write(&changed, "v2").unwrap();
        let added = write(dir.path(), "added.txt", "new");
        let current = hasher.describe_all(&[same, changed, added], dir.path(), &none);

        let cs = hasher.detect_changes(&current, &recorded, dir.path(), &none);
        assert_eq!(cs.unchanged_files, vec!["same.txt"]);
        assert_eq!(cs.modified_files, vec!["changed.txt"]);
        assert_eq!(cs.new_files, vec!["added.txt"]);
        assert_eq!(cs.deleted_files, vec!["gone.txt"]);
        assert_eq!(cs.dirty_count(), 2);
        assert!(!cs.is_empty());
    }

    #[test]
    fn detect_changes_unchanged_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "a");
        let hasher = SourceHasher::new(dir.path(), true);
        let none = FileExcludes::default();
        let recorded = hasher.describe_all(&[a.clone()], dir.path(), &none);
        let current = hasher.describe_all(&[a], dir.path(), &none);
        assert!(hasher.detect_changes(&current, &recorded, dir.path(), &none).is_empty());
    }

    #[test]
    fn timestamp_mode_ignores_content_with_same_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "one");
        let pinned = FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_mtime(&a, pinned).unwrap();

        let hasher = SourceHasher::new(dir.path(), false);
        let none = FileExcludes::default();
        let recorded = hasher.describe_all(&[a.clone()], dir.path(), &none);

        std::fs::write(&a, "two").unwrap();
        filetime::set_file_mtime(&a, pinned).unwrap();
        let current = hasher.describe_all(&[a.clone()], dir.path(), &none);
        assert!(hasher.detect_changes(&current, &recorded, dir.path(), &none).is_empty());

        filetime::set_file_mtime(&a, FileTime::from_unix_time(1_700_000_100, 0)).unwrap();
        let current = hasher.describe_all(&[a], dir.path(), &none);
        let cs = hasher.detect_changes(&current, &recorded, dir.path(), &none);
        assert_eq!(cs.modified_files, vec!["a.txt"]);
    }

    #[test]
    fn checksum_mode_ignores_touch() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "one");
        let hasher = SourceHasher::new(dir.path(), true);
        let none = FileExcludes::default();
        let recorded = hasher.describe_all(&[a.clone()], dir.path(), &none);
        filetime::set_file_mtime(&a, FileTime::from_unix_time(1_800_000_000, 0)).unwrap();
        let current = hasher.describe_all(&[a], dir.path(), &none);
        assert!(hasher.detect_changes(&current, &recorded, dir.path(), &none).is_empty());
    }

    #[test]
    fn recorded_files_matching_new_excludes_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "a");
        let tmp = write(dir.path(), "scratch.tmp", "t");
        let hasher = SourceHasher::new(dir.path(), true);
        let recorded =
            hasher.describe_all(&[a.clone(), tmp.clone()], dir.path(), &FileExcludes::default());

        let excludes = FileExcludes::new(&["*.tmp".to_string()]).unwrap();
        let current = hasher.describe_all(&[a, tmp], dir.path(), &excludes);
        assert!(hasher
            .detect_changes(&current, &recorded, dir.path(), &excludes)
            .is_empty());
    }

    #[test]
    fn millis_roundtrip() {
        let t = FileTime::from_unix_time(1_700_000_000, 123_000_000);
        let ms = mtime_millis(t);
        assert_eq!(ms, 1_700_000_000_123);
        assert_eq!(millis_to_filetime(ms), t);
    }
}
