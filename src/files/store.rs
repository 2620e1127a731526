//! File Store
//!
//! Blocking file operations over the sandboxed data root. Callers on the
//! async side run these through `spawn_blocking`.
//!
//! Writes use atomic replace with backup:
//!
//! ```text
//! content ──write──▸ name.tmp
//! name ─────copy───▸ name.bak   (best effort, only if name exists)
//! name.tmp ─rename─▸ name       (atomic on the same filesystem)
//! ```
//!
//! The temporary file is removed on every exit path, and a failed final
//! rename leaves the destination untouched.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::FileError;
use super::sandbox::{is_allowed_extension, PathSandbox};

/// Default cap for reads and writes (1 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default page size for directory listings.
pub const DEFAULT_LIST_LIMIT: usize = 100;

type RenameFn = fn(&Path, &Path) -> io::Result<()>;

/// A single listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub path: String,
    pub name: String,
    pub is_directory: bool,
    /// Byte size; always 0 for directories.
    pub size: u64,
}

/// One page of a directory listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(rename = "files")]
    pub entries: Vec<FileEntry>,
    /// Number of entries in the whole directory, not just this page.
    pub total: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Sandboxed file operations.
#[derive(Debug, Clone)]
pub struct FileStore {
    sandbox: PathSandbox,
    max_file_size: u64,
    /// Final step of `write`; swapped out in tests to simulate failures.
    commit_rename: RenameFn,
}

impl FileStore {
    pub fn new(base: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            sandbox: PathSandbox::new(base),
            max_file_size,
            commit_rename: |from, to| fs::rename(from, to),
        }
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// List a directory: subdirectories first, then editable files, each group
    /// sorted case-insensitively. Dot-prefixed entries are hidden.
    pub fn list(&self, directory: &str, offset: usize, limit: usize) -> Result<Listing, FileError> {
        let dir = self.sandbox.resolve(directory)?;
        if !dir.is_dir() {
            return Err(FileError::NotADirectory);
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            // Follows symlinks; dangling links are skipped
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            let Some(logical) = self.sandbox.logical_path(&path) else {
                continue;
            };

            if metadata.is_dir() {
                entries.push(FileEntry {
                    path: logical,
                    name,
                    is_directory: true,
                    size: 0,
                });
            } else if metadata.is_file() && is_allowed_extension(&name) {
                entries.push(FileEntry {
                    path: logical,
                    name,
                    is_directory: false,
                    size: metadata.len(),
                });
            }
        }

        entries.sort_by(|a, b| {
            b.is_directory
                .cmp(&a.is_directory)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.name.cmp(&b.name))
        });

        let total = entries.len();
        let start = offset.min(total);
        let end = offset.saturating_add(limit).min(total);
        let page: Vec<FileEntry> = entries.drain(start..end).collect();

        debug!(
            "[files] Listed {}: {} of {} entries (offset={})",
            directory,
            page.len(),
            total,
            offset
        );

        Ok(Listing {
            entries: page,
            total,
            offset,
            has_more: end < total,
        })
    }

    /// Read a whole editable file as UTF-8 text.
    pub fn read(&self, path: &str) -> Result<String, FileError> {
        let physical = self.sandbox.resolve(path)?;
        let metadata = match fs::metadata(&physical) {
            Ok(m) if m.is_file() => m,
            _ => return Err(FileError::NotAFile),
        };
        if !is_allowed_extension(&file_name(&physical)) {
            return Err(FileError::TypeNotAllowed);
        }
        if metadata.len() > self.max_file_size {
            return Err(FileError::TooLarge {
                size: metadata.len(),
                max: self.max_file_size,
            });
        }

        let bytes = fs::read(&physical)?;
        String::from_utf8(bytes)
            .map_err(|e| FileError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Replace a file's content atomically, keeping the previous version as
    /// `<name>.bak`.
    pub fn write(&self, path: &str, content: &str) -> Result<(), FileError> {
        let physical = self.sandbox.resolve(path)?;
        if !is_allowed_extension(&file_name(&physical)) {
            return Err(FileError::TypeNotAllowed);
        }
        let size = content.len() as u64;
        if size > self.max_file_size {
            return Err(FileError::TooLarge {
                size,
                max: self.max_file_size,
            });
        }

        if let Some(parent) = physical.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = sibling(&physical, ".tmp");
        let backup = sibling(&physical, ".bak");
        let result = self.replace_with_backup(&physical, &tmp, &backup, content);

        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("[files] Failed to remove temp file {}: {}", tmp.display(), e);
            }
        }

        result?;
        info!("[files] Written: {}", path);
        Ok(())
    }

    fn replace_with_backup(
        &self,
        target: &Path,
        tmp: &Path,
        backup: &Path,
        content: &str,
    ) -> Result<(), FileError> {
        let mut file = File::create(tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);

        if target.is_file() {
            if let Err(e) = fs::copy(target, backup) {
                warn!("[files] Backup of {} failed: {}", target.display(), e);
            }
        }

        (self.commit_rename)(tmp, target)?;
        Ok(())
    }

    /// Create an empty file or a directory (with missing parents).
    pub fn create(&self, path: &str, is_directory: bool) -> Result<(), FileError> {
        let physical = self.sandbox.resolve(path)?;
        if fs::symlink_metadata(&physical).is_ok() {
            return Err(FileError::AlreadyExists);
        }

        if is_directory {
            fs::create_dir_all(&physical)?;
        } else {
            if let Some(parent) = physical.parent() {
                fs::create_dir_all(parent)?;
            }
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&physical)
                .map_err(|e| match e.kind() {
                    io::ErrorKind::AlreadyExists => FileError::AlreadyExists,
                    _ => FileError::Io(e),
                })?;
        }

        info!(
            "[files] Created: {}{}",
            path,
            if is_directory { " (directory)" } else { "" }
        );
        Ok(())
    }

    /// Delete a file, or a directory with everything below it.
    pub fn delete(&self, path: &str) -> Result<(), FileError> {
        let physical = self.sandbox.resolve(path)?;
        if physical == self.sandbox.base() {
            return Err(FileError::AccessDenied);
        }
        let metadata = fs::symlink_metadata(&physical).map_err(not_found)?;

        if metadata.is_dir() {
            remove_tree(&physical)?;
        } else {
            fs::remove_file(&physical)?;
        }

        info!("[files] Deleted: {}", path);
        Ok(())
    }

    /// Move a file or directory; both endpoints are sandboxed.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<(), FileError> {
        let from = self.sandbox.resolve(old_path)?;
        let to = self.sandbox.resolve(new_path)?;
        if from == self.sandbox.base() || to == self.sandbox.base() {
            return Err(FileError::AccessDenied);
        }

        fs::symlink_metadata(&from).map_err(not_found)?;
        if fs::symlink_metadata(&to).is_ok() {
            return Err(FileError::AlreadyExists);
        }

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&from, &to)?;

        info!("[files] Renamed: {} -> {}", old_path, new_path);
        Ok(())
    }

    #[cfg(test)]
    fn with_commit_rename(mut self, rename: RenameFn) -> Self {
        self.commit_rename = rename;
        self
    }
}

/// Remove a directory tree bottom-up, stopping at the first failure.
fn remove_tree(root: &Path) -> Result<(), FileError> {
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn not_found(e: io::Error) -> FileError {
    match e.kind() {
        io::ErrorKind::NotFound => FileError::NotFound,
        _ => FileError::Io(e),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    path.with_file_name(format!("{}{}", file_name(path), suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path(), DEFAULT_MAX_FILE_SIZE);
        (dir, store)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, store) = store();
        let content = "settings:\n  motd: \"héllo wörld\"\n  max: 20\n";

        store.write("plugins/Foo/config.yml", content).unwrap();
        assert_eq!(store.read("plugins/Foo/config.yml").unwrap(), content);
    }

    #[test]
    fn test_write_keeps_backup_and_no_temp() {
        let (dir, store) = store();
        store.write("plugins/Foo/config.yml", "version: 1\n").unwrap();
        store.write("plugins/Foo/config.yml", "version: 2\n").unwrap();

        let foo = dir.path().join("Foo");
        assert_eq!(fs::read_to_string(foo.join("config.yml")).unwrap(), "version: 2\n");
        assert_eq!(fs::read_to_string(foo.join("config.yml.bak")).unwrap(), "version: 1\n");
        assert!(!foo.join("config.yml.tmp").exists());
    }

    #[test]
    fn test_failed_commit_leaves_original() {
        let (dir, store) = store();
        store.write("plugins/Foo/config.yml", "original: true\n").unwrap();

        let failing = store.with_commit_rename(|_, _| Err(io::Error::other("disk on fire")));
        let err = failing
            .write("plugins/Foo/config.yml", "replacement: true\n")
            .unwrap_err();
        assert!(matches!(err, FileError::Io(_)));

        let foo = dir.path().join("Foo");
        assert_eq!(
            fs::read_to_string(foo.join("config.yml")).unwrap(),
            "original: true\n"
        );
        assert!(!foo.join("config.yml.tmp").exists());
    }

    #[test]
    fn test_type_and_size_limits() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path(), 16);

        assert!(matches!(
            store.write("plugins/Foo/plugin.jar", "x"),
            Err(FileError::TypeNotAllowed)
        ));
        assert!(matches!(
            store.write("plugins/big.yml", &"x".repeat(17)),
            Err(FileError::TooLarge { size: 17, max: 16 })
        ));

        fs::write(dir.path().join("big.json"), "y".repeat(32)).unwrap();
        assert!(matches!(
            store.read("plugins/big.json"),
            Err(FileError::TooLarge { .. })
        ));

        fs::write(dir.path().join("server.properties"), "a=b").unwrap();
        assert!(matches!(
            store.read("plugins/server.properties"),
            Err(FileError::TypeNotAllowed)
        ));
        assert!(matches!(store.read("plugins/missing.yml"), Err(FileError::NotAFile)));
        assert!(matches!(store.read("plugins"), Err(FileError::NotAFile)));
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let (dir, store) = store();
        let root = dir.path();
        fs::create_dir(root.join("zeta")).unwrap();
        fs::create_dir(root.join("Alpha")).unwrap();
        fs::create_dir(root.join(".hidden")).unwrap();
        fs::write(root.join("b.yml"), "b: 1").unwrap();
        fs::write(root.join("A.json"), "{}").unwrap();
        fs::write(root.join("plugin.jar"), "bin").unwrap();
        fs::write(root.join(".secret.yml"), "s: 1").unwrap();

        let listing = store.list("plugins/", 0, 100).unwrap();
        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zeta", "A.json", "b.yml"]);
        assert_eq!(listing.total, 4);
        assert!(!listing.has_more);

        let alpha = &listing.entries[0];
        assert_eq!(alpha.path, "plugins/Alpha");
        assert!(alpha.is_directory);
        assert_eq!(alpha.size, 0);
        assert_eq!(listing.entries[3].size, 4);
    }

    #[test]
    fn test_list_pages_cover_everything_once() {
        let (dir, store) = store();
        for i in 0..23 {
            fs::write(dir.path().join(format!("file{:02}.yml", i)), "k: v").unwrap();
        }
        for i in 0..4 {
            fs::create_dir(dir.path().join(format!("dir{}", i))).unwrap();
        }

        let full = store.list("plugins", 0, 1000).unwrap();
        let mut collected = Vec::new();
        let mut offset = 0;
        loop {
            let page = store.list("plugins", offset, 5).unwrap();
            assert_eq!(page.total, 27);
            offset += page.entries.len();
            let last = !page.has_more;
            collected.extend(page.entries);
            if last {
                break;
            }
        }

        assert_eq!(collected, full.entries);
        assert_eq!(offset, 27);

        let past_end = store.list("plugins", 40, 5).unwrap();
        assert!(past_end.entries.is_empty());
        assert!(!past_end.has_more);
    }

    #[test]
    fn test_list_requires_directory() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.yml"), "a: 1").unwrap();
        assert!(matches!(store.list("plugins/a.yml", 0, 10), Err(FileError::NotADirectory)));
        assert!(matches!(store.list("plugins/none", 0, 10), Err(FileError::NotADirectory)));
    }

    #[test]
    fn test_create_file_and_directory() {
        let (dir, store) = store();
        store.create("plugins/New/sub/empty.yml", false).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("New/sub/empty.yml")).unwrap(), "");

        store.create("plugins/Other/deep", true).unwrap();
        assert!(dir.path().join("Other/deep").is_dir());

        assert!(matches!(
            store.create("plugins/New/sub/empty.yml", false),
            Err(FileError::AlreadyExists)
        ));
        assert!(matches!(store.create("plugins/Other", true), Err(FileError::AlreadyExists)));
    }

    #[test]
    fn test_delete_recursive() {
        let (dir, store) = store();
        store.write("plugins/Foo/a.yml", "a: 1").unwrap();
        store.write("plugins/Foo/nested/b.json", "{}").unwrap();
        fs::write(dir.path().join("Foo/nested/c.dat"), "raw").unwrap();

        store.delete("plugins/Foo").unwrap();
        assert!(!dir.path().join("Foo").exists());

        assert!(matches!(store.delete("plugins/Foo"), Err(FileError::NotFound)));
        assert!(matches!(store.delete("plugins"), Err(FileError::AccessDenied)));
    }

    #[test]
    fn test_rename() {
        let (dir, store) = store();
        store.write("plugins/Foo/config.yml", "a: 1").unwrap();
        store.write("plugins/Bar/config.yml", "b: 2").unwrap();

        assert!(matches!(
            store.rename("plugins/Foo/missing.yml", "plugins/x.yml"),
            Err(FileError::NotFound)
        ));
        assert!(matches!(
            store.rename("plugins/Foo/config.yml", "plugins/Bar/config.yml"),
            Err(FileError::AlreadyExists)
        ));

        store
            .rename("plugins/Foo/config.yml", "plugins/Archive/2024/config.yml")
            .unwrap();
        assert!(!dir.path().join("Foo/config.yml").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("Archive/2024/config.yml")).unwrap(),
            "a: 1"
        );
    }

    #[test]
    fn test_rename_both_ends_sandboxed() {
        let (_dir, store) = store();
        store.write("plugins/Foo/config.yml", "a: 1").unwrap();
        assert!(matches!(
            store.rename("plugins/Foo/config.yml", "world/config.yml"),
            Err(FileError::AccessDenied)
        ));
        assert!(matches!(
            store.rename("plugins/../x.yml", "plugins/y.yml"),
            Err(FileError::InvalidPath)
        ));
    }
}
