//! Path Sandbox
//!
//! Maps the server's logical paths (`plugins/Foo/config.yml`) onto the
//! physical data root. Validation happens in two passes:
//!
//! 1. String checks on the normalized logical path (no `..` segment, not
//!    absolute, must live under the published `plugins` alias).
//! 2. A filesystem check: the canonical form of the joined path must still
//!    descend from the canonical data root. This catches symlinks that point
//!    outside the root, which the string pass cannot see.
//!
//! Nothing is cached; every call re-validates.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::error::FileError;

/// Logical alias under which the data root is published to the server.
pub const PUBLISHED_ROOT: &str = "plugins";

/// Extensions that may be read or written.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".yml", ".yaml", ".json"];

/// Validates logical paths against a fixed physical root.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    base: PathBuf,
}

impl PathSandbox {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Physical data root.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a logical path to the physical path it names.
    ///
    /// The target does not need to exist (writes and creates resolve paths
    /// that are about to be made).
    pub fn resolve(&self, logical: &str) -> Result<PathBuf, FileError> {
        let normalized = logical.replace('\\', "/");

        if normalized.starts_with('/')
            || Path::new(&normalized).is_absolute()
            || normalized.split('/').any(|segment| segment == "..")
        {
            return Err(FileError::InvalidPath);
        }

        let relative = if normalized == PUBLISHED_ROOT {
            ""
        } else if let Some(rest) = normalized.strip_prefix("plugins/") {
            rest
        } else {
            return Err(FileError::AccessDenied);
        };

        let candidate = if relative.is_empty() {
            self.base.clone()
        } else {
            self.base.join(relative)
        };

        let canonical_base =
            canonicalize_lenient(&self.base).map_err(|_| FileError::TraversalDetected)?;
        let canonical =
            canonicalize_lenient(&candidate).map_err(|_| FileError::TraversalDetected)?;
        if !canonical.starts_with(&canonical_base) {
            return Err(FileError::TraversalDetected);
        }

        Ok(candidate)
    }

    /// Logical path (`plugins/<rel>`, forward slashes) for a physical path
    /// below the root. Returns `None` for paths outside it.
    pub fn logical_path(&self, physical: &Path) -> Option<String> {
        let relative = physical.strip_prefix(&self.base).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            Some(PUBLISHED_ROOT.to_string())
        } else {
            Some(format!("{}/{}", PUBLISHED_ROOT, parts.join("/")))
        }
    }
}

/// Whether a file name carries one of the editable extensions.
pub fn is_allowed_extension(name: &str) -> bool {
    let lower = name.to_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Canonicalize a path whose tail may not exist yet: the deepest existing
/// ancestor is canonicalized and the missing components are appended.
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                for part in missing.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let name = match existing.file_name() {
                    Some(name) => name.to_owned(),
                    None => return Err(e),
                };
                missing.push(name);
                existing = match existing.parent() {
                    Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
                    Some(parent) => parent.to_path_buf(),
                    None => return Err(e),
                };
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, PathSandbox) {
        let dir = TempDir::new().unwrap();
        let sandbox = PathSandbox::new(dir.path());
        (dir, sandbox)
    }

    #[test]
    fn test_parent_segments_rejected() {
        let (_dir, sb) = sandbox();
        for path in [
            "plugins/../secret.yml",
            "plugins/Foo/../../etc/passwd",
            "..",
            "plugins\\..\\server.properties",
        ] {
            assert!(
                matches!(sb.resolve(path), Err(FileError::InvalidPath)),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_absolute_paths_rejected() {
        let (_dir, sb) = sandbox();
        assert!(matches!(sb.resolve("/etc/passwd"), Err(FileError::InvalidPath)));
        assert!(matches!(
            sb.resolve("\\plugins\\a.yml"),
            Err(FileError::InvalidPath)
        ));
    }

    #[test]
    fn test_prefix_required() {
        let (_dir, sb) = sandbox();
        assert!(matches!(sb.resolve("world/level.dat"), Err(FileError::AccessDenied)));
        assert!(matches!(sb.resolve("pluginsX/a.yml"), Err(FileError::AccessDenied)));
        assert!(matches!(sb.resolve(""), Err(FileError::AccessDenied)));
    }

    #[test]
    fn test_resolves_inside_root() {
        let (dir, sb) = sandbox();
        assert_eq!(sb.resolve("plugins").unwrap(), dir.path());
        assert_eq!(sb.resolve("plugins/").unwrap(), dir.path());
        assert_eq!(
            sb.resolve("plugins\\Foo\\config.yml").unwrap(),
            dir.path().join("Foo/config.yml")
        );
        // Missing targets still resolve
        assert_eq!(
            sb.resolve("plugins/New/Deep/file.json").unwrap(),
            dir.path().join("New/Deep/file.json")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_detected() {
        let (dir, sb) = sandbox();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();

        assert!(matches!(
            sb.resolve("plugins/escape/config.yml"),
            Err(FileError::TraversalDetected)
        ));
    }

    #[test]
    fn test_logical_path() {
        let (dir, sb) = sandbox();
        assert_eq!(
            sb.logical_path(&dir.path().join("Foo").join("config.yml")).as_deref(),
            Some("plugins/Foo/config.yml")
        );
        assert_eq!(sb.logical_path(dir.path()).as_deref(), Some("plugins"));
        assert_eq!(sb.logical_path(Path::new("/elsewhere")), None);
    }

    #[test]
    fn test_extension_allow_list() {
        assert!(is_allowed_extension("config.yml"));
        assert!(is_allowed_extension("CONFIG.YAML"));
        assert!(is_allowed_extension("data.json"));
        assert!(!is_allowed_extension("plugin.jar"));
        assert!(!is_allowed_extension("config.yml.bak"));
    }
}
