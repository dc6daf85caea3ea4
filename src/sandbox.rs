//! Workspace path confinement.
//!
//! [`Sandbox::resolve`] is the single authorization gate: every operation that
//! touches the filesystem or spawns a process first turns its user-supplied
//! relative path into an absolute one here. The containment check runs on the
//! canonical path (symlinks and `..` already resolved), so neither traversal
//! segments nor links pointing out of the tree can escape.
//!
//! Paths that do not exist yet are resolved as far as the filesystem allows;
//! the missing tail is applied lexically. Callers decide whether absence is
//! an error.

use std::path::{Component, Path, PathBuf};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Canonicalizes `root` once. The root must be an existing directory.
    pub fn new(root: &Path) -> CoreResult<Self> {
        let root = root
            .canonicalize()
            .map_err(|e| CoreError::io(root, e))?;
        if !root.is_dir() {
            return Err(CoreError::NotFound(format!(
                "workspace root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path to an absolute path inside the root.
    ///
    /// An empty (or whitespace-only) input resolves to the root itself.
    pub fn resolve(&self, relative: &str) -> CoreResult<PathBuf> {
        if relative.trim().is_empty() {
            return Ok(self.root.clone());
        }

        let candidate = self.root.join(relative);
        let resolved = canonicalize_lenient(&candidate);

        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            tracing::warn!(path = relative, "rejected path outside workspace");
            Err(CoreError::SandboxViolation(relative.to_string()))
        }
    }

    /// Resolve and require the target to exist.
    pub fn resolve_existing(&self, relative: &str) -> CoreResult<PathBuf> {
        let path = self.resolve(relative)?;
        if path.exists() {
            Ok(path)
        } else {
            Err(CoreError::NotFound(relative.to_string()))
        }
    }

    /// Render an absolute path inside the root as a `/`-separated relative
    /// path. The root itself renders as `"."`.
    pub fn relative(&self, absolute: &Path) -> String {
        relative_to(&self.root, absolute)
    }
}

/// `/`-separated path of `absolute` relative to `root`; `"."` for the root.
pub(crate) fn relative_to(root: &Path, absolute: &Path) -> String {
    let rel = absolute.strip_prefix(root).unwrap_or(absolute);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Canonicalize component by component. A component that cannot be resolved
/// on disk is appended lexically, and every later component is retried on
/// disk, so a `..` that climbs out of a missing tail lands back on a canonical
/// prefix and any symlink after it is still followed.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                resolved.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                let next = resolved.join(name);
                resolved = next.canonicalize().unwrap_or(next);
            }
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Sandbox) {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path().join("ws");
        fs::create_dir_all(ws.join("src/pkg")).unwrap();
        fs::write(ws.join("src/pkg/mod.py"), "import os\n").unwrap();
        fs::write(tmp.path().join("secret.txt"), "top secret").unwrap();
        let sandbox = Sandbox::new(&ws).unwrap();
        (tmp, sandbox)
    }

    #[test]
    fn test_empty_resolves_to_root() {
        let (_tmp, sandbox) = setup();
        assert_eq!(sandbox.resolve("").unwrap(), sandbox.root());
        assert_eq!(sandbox.resolve("  ").unwrap(), sandbox.root());
    }

    #[test]
    fn test_inside_paths_resolve() {
        let (_tmp, sandbox) = setup();
        let p = sandbox.resolve("src/pkg/mod.py").unwrap();
        assert!(p.starts_with(sandbox.root()));
        assert!(p.is_file());

        let p = sandbox.resolve("src/../src/./pkg").unwrap();
        assert_eq!(p, sandbox.root().join("src/pkg"));
    }

    #[test]
    fn test_parent_traversal_denied() {
        let (_tmp, sandbox) = setup();
        for bad in ["..", "../secret.txt", "src/../../secret.txt", "src/pkg/../../../x"] {
            let err = sandbox.resolve(bad).unwrap_err();
            assert!(
                matches!(err, CoreError::SandboxViolation(_)),
                "{} should be denied",
                bad
            );
        }
    }

    #[test]
    fn test_absolute_path_outside_denied() {
        let (tmp, sandbox) = setup();
        let outside = tmp.path().join("secret.txt");
        let err = sandbox.resolve(outside.to_str().unwrap()).unwrap_err();
        assert_eq!(err.code(), "access_denied");
    }

    #[test]
    fn test_sibling_with_shared_prefix_denied() {
        let (tmp, sandbox) = setup();
        fs::create_dir_all(tmp.path().join("ws2")).unwrap();
        assert!(sandbox.resolve("../ws2").is_err());
    }

    #[test]
    fn test_missing_path_inside_is_allowed_but_not_existing() {
        let (_tmp, sandbox) = setup();
        let p = sandbox.resolve("new/dir/../file.py").unwrap();
        assert_eq!(p, sandbox.root().join("new/file.py"));

        let err = sandbox.resolve_existing("nope.py").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_missing_path_traversing_out_denied() {
        let (_tmp, sandbox) = setup();
        assert!(sandbox.resolve("ghost/../../secret.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_denied() {
        let (tmp, sandbox) = setup();
        std::os::unix::fs::symlink(tmp.path(), sandbox.root().join("escape")).unwrap();
        let err = sandbox.resolve("escape/secret.txt").unwrap_err();
        assert!(matches!(err, CoreError::SandboxViolation(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_after_missing_segment_denied() {
        let (tmp, sandbox) = setup();
        std::os::unix::fs::symlink(tmp.path(), sandbox.root().join("escape")).unwrap();
        for bad in [
            "ghost/../escape/secret.txt",
            "ghost/deeper/../../escape/secret.txt",
            "src/ghost/../../escape",
        ] {
            let err = sandbox.resolve(bad).unwrap_err();
            assert!(
                matches!(err, CoreError::SandboxViolation(_)),
                "{} should be denied",
                bad
            );
        }
    }

    #[test]
    fn test_missing_segment_then_real_path() {
        let (_tmp, sandbox) = setup();
        let p = sandbox.resolve("ghost/../src/pkg/mod.py").unwrap();
        assert_eq!(p, sandbox.root().join("src/pkg/mod.py"));
        assert!(p.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_allowed() {
        let (_tmp, sandbox) = setup();
        std::os::unix::fs::symlink(sandbox.root().join("src"), sandbox.root().join("alias"))
            .unwrap();
        let p = sandbox.resolve("alias/pkg/mod.py").unwrap();
        assert_eq!(p, sandbox.root().join("src/pkg/mod.py"));
    }

    #[test]
    fn test_relative_rendering() {
        let (_tmp, sandbox) = setup();
        let abs = sandbox.root().join("src/pkg/mod.py");
        assert_eq!(sandbox.relative(&abs), "src/pkg/mod.py");
        assert_eq!(sandbox.relative(sandbox.root()), ".");
    }
}
