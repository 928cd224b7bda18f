use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::path_utils::{canonicalize_lenient, is_within, relative_to};

/// A path proven to lie inside the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPath {
    /// Absolute, symlink-free form used for filesystem calls.
    pub absolute: PathBuf,
    /// Root-relative form used in responses and error messages (`.` for the root).
    pub relative: PathBuf,
}

impl CanonicalPath {
    pub fn is_root(&self) -> bool {
        self.relative == Path::new(".")
    }

    /// Root-relative path of a direct child, without a leading `./`.
    pub fn relative_child(&self, name: impl AsRef<Path>) -> PathBuf {
        if self.is_root() {
            name.as_ref().to_path_buf()
        } else {
            self.relative.join(name)
        }
    }
}

/// Containment check against a single canonical root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|err| {
            Error::InvalidConfig(format!(
                "failed to canonicalize root {}: {err}",
                root.display()
            ))
        })?;
        let meta = fs::metadata(&canonical).map_err(|err| {
            Error::InvalidConfig(format!(
                "failed to stat root {}: {err}",
                canonical.display()
            ))
        })?;
        if !meta.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "root {} is not a directory",
                canonical.display()
            )));
        }
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `raw` following every symlink, including the last component.
    pub fn resolve(&self, raw: impl AsRef<Path>) -> Result<CanonicalPath> {
        let raw = raw.as_ref();
        let joined = self.join_raw(raw)?;
        let canonical = canonicalize_lenient(&joined).map_err(|err| resolve_error(raw, err))?;
        self.contain(raw, canonical)
    }

    /// Resolves the parent of `raw` but keeps its final component as-is, so a symlink
    /// leaf names the link itself.
    pub fn resolve_entry(&self, raw: impl AsRef<Path>) -> Result<CanonicalPath> {
        let raw = raw.as_ref();
        let joined = self.join_raw(raw)?;
        let (Some(Component::Normal(name)), Some(parent)) =
            (joined.components().next_back(), joined.parent())
        else {
            return self.resolve(raw);
        };
        let canonical_parent =
            canonicalize_lenient(parent).map_err(|err| resolve_error(raw, err))?;
        self.contain(raw, canonical_parent.join(name))
    }

    fn join_raw(&self, raw: &Path) -> Result<PathBuf> {
        if raw.as_os_str().as_encoded_bytes().contains(&0) {
            return Err(Error::InvalidArgument(format!(
                "path contains a NUL byte: {}",
                raw.display()
            )));
        }
        if raw.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }
        if raw.is_absolute() {
            Ok(raw.to_path_buf())
        } else {
            Ok(self.root.join(raw))
        }
    }

    fn contain(&self, raw: &Path, candidate: PathBuf) -> Result<CanonicalPath> {
        if !is_within(&candidate, &self.root) {
            tracing::debug!(path = %raw.display(), "path escapes workspace root");
            return Err(Error::PathViolation(raw.to_path_buf()));
        }
        let relative = relative_to(&candidate, &self.root);
        Ok(CanonicalPath {
            absolute: candidate,
            relative,
        })
    }
}

fn resolve_error(raw: &Path, err: std::io::Error) -> Error {
    match err.kind() {
        // Symlink loops cannot be proven to stay inside the root.
        std::io::ErrorKind::InvalidInput => Error::PathViolation(raw.to_path_buf()),
        _ => Error::io_path("resolve", raw, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> (tempfile::TempDir, PathGuard) {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = PathGuard::new(dir.path()).expect("guard");
        (dir, guard)
    }

    #[test]
    fn relative_and_absolute_inputs_resolve_to_the_same_path() {
        let (_dir, guard) = guard();
        std::fs::write(guard.root().join("a.txt"), "x").expect("write");

        let relative = guard.resolve("a.txt").expect("relative");
        let absolute = guard.resolve(guard.root().join("a.txt")).expect("absolute");
        assert_eq!(relative, absolute);
        assert_eq!(relative.relative, PathBuf::from("a.txt"));
    }

    #[test]
    fn empty_and_dot_resolve_to_root() {
        let (_dir, guard) = guard();
        assert!(guard.resolve("").expect("empty").is_root());
        assert!(guard.resolve(".").expect("dot").is_root());
        assert!(guard.resolve_entry(".").expect("dot entry").is_root());
    }

    #[test]
    fn dot_dot_escape_is_a_violation() {
        let (_dir, guard) = guard();
        match guard.resolve("../outside.txt") {
            Err(Error::PathViolation(path)) => {
                assert_eq!(path, PathBuf::from("../outside.txt"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match guard.resolve("missing/../../x") {
            Err(Error::PathViolation(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn dot_dot_that_stays_inside_is_allowed() {
        let (_dir, guard) = guard();
        std::fs::create_dir(guard.root().join("sub")).expect("mkdir");
        let resolved = guard.resolve("sub/../new.txt").expect("resolve");
        assert_eq!(resolved.relative, PathBuf::from("new.txt"));
    }

    #[test]
    fn nul_bytes_are_invalid_arguments() {
        let (_dir, guard) = guard();
        match guard.resolve("a\0b") {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn resolve_entry_keeps_symlink_leaf() {
        let (_dir, guard) = guard();
        let outside = tempfile::tempdir().expect("outside");
        std::os::unix::fs::symlink(outside.path(), guard.root().join("escape"))
            .expect("symlink");

        match guard.resolve("escape") {
            Err(Error::PathViolation(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        let entry = guard.resolve_entry("escape").expect("entry");
        assert_eq!(entry.absolute, guard.root().join("escape"));
    }

    #[test]
    #[cfg(unix)]
    fn symlink_loop_is_a_violation() {
        let (_dir, guard) = guard();
        std::os::unix::fs::symlink("b", guard.root().join("a")).expect("symlink a");
        std::os::unix::fs::symlink("a", guard.root().join("b")).expect("symlink b");
        assert!(guard.resolve("a").is_err());
    }
}
