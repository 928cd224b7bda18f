//! Path helpers shared by the path guard, backups and search.
//!
//! `canonicalize_lenient` is the only function here that touches the filesystem. It extends
//! `Path::canonicalize` to paths whose tail does not exist yet:
//! - the nearest existing ancestor is canonicalized (symlinks and `..` resolved by the OS),
//! - dangling symlinks met while walking up are followed (bounded hops), so a link to a
//!   not-yet-created file is judged by where it points,
//! - the missing tail is re-applied lexically on top of the symlink-free prefix.
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug)]
enum TailSegment {
    Parent,
    Normal(OsString),
}

pub(crate) fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut pending = path.to_path_buf();
    let mut tail = Vec::<TailSegment>::new();
    let mut hops = 0usize;

    loop {
        let err = match pending.canonicalize() {
            Ok(base) => return Ok(apply_tail(base, &tail)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => err,
            Err(err) => return Err(err),
        };

        if let Ok(meta) = fs::symlink_metadata(&pending)
            && meta.file_type().is_symlink()
        {
            hops += 1;
            if hops > MAX_SYMLINK_HOPS {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "too many levels of symbolic links",
                ));
            }
            let target = fs::read_link(&pending)?;
            pending = match pending.parent() {
                Some(parent) if target.is_relative() => parent.join(target),
                _ => target,
            };
            continue;
        }

        let Some(last) = pending.components().next_back() else {
            return Err(err);
        };
        match last {
            Component::Normal(name) => tail.push(TailSegment::Normal(name.to_os_string())),
            Component::ParentDir => tail.push(TailSegment::Parent),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return Err(err),
        }
        pending = match pending.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => return Err(err),
        };
    }
}

fn apply_tail(mut base: PathBuf, tail: &[TailSegment]) -> PathBuf {
    for segment in tail.iter().rev() {
        match segment {
            TailSegment::Parent => {
                base.pop();
            }
            TailSegment::Normal(name) => base.push(name),
        }
    }
    base
}

/// Component-wise containment: `candidate` is `root` or lies beneath it.
pub(crate) fn is_within(candidate: &Path, root: &Path) -> bool {
    candidate.starts_with(root)
}

/// Root-relative form of `path`, `.` for the root itself.
pub(crate) fn relative_to(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(relative) if relative.as_os_str().is_empty() => PathBuf::from("."),
        Ok(relative) => relative.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}

pub(crate) fn is_hidden_name(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
