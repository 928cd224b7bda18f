use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::path_utils::relative_to;

use super::metadata::EntryKind;
use super::resolve::CanonicalPath;

const TEMP_PREFIX: &str = ".fs-relay.";

#[cfg(unix)]
pub(super) fn open_readonly_nofollow(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = fs::OpenOptions::new();
    options
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK);
    options.open(path)
}

#[cfg(not(unix))]
pub(super) fn open_readonly_nofollow(path: &Path) -> std::io::Result<fs::File> {
    fs::File::open(path)
}

pub(super) fn open_regular_file_for_read(
    path: &Path,
    relative: &Path,
) -> Result<(fs::File, fs::Metadata)> {
    let file = open_readonly_nofollow(path).map_err(|err| Error::io_path("open", relative, err))?;
    let meta = file
        .metadata()
        .map_err(|err| Error::io_path("metadata", relative, err))?;
    if !meta.is_file() {
        return Err(Error::NotAFile(relative.to_path_buf()));
    }
    Ok((file, meta))
}

fn file_too_large(relative: &Path, size_bytes: u64, max_bytes: u64) -> Error {
    Error::TooLarge {
        path: relative.to_path_buf(),
        size_bytes,
        max_bytes,
    }
}

/// Reads a regular file, failing with `TooLarge` if it exceeds `max_bytes` either by its
/// reported size or by what was actually read.
pub(super) fn read_bytes_limited(path: &Path, relative: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let (file, meta) = open_regular_file_for_read(path, relative)?;
    if meta.len() > max_bytes {
        return Err(file_too_large(relative, meta.len(), max_bytes));
    }

    let limit = max_bytes.saturating_add(1);
    let mut bytes = Vec::<u8>::new();
    file.take(limit)
        .read_to_end(&mut bytes)
        .map_err(|err| Error::io_path("read", relative, err))?;
    let read_size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    if read_size > max_bytes {
        return Err(file_too_large(relative, read_size, max_bytes));
    }
    Ok(bytes)
}

fn temp_in_parent(path: &Path, relative: &Path) -> Result<tempfile::NamedTempFile> {
    let parent = path.parent().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "invalid path {}: missing parent directory",
            relative.display()
        ))
    })?;
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|err| Error::io_path("create_temp", relative, err))
}

/// Writes `bytes` to a temp file beside `path` and renames it over `path`, so readers see
/// either the old content or the new content.
pub(super) fn write_bytes_atomic(
    path: &Path,
    relative: &Path,
    bytes: &[u8],
    permissions: Option<fs::Permissions>,
) -> Result<()> {
    let mut tmp_file = temp_in_parent(path, relative)?;
    tmp_file
        .as_file_mut()
        .write_all(bytes)
        .map_err(|err| Error::io_path("write", relative, err))?;
    tmp_file
        .as_file_mut()
        .sync_all()
        .map_err(|err| Error::io_path("sync", relative, err))?;
    apply_new_file_permissions(tmp_file.path(), relative, permissions)?;
    tmp_file
        .persist(path)
        .map_err(|err| Error::io_path("replace_file", relative, err.error))?;
    Ok(())
}

// tempfile creates 0600 files; a brand-new file gets the umask-derived mode instead.
fn apply_new_file_permissions(
    tmp_path: &Path,
    relative: &Path,
    permissions: Option<fs::Permissions>,
) -> Result<()> {
    let Some(permissions) = permissions.or_else(default_file_permissions) else {
        return Ok(());
    };
    fs::set_permissions(tmp_path, permissions)
        .map_err(|err| Error::io_path("set_permissions", relative, err))
}

#[cfg(unix)]
fn default_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;

    // Safety: umask cannot fail; the previous mask is restored immediately.
    let mask = unsafe {
        let mask = libc::umask(0o022);
        libc::umask(mask);
        mask
    };
    Some(fs::Permissions::from_mode(0o666 & !u32::from(mask)))
}

#[cfg(not(unix))]
fn default_file_permissions() -> Option<fs::Permissions> {
    None
}

pub(super) fn copy_times(file: &fs::File, meta: &fs::Metadata) -> std::io::Result<()> {
    let mut times = fs::FileTimes::new();
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    file.set_times(times)
}

/// Copies a regular file through a temp file in the destination's directory, replacing any
/// existing destination file in one rename. Returns the number of bytes copied.
pub(super) fn copy_file_atomic(
    source: &CanonicalPath,
    destination: &CanonicalPath,
    preserve_times: bool,
) -> Result<u64> {
    let (mut src_file, src_meta) = open_regular_file_for_read(&source.absolute, &source.relative)?;
    let dest_relative = &destination.relative;
    let mut tmp_file = temp_in_parent(&destination.absolute, dest_relative)?;

    let bytes = std::io::copy(&mut src_file, tmp_file.as_file_mut()).map_err(|err| {
        Error::io_path("copy", &source.relative, err)
    })?;
    fs::set_permissions(tmp_file.path(), src_meta.permissions())
        .map_err(|err| Error::io_path("set_permissions", dest_relative, err))?;
    if preserve_times {
        copy_times(tmp_file.as_file(), &src_meta)
            .map_err(|err| Error::io_path("set_times", dest_relative, err))?;
    }
    tmp_file
        .as_file_mut()
        .sync_all()
        .map_err(|err| Error::io_path("sync", dest_relative, err))?;
    tmp_file
        .persist(&destination.absolute)
        .map_err(|err| Error::io_path("replace_file", dest_relative, err.error))?;
    Ok(bytes)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct TreeCopyStats {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct TreeCopyOptions {
    pub preserve_times: bool,
    /// Accept an already-existing (empty) destination directory for the top entry.
    pub reuse_existing_root: bool,
}

/// Recursive copy of `source` (file, directory or symlink) to `destination`. Symlinks are
/// recreated, never followed. `root` only shapes paths in error messages.
pub(super) fn copy_tree(
    source: &Path,
    destination: &Path,
    root: &Path,
    options: TreeCopyOptions,
) -> Result<TreeCopyStats> {
    let mut stats = TreeCopyStats::default();
    // Directory modes are applied last so read-only directories can still be filled.
    let mut deferred_dirs = Vec::<(std::path::PathBuf, fs::Permissions)>::new();

    let walker = WalkDir::new(source)
        .follow_links(false)
        .follow_root_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|err| walk_error(err, root))?;
        let target = match entry.path().strip_prefix(source) {
            Ok(inner) if inner.as_os_str().is_empty() => destination.to_path_buf(),
            Ok(inner) => destination.join(inner),
            Err(_) => continue,
        };
        let shown = relative_to(&target, root);
        let meta = entry
            .metadata()
            .map_err(|err| walk_error(err, root))?;

        match EntryKind::from_file_type(entry.file_type()) {
            EntryKind::Directory => {
                match fs::create_dir(&target) {
                    Ok(()) => {}
                    Err(err)
                        if entry.depth() == 0
                            && options.reuse_existing_root
                            && err.kind() == std::io::ErrorKind::AlreadyExists => {}
                    Err(err) => return Err(Error::io_path("create_dir", &shown, err)),
                }
                deferred_dirs.push((target, meta.permissions()));
                stats.directories += 1;
            }
            EntryKind::Symlink => {
                let link = fs::read_link(entry.path()).map_err(|err| {
                    Error::io_path("read_link", relative_to(entry.path(), root), err)
                })?;
                create_symlink(&link, &target)
                    .map_err(|err| Error::io_path("symlink", &shown, err))?;
                stats.symlinks += 1;
            }
            EntryKind::File => {
                let copied = fs::copy(entry.path(), &target)
                    .map_err(|err| Error::io_path("copy", &shown, err))?;
                if options.preserve_times {
                    let file = fs::OpenOptions::new()
                        .write(true)
                        .open(&target)
                        .and_then(|file| copy_times(&file, &meta).map(|()| file));
                    if let Err(err) = file {
                        tracing::debug!(path = %shown.display(), error = %err, "could not preserve file times");
                    }
                }
                stats.files += 1;
                stats.bytes = stats.bytes.saturating_add(copied);
            }
            EntryKind::Other => {
                tracing::debug!(path = %shown.display(), "skipping special file during copy");
            }
        }
    }

    for (dir, permissions) in deferred_dirs.into_iter().rev() {
        fs::set_permissions(&dir, permissions)
            .map_err(|err| Error::io_path("set_permissions", relative_to(&dir, root), err))?;
    }
    Ok(stats)
}

fn walk_error(err: walkdir::Error, root: &Path) -> Error {
    let path = err
        .path()
        .map(|path| relative_to(path, root))
        .unwrap_or_default();
    match err.into_io_error() {
        Some(source) => Error::io_path("walk", path, source),
        None => Error::Io {
            op: "walk",
            path,
            source: std::io::Error::other("filesystem loop detected"),
        },
    }
}

#[cfg(unix)]
fn create_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(windows)]
fn create_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    let resolved = match target.parent() {
        Some(parent) if link.is_relative() => parent.join(link),
        _ => link.to_path_buf(),
    };
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(link, target)
    } else {
        std::os::windows::fs::symlink_file(link, target)
    }
}

#[cfg(all(not(unix), not(windows)))]
fn create_symlink(_link: &Path, _target: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are unsupported on this platform",
    ))
}

fn unlink_symlink(target: &Path) -> std::io::Result<()> {
    #[cfg(windows)]
    {
        match fs::remove_file(target) {
            Ok(()) => Ok(()),
            // Directory symlinks and junctions need remove_dir on Windows.
            Err(remove_file_err) => match fs::remove_dir(target) {
                Ok(()) => Ok(()),
                Err(_) => Err(remove_file_err),
            },
        }
    }

    #[cfg(not(windows))]
    {
        fs::remove_file(target)
    }
}

/// Removes a single entry of a known kind. Directories are removed with their contents.
pub(super) fn remove_entry(path: &Path, relative: &Path, kind: EntryKind) -> Result<()> {
    let (op, result) = match kind {
        EntryKind::Directory => ("remove_dir_all", fs::remove_dir_all(path)),
        EntryKind::Symlink => ("unlink_symlink", unlink_symlink(path)),
        EntryKind::File | EntryKind::Other => ("remove_file", fs::remove_file(path)),
    };
    result.map_err(|err| Error::io_path(op, relative, err))
}
