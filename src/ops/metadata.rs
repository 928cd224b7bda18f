use std::fs;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::units::format_size;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl EntryKind {
    pub fn from_file_type(file_type: fs::FileType) -> Self {
        if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Other => "other",
        }
    }
}

impl PartialEq<&str> for EntryKind {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// What the current process may do with the path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessFlags {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMetadata {
    pub size: u64,
    pub size_formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed: Option<DateTime<Utc>>,
    /// Octal permission bits, e.g. `"644"`. Unix only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub readonly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<AccessFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

fn timestamp(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

/// Snapshot of `meta`; `path` is only consulted for the access probe.
pub(super) fn collect(path: &Path, meta: &fs::Metadata, include_permissions: bool) -> FileMetadata {
    FileMetadata {
        size: meta.len(),
        size_formatted: format_size(meta.len()),
        modified: timestamp(meta.modified()),
        created: timestamp(meta.created()),
        accessed: timestamp(meta.accessed()),
        mode: include_permissions.then(|| mode_string(meta)).flatten(),
        readonly: meta.permissions().readonly(),
        permissions: include_permissions.then(|| access_flags(path, meta)),
        checksum: None,
    }
}

#[cfg(unix)]
fn mode_string(meta: &fs::Metadata) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;
    Some(format!("{:o}", meta.permissions().mode() & 0o7777))
}

#[cfg(not(unix))]
fn mode_string(_meta: &fs::Metadata) -> Option<String> {
    None
}

#[cfg(unix)]
fn access_flags(path: &Path, _meta: &fs::Metadata) -> AccessFlags {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return AccessFlags {
            readable: false,
            writable: false,
            executable: false,
        };
    };
    // Safety: `c_path` is NUL-terminated and outlives each call.
    let check = |mode| unsafe { libc::access(c_path.as_ptr(), mode) == 0 };
    AccessFlags {
        readable: check(libc::R_OK),
        writable: check(libc::W_OK),
        executable: check(libc::X_OK),
    }
}

#[cfg(not(unix))]
fn access_flags(_path: &Path, meta: &fs::Metadata) -> AccessFlags {
    AccessFlags {
        readable: true,
        writable: !meta.permissions().readonly(),
        executable: meta.is_dir(),
    }
}
