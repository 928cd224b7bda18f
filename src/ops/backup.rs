use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path_utils::{is_within, relative_to};
use crate::policy::BackupRules;

use super::io::{TreeCopyOptions, copy_times, copy_tree};
use super::metadata::EntryKind;
use super::resolve::CanonicalPath;

static BACKUP_SEQUENCE: AtomicU64 = AtomicU64::new(0);
const MAX_NAME_ATTEMPTS: usize = 16;

/// One copy taken before a destructive operation. Paths are workspace-relative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BackupService {
    root: PathBuf,
    directory: PathBuf,
    preserve_metadata: bool,
}

impl BackupService {
    /// `root` must already be canonical.
    pub fn new(root: &Path, rules: &BackupRules) -> Self {
        Self {
            root: root.to_path_buf(),
            directory: root.join(&rules.directory),
            preserve_metadata: rules.preserve_metadata,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// True for the backup area itself and anything inside it.
    pub fn is_backup_path(&self, path: &Path) -> bool {
        is_within(path, &self.directory)
    }

    /// Copies `target` into the backup area under a fresh, collision-free name.
    pub fn backup(&self, target: &CanonicalPath) -> Result<BackupRecord> {
        let backup_err = |source| Error::Backup {
            path: target.relative.clone(),
            source,
        };
        let meta = fs::symlink_metadata(&target.absolute).map_err(backup_err)?;
        let file_name = target.absolute.file_name().ok_or_else(|| {
            backup_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "workspace root cannot be backed up",
            ))
        })?;
        fs::create_dir_all(&self.directory).map_err(backup_err)?;

        let kind = EntryKind::from_file_type(meta.file_type());
        let mut attempts = 0;
        loop {
            attempts += 1;
            let created_at = Utc::now();
            let sequence = BACKUP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
            let backup_path = self
                .directory
                .join(backup_name(file_name.to_os_string(), created_at, sequence));

            match self.copy_into(&target.absolute, &backup_path, kind, &meta) {
                Ok(()) => {
                    let record = BackupRecord {
                        original_path: target.relative.clone(),
                        backup_path: relative_to(&backup_path, &self.root),
                        created_at,
                    };
                    tracing::info!(
                        original = %record.original_path.display(),
                        backup = %record.backup_path.display(),
                        "backup created"
                    );
                    return Ok(record);
                }
                Err(err)
                    if err.kind() == std::io::ErrorKind::AlreadyExists
                        && attempts < MAX_NAME_ATTEMPTS => {}
                Err(err) => return Err(backup_err(err)),
            }
        }
    }

    // Each branch claims `backup_path` with an exclusive create before copying into it.
    fn copy_into(
        &self,
        source: &Path,
        backup_path: &Path,
        kind: EntryKind,
        meta: &fs::Metadata,
    ) -> std::io::Result<()> {
        match kind {
            EntryKind::Directory => {
                fs::create_dir(backup_path)?;
                let options = TreeCopyOptions {
                    preserve_times: self.preserve_metadata,
                    reuse_existing_root: true,
                };
                copy_tree(source, backup_path, &self.root, options)
                    .map(|_| ())
                    .map_err(into_io_error)
            }
            EntryKind::Symlink => {
                let options = TreeCopyOptions {
                    preserve_times: false,
                    reuse_existing_root: false,
                };
                copy_tree(source, backup_path, &self.root, options)
                    .map(|_| ())
                    .map_err(into_io_error)
            }
            EntryKind::Other => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "special files are not backed up",
            )),
            EntryKind::File => {
                fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(backup_path)?;
                fs::copy(source, backup_path)?;
                if self.preserve_metadata {
                    let file = fs::OpenOptions::new().write(true).open(backup_path)?;
                    copy_times(&file, meta)?;
                }
                Ok(())
            }
        }
    }
}

fn into_io_error(err: Error) -> std::io::Error {
    match err {
        Error::Io { source, .. } | Error::Backup { source, .. } => source,
        Error::AlreadyExists(_) => std::io::Error::from(std::io::ErrorKind::AlreadyExists),
        other => std::io::Error::other(other.to_string()),
    }
}

fn backup_name(file_name: OsString, created_at: DateTime<Utc>, sequence: u64) -> OsString {
    let mut name = file_name;
    name.push(format!(
        ".{}.{sequence}.bak",
        created_at.format("%Y%m%dT%H%M%S%.6fZ")
    ));
    name
}
