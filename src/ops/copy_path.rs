use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path_utils::is_within;

use super::backup::BackupRecord;
use super::io::{TreeCopyOptions, copy_file_atomic, copy_tree, remove_entry};
use super::metadata::EntryKind;
use super::{Engine, default_true};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
    /// Keep access/modify times on copied files.
    #[serde(default = "default_true")]
    pub preserve_metadata: bool,
    #[serde(default)]
    pub create_parents: bool,
}

impl CopyRequest {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            overwrite: false,
            preserve_metadata: true,
            create_parents: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyResponse {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub overwritten: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupRecord>,
}

pub fn copy_path(engine: &Engine, request: CopyRequest) -> Result<CopyResponse> {
    let source = engine.guard().resolve(&request.source)?;
    let destination = engine.guard().resolve_entry(&request.destination)?;
    tracing::debug!(
        source = %source.relative.display(),
        destination = %destination.relative.display(),
        "copy"
    );

    let src_meta = fs::symlink_metadata(&source.absolute)
        .map_err(|err| Error::io_path("metadata", &source.relative, err))?;
    let kind = EntryKind::from_file_type(src_meta.file_type());
    if !matches!(kind, EntryKind::File | EntryKind::Directory) {
        return Err(Error::InvalidArgument(format!(
            "cannot copy special file {}",
            source.relative.display()
        )));
    }
    if destination.absolute == source.absolute {
        return Err(Error::InvalidArgument(
            "source and destination are the same path".to_string(),
        ));
    }
    if kind == EntryKind::Directory && is_within(&destination.absolute, &source.absolute) {
        return Err(Error::InvalidArgument(format!(
            "cannot copy directory {} into itself",
            source.relative.display()
        )));
    }
    if destination.is_root() {
        return Err(Error::AlreadyExists(destination.relative));
    }
    if is_within(&source.absolute, &destination.absolute) {
        return Err(Error::InvalidArgument(format!(
            "destination {} contains the source",
            destination.relative.display()
        )));
    }

    let existing = match fs::symlink_metadata(&destination.absolute) {
        Ok(meta) => Some(EntryKind::from_file_type(meta.file_type())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => return Err(Error::io_path("metadata", &destination.relative, err)),
    };
    let mut backup = None;
    if let Some(existing_kind) = existing {
        if !request.overwrite {
            return Err(Error::AlreadyExists(destination.relative));
        }
        backup = engine.backup_before(
            &destination,
            existing_kind,
            engine.policy().backup.on_overwrite,
        )?;
        // A file over a file is replaced by rename; anything else is cleared first.
        if !(kind == EntryKind::File && existing_kind == EntryKind::File) {
            remove_entry(&destination.absolute, &destination.relative, existing_kind)?;
        }
    } else {
        super::mkdir::ensure_parent_dir(&destination, request.create_parents)?;
    }

    let (files_copied, bytes_copied) = match kind {
        EntryKind::File => {
            let bytes = copy_file_atomic(&source, &destination, request.preserve_metadata)?;
            (1, bytes)
        }
        _ => {
            let options = TreeCopyOptions {
                preserve_times: request.preserve_metadata,
                reuse_existing_root: false,
            };
            let stats = copy_tree(
                &source.absolute,
                &destination.absolute,
                engine.root(),
                options,
            )?;
            (stats.files, stats.bytes)
        }
    };

    Ok(CopyResponse {
        source: source.relative,
        destination: destination.relative,
        kind,
        files_copied,
        bytes_copied,
        overwritten: existing.is_some(),
        backup,
    })
}
