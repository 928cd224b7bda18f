use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path_utils::is_within;

use super::Engine;
use super::backup::BackupRecord;
use super::io::{TreeCopyOptions, copy_tree, remove_entry};
use super::metadata::EntryKind;
use super::resolve::CanonicalPath;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub create_parents: bool,
}

impl MoveRequest {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            overwrite: false,
            create_parents: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveMethod {
    Rename,
    /// Source and destination were on different filesystems.
    CopyThenDelete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveResponse {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub method: MoveMethod,
    pub overwritten: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupRecord>,
}

pub fn move_path(engine: &Engine, request: MoveRequest) -> Result<MoveResponse> {
    let source = engine.guard().resolve_entry(&request.source)?;
    let destination = engine.guard().resolve_entry(&request.destination)?;
    tracing::debug!(
        source = %source.relative.display(),
        destination = %destination.relative.display(),
        "move"
    );
    if source.is_root() {
        return Err(Error::InvalidArgument(
            "refusing to move the workspace root".to_string(),
        ));
    }

    let src_meta = fs::symlink_metadata(&source.absolute)
        .map_err(|err| Error::io_path("metadata", &source.relative, err))?;
    let kind = EntryKind::from_file_type(src_meta.file_type());

    if destination.absolute == source.absolute {
        return Err(Error::InvalidArgument(
            "source and destination are the same path".to_string(),
        ));
    }
    if kind == EntryKind::Directory && is_within(&destination.absolute, &source.absolute) {
        return Err(Error::InvalidArgument(format!(
            "cannot move directory {} into itself",
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
        remove_entry(&destination.absolute, &destination.relative, existing_kind)?;
    } else {
        super::mkdir::ensure_parent_dir(&destination, request.create_parents)?;
    }

    let method = rename_or_copy(engine, &source, &destination, kind)?;
    tracing::debug!(method = ?method, "move finished");

    Ok(MoveResponse {
        source: source.relative,
        destination: destination.relative,
        kind,
        method,
        overwritten: existing.is_some(),
        backup,
    })
}

fn rename_or_copy(
    engine: &Engine,
    source: &CanonicalPath,
    destination: &CanonicalPath,
    kind: EntryKind,
) -> Result<MoveMethod> {
    match fs::rename(&source.absolute, &destination.absolute) {
        Ok(()) => Ok(MoveMethod::Rename),
        Err(err) if err.kind() == std::io::ErrorKind::CrossesDevices => {
            let options = TreeCopyOptions {
                preserve_times: true,
                reuse_existing_root: false,
            };
            copy_tree(
                &source.absolute,
                &destination.absolute,
                engine.root(),
                options,
            )?;
            remove_entry(&source.absolute, &source.relative, kind)?;
            Ok(MoveMethod::CopyThenDelete)
        }
        Err(err) => Err(Error::io_path("rename", &source.relative, err)),
    }
}
