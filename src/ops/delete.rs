use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::Engine;
use super::backup::BackupRecord;
use super::metadata::EntryKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub path: PathBuf,
    #[serde(default)]
    pub recursive: bool,
    /// Nothing is touched until the caller confirms.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmationRequired {
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    Deleted(DeleteResponse),
    ConfirmationRequired(ConfirmationRequired),
}

pub fn delete(engine: &Engine, request: DeleteRequest) -> Result<DeleteOutcome> {
    let target = engine.guard().resolve_entry(&request.path)?;
    tracing::debug!(
        path = %target.relative.display(),
        recursive = request.recursive,
        confirm = request.confirm,
        "delete"
    );
    if target.is_root() {
        return Err(Error::InvalidArgument(
            "refusing to delete the workspace root".to_string(),
        ));
    }

    let meta = fs::symlink_metadata(&target.absolute)
        .map_err(|err| Error::io_path("metadata", &target.relative, err))?;
    let kind = EntryKind::from_file_type(meta.file_type());

    if !request.confirm {
        let message = format!(
            "Are you sure you want to delete this {}? Call again with confirm=true.",
            kind.as_str()
        );
        return Ok(DeleteOutcome::ConfirmationRequired(ConfirmationRequired {
            path: target.relative,
            kind,
            message,
        }));
    }

    if kind == EntryKind::Directory && !request.recursive {
        let mut children = fs::read_dir(&target.absolute)
            .map_err(|err| Error::io_path("read_dir", &target.relative, err))?;
        if children.next().is_some() {
            return Err(Error::NotEmpty(target.relative));
        }
    }

    let backup = engine.backup_before(&target, kind, engine.policy().backup.on_delete)?;
    super::io::remove_entry(&target.absolute, &target.relative, kind)?;

    Ok(DeleteOutcome::Deleted(DeleteResponse {
        path: target.relative,
        kind,
        deleted: true,
        backup,
    }))
}
