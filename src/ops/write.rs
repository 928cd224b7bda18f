use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::backup::BackupRecord;
use super::encoding::TextEncoding;
use super::metadata::EntryKind;
use super::{Engine, default_true};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFileRequest {
    pub path: PathBuf,
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default = "default_true")]
    pub overwrite: bool,
    #[serde(default = "default_true")]
    pub create_parents: bool,
}

impl WriteFileRequest {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            encoding: None,
            overwrite: true,
            create_parents: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFileResponse {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

pub fn write_file(engine: &Engine, request: WriteFileRequest) -> Result<WriteFileResponse> {
    let encoding = TextEncoding::from_label(request.encoding.as_deref())?;
    let target = engine.guard().resolve(&request.path)?;
    tracing::debug!(path = %target.relative.display(), "write_file");
    if target.is_root() {
        return Err(Error::NotAFile(target.relative));
    }

    let bytes = encoding
        .encode(&request.content)
        .ok_or_else(|| Error::Encode {
            path: target.relative.clone(),
            encoding: encoding.label(),
        })?;
    let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    let max_bytes = engine.policy().limits.max_file_size;
    if size > max_bytes {
        return Err(Error::TooLarge {
            path: target.relative,
            size_bytes: size,
            max_bytes,
        });
    }

    let existing = match fs::metadata(&target.absolute) {
        Ok(meta) => Some(meta),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => return Err(Error::io_path("metadata", &target.relative, err)),
    };
    if let Some(meta) = &existing {
        if !meta.is_file() {
            return Err(Error::NotAFile(target.relative));
        }
        if !request.overwrite {
            return Err(Error::AlreadyExists(target.relative));
        }
    } else {
        super::mkdir::ensure_parent_dir(&target, request.create_parents)?;
    }

    let backup = match &existing {
        Some(_) => engine.backup_before(
            &target,
            EntryKind::File,
            engine.policy().backup.on_overwrite,
        )?,
        None => None,
    };

    super::io::write_bytes_atomic(
        &target.absolute,
        &target.relative,
        &bytes,
        existing.as_ref().map(fs::Metadata::permissions),
    )?;
    let checksum = engine.checksum_if_enabled(&target.absolute, &target.relative);

    Ok(WriteFileResponse {
        path: target.relative,
        bytes_written: size,
        created: existing.is_none(),
        backup,
        checksum,
    })
}
