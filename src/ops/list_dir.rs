use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path_utils::is_hidden_name;

use super::Engine;
use super::metadata::{self, EntryKind, FileMetadata};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDirRequest {
    #[serde(default)]
    pub path: PathBuf,
    /// Falls back to `listing.show_hidden` when unset.
    #[serde(default)]
    pub include_hidden: Option<bool>,
    /// Case-sensitive substring that entry names must contain.
    #[serde(default, alias = "filter_pattern")]
    pub filter: Option<String>,
    #[serde(default)]
    pub include_metadata: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDirEntry {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FileMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDirResponse {
    pub path: PathBuf,
    pub entries: Vec<ListDirEntry>,
    pub total_count: usize,
    pub skipped_io_errors: u64,
}

pub fn list_dir(engine: &Engine, request: ListDirRequest) -> Result<ListDirResponse> {
    let dir = engine.guard().resolve(&request.path)?;
    tracing::debug!(path = %dir.relative.display(), "list_dir");

    let meta =
        fs::metadata(&dir.absolute).map_err(|err| Error::io_path("metadata", &dir.relative, err))?;
    if !meta.is_dir() {
        return Err(Error::NotADirectory(dir.relative));
    }

    let include_hidden = request
        .include_hidden
        .unwrap_or(engine.policy().listing.show_hidden);
    let filter = request.filter.as_deref().filter(|filter| !filter.is_empty());

    let mut rows = fs::read_dir(&dir.absolute)
        .map_err(|err| Error::io_path("read_dir", &dir.relative, err))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|err| Error::io_path("read_dir", &dir.relative, err))?;
    rows.sort_by_key(|entry| entry.file_name());

    let mut entries = Vec::<ListDirEntry>::new();
    let mut skipped_io_errors: u64 = 0;
    for entry in rows {
        let file_name = entry.file_name();
        if !include_hidden && is_hidden_name(&file_name) {
            continue;
        }
        let name = file_name.to_string_lossy().into_owned();
        if let Some(filter) = filter
            && !name.contains(filter)
        {
            continue;
        }

        let entry_meta = match fs::symlink_metadata(entry.path()) {
            Ok(value) => value,
            Err(_) => {
                skipped_io_errors += 1;
                continue;
            }
        };
        let kind = EntryKind::from_file_type(entry_meta.file_type());
        let path = dir.relative_child(&file_name);

        let metadata = request.include_metadata.then(|| {
            let mut collected = metadata::collect(&entry.path(), &entry_meta, false);
            if kind == EntryKind::File {
                collected.checksum = engine.checksum_if_enabled(&entry.path(), &path);
            }
            collected
        });

        entries.push(ListDirEntry {
            name,
            path,
            kind,
            metadata,
        });
    }

    Ok(ListDirResponse {
        path: dir.relative,
        total_count: entries.len(),
        entries,
        skipped_io_errors,
    })
}
