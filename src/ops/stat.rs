use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::checksum::{ChecksumAlgorithm, digest_or_warn};
use super::metadata::{self, EntryKind, FileMetadata};
use super::{Engine, default_true};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatRequest {
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub include_permissions: bool,
    /// Adds every supported digest for regular files, regardless of `checksums.enabled`.
    #[serde(default)]
    pub include_checksums: bool,
}

impl StatRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            include_permissions: true,
            include_checksums: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatResponse {
    pub path: PathBuf,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(flatten)]
    pub metadata: FileMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksums: Option<BTreeMap<String, String>>,
}

pub fn stat(engine: &Engine, request: StatRequest) -> Result<StatResponse> {
    let target = engine.guard().resolve(&request.path)?;
    tracing::debug!(path = %target.relative.display(), "stat");

    let meta = fs::metadata(&target.absolute)
        .map_err(|err| Error::io_path("metadata", &target.relative, err))?;
    let kind = EntryKind::from_file_type(meta.file_type());
    let metadata = metadata::collect(&target.absolute, &meta, request.include_permissions);

    let checksums = (request.include_checksums && kind == EntryKind::File).then(|| {
        ChecksumAlgorithm::ALL
            .into_iter()
            .filter_map(|algorithm| {
                digest_or_warn(&target.absolute, &target.relative, algorithm)
                    .map(|hex| (algorithm.as_str().to_string(), hex))
            })
            .collect::<BTreeMap<_, _>>()
    });

    let name = target
        .absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(StatResponse {
        path: target.relative,
        name,
        kind,
        metadata,
        checksums,
    })
}
