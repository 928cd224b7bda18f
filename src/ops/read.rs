use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::units::format_size;

use super::Engine;
use super::encoding::TextEncoding;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadRequest {
    pub path: PathBuf,
    /// Defaults to `utf-8`.
    #[serde(default)]
    pub encoding: Option<String>,
    /// Tightens, never loosens, `limits.max_file_size`.
    #[serde(default)]
    pub max_bytes: Option<u64>,
    /// Same as `max_bytes`, in megabytes. The tighter of the two wins.
    #[serde(default)]
    pub max_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub path: PathBuf,
    pub content: String,
    pub size: u64,
    pub size_formatted: String,
    pub encoding: String,
    pub lines: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

pub fn read_file(engine: &Engine, request: ReadRequest) -> Result<ReadResponse> {
    let encoding = TextEncoding::from_label(request.encoding.as_deref())?;
    let file = engine.guard().resolve(&request.path)?;
    tracing::debug!(path = %file.relative.display(), encoding = encoding.label(), "read_file");

    let meta = fs::metadata(&file.absolute)
        .map_err(|err| Error::io_path("metadata", &file.relative, err))?;
    if !meta.is_file() {
        return Err(Error::NotAFile(file.relative));
    }

    let max_bytes = [
        Some(engine.policy().limits.max_file_size),
        request.max_bytes,
        request
            .max_size
            .map(|megabytes| megabytes.saturating_mul(1024 * 1024)),
    ]
    .into_iter()
    .flatten()
    .min()
    .unwrap_or(u64::MAX);
    let bytes = super::io::read_bytes_limited(&file.absolute, &file.relative, max_bytes)?;
    let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);

    let content = encoding.decode(bytes).ok_or_else(|| Error::Decode {
        path: file.relative.clone(),
        encoding: encoding.label(),
    })?;
    let checksum = engine.checksum_if_enabled(&file.absolute, &file.relative);

    Ok(ReadResponse {
        path: file.relative,
        lines: content.lines().count(),
        content,
        size,
        size_formatted: format_size(size),
        encoding: encoding.label().to_string(),
        checksum,
    })
}
