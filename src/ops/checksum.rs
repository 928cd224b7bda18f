use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const BLOCK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Md5,
}

impl ChecksumAlgorithm {
    pub const ALL: [Self; 2] = [Self::Sha256, Self::Md5];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Some(Self::Sha256),
            "md5" => Some(Self::Md5),
            _ => None,
        }
    }
}

/// Degraded outcome: callers log it and omit the checksum field.
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("checksum unavailable: not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("checksum unavailable for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Hex digest of a regular file's contents, streamed in fixed-size blocks.
pub fn digest(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String, ChecksumError> {
    let io_err = |source| ChecksumError::Io {
        path: path.to_path_buf(),
        source,
    };
    let meta = fs::metadata(path).map_err(io_err)?;
    if !meta.is_file() {
        return Err(ChecksumError::NotAFile(path.to_path_buf()));
    }
    let mut file = super::io::open_readonly_nofollow(path).map_err(io_err)?;

    match algorithm {
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            stream_blocks(&mut file, |block| hasher.update(block)).map_err(io_err)?;
            Ok(format!("{:x}", hasher.finalize()))
        }
        ChecksumAlgorithm::Md5 => {
            let mut context = md5::Context::new();
            stream_blocks(&mut file, |block| context.consume(block)).map_err(io_err)?;
            Ok(format!("{:x}", context.compute()))
        }
    }
}

fn stream_blocks(file: &mut fs::File, mut sink: impl FnMut(&[u8])) -> std::io::Result<()> {
    let mut buffer = [0u8; BLOCK_SIZE];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        sink(&buffer[..read]);
    }
}

/// Runs `digest`, logging and swallowing failures.
pub(super) fn digest_or_warn(
    path: &Path,
    relative: &Path,
    algorithm: ChecksumAlgorithm,
) -> Option<String> {
    match digest(path, algorithm) {
        Ok(hex) => Some(hex),
        Err(err) => {
            tracing::warn!(
                path = %relative.display(),
                algorithm = algorithm.as_str(),
                error = %err,
                "checksum unavailable"
            );
            None
        }
    }
}
