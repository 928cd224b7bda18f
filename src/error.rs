use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::format_size;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("access denied: path outside workspace: {0}")]
    PathViolation(PathBuf),

    #[error("{op} failed: not found: {path}")]
    NotFound { op: &'static str, path: PathBuf },

    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("path is not a file: {0}")]
    NotAFile(PathBuf),

    #[error("directory is not empty (set recursive=true to delete it): {0}")]
    NotEmpty(PathBuf),

    #[error(
        "file too large: {} exceeds limit of {}: {}",
        format_size(*size_bytes),
        format_size(*max_bytes),
        path.display()
    )]
    TooLarge {
        path: PathBuf,
        size_bytes: u64,
        max_bytes: u64,
    },

    #[error("file is not valid {encoding} text: {path}")]
    Decode {
        path: PathBuf,
        encoding: &'static str,
    },

    #[error("content cannot be encoded as {encoding}: {path}")]
    Encode {
        path: PathBuf,
        encoding: &'static str,
    },

    #[error("{op} failed: permission denied: {path}")]
    AccessDenied { op: &'static str, path: PathBuf },

    #[error("backup of {path} failed, operation aborted: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error during {op} on {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(
        "could not bind listener ports on {host} starting at {base_port}; tried {}",
        format_ports(attempted)
    )]
    Startup {
        host: String,
        base_port: u16,
        attempted: Vec<u16>,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable wire code for each error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PathViolation,
    NotFound,
    AlreadyExists,
    NotADirectory,
    NotAFile,
    NotEmpty,
    TooLarge,
    DecodeError,
    AccessDenied,
    BackupError,
    IoError,
    InvalidArgument,
    InvalidConfig,
    StartupError,
    Json,
}

impl Error {
    /// Classifies an OS error into the taxonomy, keeping the operation name and the
    /// workspace-relative path for the message.
    pub fn io_path(op: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { op, path },
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied { op, path },
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            std::io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty(path),
            std::io::ErrorKind::NotADirectory => Self::NotADirectory(path),
            std::io::ErrorKind::IsADirectory => Self::NotAFile(path),
            _ => Self::Io { op, path, source },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathViolation(_) => ErrorKind::PathViolation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::NotADirectory(_) => ErrorKind::NotADirectory,
            Self::NotAFile(_) => ErrorKind::NotAFile,
            Self::NotEmpty(_) => ErrorKind::NotEmpty,
            Self::TooLarge { .. } => ErrorKind::TooLarge,
            Self::Decode { .. } | Self::Encode { .. } => ErrorKind::DecodeError,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::Backup { .. } => ErrorKind::BackupError,
            Self::Io { .. } => ErrorKind::IoError,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Startup { .. } => ErrorKind::StartupError,
            Self::Json(_) => ErrorKind::Json,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::PathViolation => "path_violation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotADirectory => "not_a_directory",
            ErrorKind::NotAFile => "not_a_file",
            ErrorKind::NotEmpty => "not_empty",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::BackupError => "backup_error",
            ErrorKind::IoError => "io_error",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::StartupError => "startup_error",
            ErrorKind::Json => "json",
        }
    }
}

fn format_ports(ports: &[u16]) -> String {
    match (ports.first(), ports.last()) {
        (Some(first), Some(last)) if ports.len() > 1 => {
            format!("{} base ports ({first}..={last})", ports.len())
        }
        (Some(only), _) => format!("base port {only}"),
        _ => "no ports".to_string(),
    }
}
