use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::EnginePolicy;
use crate::server_config::ServerConfig;

const DEFAULT_MAX_CONFIG_BYTES: u64 = 1024 * 1024;

/// Everything the binary reads from its config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub workspace: EnginePolicy,
    #[serde(default)]
    pub server: ServerConfig,
    /// `tracing` filter directive, e.g. `info` or `fs_relay=debug`.
    #[serde(default)]
    pub log_level: Option<String>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.workspace.validate()?;
        self.server.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// `.json` is JSON; `.toml` or no extension is TOML.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") | None => Ok(Self::Toml),
            Some(other) => Err(Error::InvalidConfig(format!(
                "unsupported config format {other:?}; expected .toml or .json"
            ))),
        }
    }
}

pub fn parse_config(raw: &str, format: ConfigFormat) -> Result<AppConfig> {
    let config: AppConfig = match format {
        ConfigFormat::Json => serde_json::from_str(raw)
            .map_err(|err| Error::InvalidConfig(format!("invalid json config: {err}")))?,
        ConfigFormat::Toml => toml::from_str(raw)
            .map_err(|err| Error::InvalidConfig(format!("invalid toml config: {err}")))?,
    };
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    load_config_limited(path, DEFAULT_MAX_CONFIG_BYTES)
}

/// Loads and validates a config file of at most `max_bytes`.
///
/// Symlinks and non-regular files (FIFOs, sockets, devices) are refused so a hostile path
/// cannot block startup.
pub fn load_config_limited(path: impl AsRef<Path>, max_bytes: u64) -> Result<AppConfig> {
    if max_bytes == 0 {
        return Err(Error::InvalidConfig(
            "max config bytes must be > 0".to_string(),
        ));
    }

    let path = path.as_ref();
    let meta =
        std::fs::symlink_metadata(path).map_err(|err| Error::io_path("metadata", path, err))?;
    if meta.file_type().is_symlink() {
        return Err(Error::InvalidConfig(format!(
            "{} is a symlink; refusing to load config from symlink paths",
            path.display()
        )));
    }
    if !meta.is_file() {
        return Err(Error::NotAFile(path.to_path_buf()));
    }

    let mut bytes = Vec::<u8>::new();
    std::fs::File::open(path)
        .map_err(|err| Error::io_path("open", path, err))?
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|err| Error::io_path("read", path, err))?;
    if bytes.len() as u64 > max_bytes {
        return Err(Error::TooLarge {
            path: path.to_path_buf(),
            size_bytes: bytes.len() as u64,
            max_bytes,
        });
    }

    let raw = std::str::from_utf8(&bytes).map_err(|_| Error::Decode {
        path: path.to_path_buf(),
        encoding: "utf-8",
    })?;
    let config = parse_config(raw, ConfigFormat::from_path(path)?)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}
