use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::resolve::CanonicalPath;
use super::{Engine, default_true};

const DEFAULT_DIR_MODE: &str = "755";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MkdirRequest {
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub parents: bool,
    /// Octal mode such as `"750"`; defaults to `"755"`. Ignored off unix.
    #[serde(default)]
    pub permissions: Option<String>,
}

impl MkdirRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            parents: true,
            permissions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MkdirResponse {
    pub path: PathBuf,
    pub created: bool,
    pub permissions: String,
}

pub fn mkdir(engine: &Engine, request: MkdirRequest) -> Result<MkdirResponse> {
    let mode_label = request
        .permissions
        .as_deref()
        .unwrap_or(DEFAULT_DIR_MODE)
        .trim()
        .to_string();
    let mode = parse_mode(&mode_label)?;

    let target = engine.guard().resolve(&request.path)?;
    tracing::debug!(path = %target.relative.display(), mode = %mode_label, "mkdir");
    if target.is_root() {
        return Err(Error::AlreadyExists(target.relative));
    }

    match fs::symlink_metadata(&target.absolute) {
        Ok(_) => return Err(Error::AlreadyExists(target.relative)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(Error::io_path("metadata", &target.relative, err)),
    }

    ensure_parent_dir(&target, request.parents)?;
    fs::create_dir(&target.absolute)
        .map_err(|err| Error::io_path("create_dir", &target.relative, err))?;
    set_mode(&target.absolute, mode)
        .map_err(|err| Error::io_path("set_permissions", &target.relative, err))?;

    Ok(MkdirResponse {
        path: target.relative,
        created: true,
        permissions: mode_label,
    })
}

fn parse_mode(label: &str) -> Result<u32> {
    let digits = label
        .strip_prefix("0o")
        .unwrap_or(label);
    match u32::from_str_radix(digits, 8) {
        Ok(mode) if !digits.is_empty() && mode <= 0o7777 => Ok(mode),
        _ => Err(Error::InvalidArgument(format!(
            "permissions must be an octal mode such as \"755\", got {label:?}"
        ))),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

fn relative_parent(target: &CanonicalPath) -> PathBuf {
    match target.relative.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Makes sure the directory that will hold `target` exists, creating missing ancestors only
/// when `create` is set.
pub(super) fn ensure_parent_dir(target: &CanonicalPath, create: bool) -> Result<()> {
    let Some(parent) = target.absolute.parent() else {
        return Ok(());
    };
    match fs::metadata(parent) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotADirectory(relative_parent(target))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if !create {
                return Err(Error::NotFound {
                    op: "parent directory",
                    path: relative_parent(target),
                });
            }
            fs::create_dir_all(parent)
                .map_err(|err| Error::io_path("create_dir_all", relative_parent(target), err))
        }
        Err(err) => Err(Error::io_path("metadata", relative_parent(target), err)),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_mode;

    #[test]
    fn parse_mode_accepts_octal_strings() {
        assert_eq!(parse_mode("755").expect("755"), 0o755);
        assert_eq!(parse_mode("0o700").expect("0o700"), 0o700);
        assert_eq!(parse_mode("0755").expect("0755"), 0o755);
        assert!(parse_mode("999").is_err());
        assert!(parse_mode("").is_err());
        assert!(parse_mode("rwx").is_err());
        assert!(parse_mode("17777").is_err());
    }
}
