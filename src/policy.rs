use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ops::ChecksumAlgorithm;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    /// Largest file (bytes) that `read`, `write` and content search will handle.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
    #[serde(default = "default_max_walk_entries")]
    pub max_walk_entries: usize,
}

const fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

const fn default_max_search_results() -> usize {
    10_000
}

const fn default_max_walk_entries() -> usize {
    500_000
}

// Guardrails against misconfiguration.
const MAX_FILE_SIZE_HARD_CAP: u64 = 16 * 1024 * 1024 * 1024;
const MAX_SEARCH_RESULTS_HARD_CAP: usize = 1_000_000;
const MAX_WALK_ENTRIES_HARD_CAP: usize = 10_000_000;

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_search_results: default_max_search_results(),
            max_walk_entries: default_max_walk_entries(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ChecksumRules {
    /// Attach a checksum to every file read, listed with metadata, or written.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub algorithm: ChecksumAlgorithm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackupFailureMode {
    /// A failed backup aborts the destructive operation.
    #[default]
    Abort,
    /// A failed backup is logged and the operation proceeds.
    LogAndContinue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupRules {
    #[serde(default = "default_true")]
    pub on_delete: bool,
    /// Back up the existing destination before write/copy/move replaces it.
    #[serde(default)]
    pub on_overwrite: bool,
    /// Backup area, a single directory name under the workspace root.
    #[serde(default = "default_backup_directory")]
    pub directory: String,
    #[serde(default = "default_true")]
    pub preserve_metadata: bool,
    #[serde(default)]
    pub on_failure: BackupFailureMode,
}

const fn default_true() -> bool {
    true
}

fn default_backup_directory() -> String {
    ".backups".to_string()
}

impl Default for BackupRules {
    fn default() -> Self {
        Self {
            on_delete: true,
            on_overwrite: false,
            directory: default_backup_directory(),
            preserve_metadata: true,
            on_failure: BackupFailureMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ListingRules {
    /// Default for `include_hidden` when a list request leaves it unset.
    #[serde(default)]
    pub show_hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnginePolicy {
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub checksums: ChecksumRules,
    #[serde(default)]
    pub backup: BackupRules,
    #[serde(default)]
    pub listing: ListingRules,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self::new(default_workspace_root())
    }
}

impl EnginePolicy {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            limits: Limits::default(),
            checksums: ChecksumRules::default(),
            backup: BackupRules::default(),
            listing: ListingRules::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workspace_root.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "workspace_root must not be empty".to_string(),
            ));
        }
        validate_u64_limit(
            self.limits.max_file_size,
            "limits.max_file_size",
            MAX_FILE_SIZE_HARD_CAP,
        )?;
        validate_usize_limit(
            self.limits.max_search_results,
            "limits.max_search_results",
            MAX_SEARCH_RESULTS_HARD_CAP,
        )?;
        validate_usize_limit(
            self.limits.max_walk_entries,
            "limits.max_walk_entries",
            MAX_WALK_ENTRIES_HARD_CAP,
        )?;
        validate_backup_directory(&self.backup.directory)
    }
}

fn validate_u64_limit(value: u64, field: &str, hard_cap: u64) -> Result<()> {
    if value == 0 {
        return Err(Error::InvalidConfig(format!("{field} must be > 0")));
    }
    if value > hard_cap {
        return Err(Error::InvalidConfig(format!(
            "{field} must be <= {hard_cap}"
        )));
    }
    Ok(())
}

fn validate_usize_limit(value: usize, field: &str, hard_cap: usize) -> Result<()> {
    if value == 0 {
        return Err(Error::InvalidConfig(format!("{field} must be > 0")));
    }
    if value > hard_cap {
        return Err(Error::InvalidConfig(format!(
            "{field} must be <= {hard_cap}"
        )));
    }
    Ok(())
}

fn validate_backup_directory(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(Error::InvalidConfig(format!(
            "backup.directory must be a single directory name, got {name:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let policy = EnginePolicy::new("/tmp/ws");
        assert_eq!(policy.limits.max_file_size, 100 * 1024 * 1024);
        assert!(policy.backup.on_delete);
        assert!(!policy.backup.on_overwrite);
        assert_eq!(policy.backup.on_failure, BackupFailureMode::Abort);
        assert!(!policy.checksums.enabled);
        assert!(!policy.listing.show_hidden);
        policy.validate().expect("valid");
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut policy = EnginePolicy::new("/tmp/ws");
        policy.limits.max_file_size = 0;
        let err = policy.validate().expect_err("zero limit");
        assert!(err.to_string().contains("limits.max_file_size"));
    }

    #[test]
    fn validate_rejects_nested_backup_directory() {
        for bad in ["", "a/b", "..", "/abs"] {
            let mut policy = EnginePolicy::new("/tmp/ws");
            policy.backup.directory = bad.to_string();
            assert!(policy.validate().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn policy_deserializes_with_partial_sections() {
        let policy: EnginePolicy = serde_json::from_value(serde_json::json!({
            "workspace_root": "/tmp/ws",
            "backup": { "on_failure": "log_and_continue" },
            "checksums": { "enabled": true, "algorithm": "md5" }
        }))
        .expect("parse");
        assert_eq!(policy.backup.on_failure, BackupFailureMode::LogAndContinue);
        assert!(policy.backup.on_delete);
        assert_eq!(policy.checksums.algorithm, ChecksumAlgorithm::Md5);
    }
}
