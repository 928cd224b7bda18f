//! Tool-name dispatch over a swappable engine snapshot.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::ops::{ChecksumAlgorithm, Engine, OperationResult};
use crate::policy::BackupFailureMode;
use crate::units::format_size;

/// Receives one event per mutating tool call, whatever its outcome.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &OperationEvent);
}

/// Push-channel payload describing a finished mutating operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub operation: String,
    pub outcome: String,
    pub paths: Vec<PathBuf>,
    pub timestamp: DateTime<Utc>,
}

impl OperationEvent {
    pub fn new(operation: &str, outcome: &str, paths: Vec<PathBuf>) -> Self {
        Self {
            event_type: "event".to_string(),
            operation: operation.to_string(),
            outcome: outcome.to_string(),
            paths,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    ListFiles,
    ReadFile,
    WriteFile,
    GetFileInfo,
    CreateDirectory,
    DeleteFile,
    CopyFile,
    MoveFile,
    SearchFiles,
    GetConfig,
    SetConfig,
}

impl Tool {
    pub const ALL: [Self; 11] = [
        Self::ListFiles,
        Self::ReadFile,
        Self::WriteFile,
        Self::GetFileInfo,
        Self::CreateDirectory,
        Self::DeleteFile,
        Self::CopyFile,
        Self::MoveFile,
        Self::SearchFiles,
        Self::GetConfig,
        Self::SetConfig,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::ListFiles => "list_files",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::GetFileInfo => "get_file_info",
            Self::CreateDirectory => "create_directory",
            Self::DeleteFile => "delete_file",
            Self::CopyFile => "copy_file",
            Self::MoveFile => "move_file",
            Self::SearchFiles => "search_files",
            Self::GetConfig => "get_config",
            Self::SetConfig => "set_config",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Tools that change the workspace and therefore emit an event.
    pub const fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::WriteFile
                | Self::CreateDirectory
                | Self::DeleteFile
                | Self::CopyFile
                | Self::MoveFile
        )
    }
}

/// Effective configuration as reported by `get_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub workspace_directory: PathBuf,
    pub max_file_size: u64,
    pub max_file_size_formatted: String,
    pub enable_checksums: bool,
    pub checksum_algorithm: ChecksumAlgorithm,
    pub backup_on_delete: bool,
    pub backup_on_overwrite: bool,
    pub backup_on_failure: BackupFailureMode,
    pub show_hidden_files: bool,
    pub backup_directory: String,
}

impl ConfigSnapshot {
    pub fn of(engine: &Engine) -> Self {
        let policy = engine.policy();
        Self {
            workspace_directory: engine.root().to_path_buf(),
            max_file_size: policy.limits.max_file_size,
            max_file_size_formatted: format_size(policy.limits.max_file_size),
            enable_checksums: policy.checksums.enabled,
            checksum_algorithm: policy.checksums.algorithm,
            backup_on_delete: policy.backup.on_delete,
            backup_on_overwrite: policy.backup.on_overwrite,
            backup_on_failure: policy.backup.on_failure,
            show_hidden_files: policy.listing.show_hidden,
            backup_directory: policy.backup.directory.clone(),
        }
    }
}

/// Keys accepted by `set_config`. Changes live in memory only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub workspace_directory: Option<PathBuf>,
    #[serde(default)]
    pub max_file_size: Option<u64>,
    #[serde(default)]
    pub enable_checksums: Option<bool>,
    #[serde(default)]
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    #[serde(default)]
    pub backup_on_delete: Option<bool>,
    #[serde(default)]
    pub backup_on_overwrite: Option<bool>,
    #[serde(default)]
    pub backup_on_failure: Option<BackupFailureMode>,
    #[serde(default)]
    pub show_hidden_files: Option<bool>,
}

impl ConfigUpdate {
    fn apply(self, policy: &mut crate::policy::EnginePolicy) -> Vec<&'static str> {
        let mut updated = Vec::new();
        if let Some(root) = self.workspace_directory {
            policy.workspace_root = root;
            updated.push("workspace_directory");
        }
        if let Some(size) = self.max_file_size {
            policy.limits.max_file_size = size;
            updated.push("max_file_size");
        }
        if let Some(enabled) = self.enable_checksums {
            policy.checksums.enabled = enabled;
            updated.push("enable_checksums");
        }
        if let Some(algorithm) = self.checksum_algorithm {
            policy.checksums.algorithm = algorithm;
            updated.push("checksum_algorithm");
        }
        if let Some(on_delete) = self.backup_on_delete {
            policy.backup.on_delete = on_delete;
            updated.push("backup_on_delete");
        }
        if let Some(on_overwrite) = self.backup_on_overwrite {
            policy.backup.on_overwrite = on_overwrite;
            updated.push("backup_on_overwrite");
        }
        if let Some(mode) = self.backup_on_failure {
            policy.backup.on_failure = mode;
            updated.push("backup_on_failure");
        }
        if let Some(show) = self.show_hidden_files {
            policy.listing.show_hidden = show;
            updated.push("show_hidden_files");
        }
        updated
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigChange {
    pub updated: Vec<&'static str>,
    pub config: ConfigSnapshot,
}

/// Routes tool calls to the current engine snapshot. `set_config` swaps in a freshly built
/// engine; calls already running keep the snapshot they started with.
pub struct Dispatcher {
    engine: RwLock<Arc<Engine>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("engine", &self.engine())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: RwLock::new(Arc::new(engine)),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn invoke(&self, tool: &str, arguments: Value) -> OperationResult {
        let Some(parsed) = Tool::from_name(tool) else {
            tracing::debug!(tool, "unknown tool");
            return OperationResult::failure(
                tool,
                &Error::InvalidArgument(format!("unknown tool: {tool}")),
            );
        };
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let paths = event_paths(&arguments);
        tracing::debug!(tool, paths = ?paths, "invoke");

        let result = self.run(parsed, arguments);
        if parsed.is_mutating()
            && let Some(sink) = &self.sink
        {
            sink.publish(&OperationEvent::new(tool, result.outcome_label(), paths));
        }
        result
    }

    fn run(&self, tool: Tool, arguments: Value) -> OperationResult {
        let name = tool.name();
        let engine = self.engine();
        match tool {
            Tool::ListFiles => OperationResult::from_result(
                name,
                parse(tool, arguments).and_then(|request| engine.list_dir(request)),
            ),
            Tool::ReadFile => OperationResult::from_result(
                name,
                parse(tool, arguments).and_then(|request| engine.read_file(request)),
            ),
            Tool::WriteFile => OperationResult::from_result(
                name,
                parse(tool, arguments).and_then(|request| engine.write_file(request)),
            ),
            Tool::GetFileInfo => OperationResult::from_result(
                name,
                parse(tool, arguments).and_then(|request| engine.stat(request)),
            ),
            Tool::CreateDirectory => OperationResult::from_result(
                name,
                parse(tool, arguments).and_then(|request| engine.mkdir(request)),
            ),
            Tool::DeleteFile => OperationResult::from_delete(
                name,
                parse(tool, arguments).and_then(|request| engine.delete(request)),
            ),
            Tool::CopyFile => OperationResult::from_result(
                name,
                parse(tool, arguments).and_then(|request| engine.copy_path(request)),
            ),
            Tool::MoveFile => OperationResult::from_result(
                name,
                parse(tool, arguments).and_then(|request| engine.move_path(request)),
            ),
            Tool::SearchFiles => OperationResult::from_result(
                name,
                parse(tool, arguments).and_then(|request| engine.search(request)),
            ),
            Tool::GetConfig => OperationResult::from_result(name, Ok(ConfigSnapshot::of(&engine))),
            Tool::SetConfig => OperationResult::from_result(name, self.set_config(arguments)),
        }
    }

    /// Applies `arguments` (either `{"<key>": value, ..}` or `{"key": .., "value": ..}`) to a
    /// copy of the current policy and swaps in the rebuilt engine.
    pub fn set_config(&self, arguments: Value) -> Result<ConfigChange> {
        let update: ConfigUpdate = parse(Tool::SetConfig, key_value_to_object(arguments))?;
        let mut slot = self.engine.write().unwrap_or_else(PoisonError::into_inner);
        let mut policy = slot.policy().clone();
        let updated = update.apply(&mut policy);
        if updated.is_empty() {
            return Err(Error::InvalidArgument(
                "set_config needs at least one configuration key".to_string(),
            ));
        }
        let next = Arc::new(Engine::new(policy)?);
        *slot = Arc::clone(&next);
        drop(slot);

        tracing::info!(keys = ?updated, root = %next.root().display(), "configuration updated");
        Ok(ConfigChange {
            updated,
            config: ConfigSnapshot::of(&next),
        })
    }
}

fn parse<T: DeserializeOwned>(tool: Tool, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|err| {
        Error::InvalidArgument(format!("invalid arguments for {}: {err}", tool.name()))
    })
}

/// Rewrites `{"key": k, "value": v}` as `{k: v}`. String values holding JSON scalars or
/// objects are decoded first.
fn key_value_to_object(arguments: Value) -> Value {
    let Value::Object(mut map) = arguments else {
        return arguments;
    };
    if map.len() != 2 || !map.get("key").is_some_and(Value::is_string) {
        return Value::Object(map);
    }
    let (Some(Value::String(key)), Some(value)) = (map.remove("key"), map.remove("value")) else {
        return Value::Object(map);
    };
    let value = match value {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(decoded) if !decoded.is_string() => decoded,
            _ => Value::String(text),
        },
        other => other,
    };
    let mut object = Map::new();
    object.insert(key, value);
    Value::Object(object)
}

fn event_paths(arguments: &Value) -> Vec<PathBuf> {
    ["path", "source", "destination"]
        .into_iter()
        .filter_map(|field| arguments.get(field).and_then(Value::as_str))
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_round_trip() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(Tool::from_name("rm_rf"), None);
    }

    #[test]
    fn key_value_form_is_flattened() {
        let flattened = key_value_to_object(serde_json::json!({
            "key": "enable_checksums",
            "value": "true"
        }));
        assert_eq!(flattened, serde_json::json!({ "enable_checksums": true }));

        let algorithm = key_value_to_object(serde_json::json!({
            "key": "checksum_algorithm",
            "value": "md5"
        }));
        assert_eq!(algorithm, serde_json::json!({ "checksum_algorithm": "md5" }));

        let untouched = serde_json::json!({ "max_file_size": 10 });
        assert_eq!(key_value_to_object(untouched.clone()), untouched);
    }

    #[test]
    fn event_paths_collect_path_arguments() {
        let paths = event_paths(&serde_json::json!({
            "source": "a.txt",
            "destination": "b.txt",
            "overwrite": true
        }));
        assert_eq!(paths, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = OperationEvent::new("write_file", "success", vec![PathBuf::from("a.txt")]);
        let json = serde_json::to_value(&event).expect("json");
        assert_eq!(json["type"], "event");
        assert_eq!(json["operation"], "write_file");
        assert_eq!(json["paths"], serde_json::json!(["a.txt"]));
    }
}
