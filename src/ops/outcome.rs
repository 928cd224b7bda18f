use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

use super::delete::DeleteOutcome;
use super::metadata::EntryKind;

/// Uniform wire envelope for every operation. Exactly one shape is populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OperationResult {
    Success {
        operation: String,
        success: serde_json::Value,
    },
    ConfirmationRequired {
        operation: String,
        path: PathBuf,
        #[serde(rename = "type")]
        kind: EntryKind,
        message: String,
    },
    Failure {
        operation: String,
        kind: ErrorKind,
        error: String,
    },
}

impl OperationResult {
    pub fn from_result<T: Serialize>(operation: &str, result: Result<T>) -> Self {
        match result.and_then(|payload| serde_json::to_value(payload).map_err(Error::from)) {
            Ok(success) => Self::Success {
                operation: operation.to_string(),
                success,
            },
            Err(err) => Self::failure(operation, &err),
        }
    }

    pub fn from_delete(operation: &str, result: Result<DeleteOutcome>) -> Self {
        match result {
            Ok(DeleteOutcome::Deleted(response)) => Self::from_result(operation, Ok(response)),
            Ok(DeleteOutcome::ConfirmationRequired(details)) => Self::ConfirmationRequired {
                operation: operation.to_string(),
                path: details.path,
                kind: details.kind,
                message: details.message,
            },
            Err(err) => Self::failure(operation, &err),
        }
    }

    pub fn failure(operation: &str, err: &Error) -> Self {
        Self::Failure {
            operation: operation.to_string(),
            kind: err.kind(),
            error: err.to_string(),
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            Self::Success { operation, .. }
            | Self::ConfirmationRequired { operation, .. }
            | Self::Failure { operation, .. } => operation,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub const fn outcome_label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::ConfirmationRequired { .. } => "confirmation_required",
            Self::Failure { .. } => "failure",
        }
    }
}
