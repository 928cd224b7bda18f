//! `fs-relay` runs workspace-bounded file operations and mirrors their outcomes to live
//! observers.
//!
//! Every path is resolved against a single canonical workspace root before it is touched.
//! Destructive operations can back up what they replace, and file results can carry checksums.
//! The `notify` feature adds a static-file HTTP listener and a WebSocket push channel that
//! receive one event per mutating operation.

#[cfg(feature = "config-io")]
pub mod config_io;
pub mod dispatch;
mod error;
#[cfg(feature = "notify")]
pub mod notify;
pub mod ops;
mod path_utils;
pub mod policy;
pub mod server_config;
pub mod units;

pub use error::{Error, ErrorKind, Result};

pub use dispatch::{ConfigSnapshot, Dispatcher, EventSink, OperationEvent, Tool};
pub use ops::{
    CopyRequest, CopyResponse, DeleteOutcome, DeleteRequest, DeleteResponse, Engine,
    ListDirRequest, ListDirResponse, MkdirRequest, MkdirResponse, MoveRequest, MoveResponse,
    OperationResult, PathGuard, ReadRequest, ReadResponse, SearchRequest, SearchResponse,
    StatRequest, StatResponse, WriteFileRequest, WriteFileResponse,
};
pub use policy::{BackupFailureMode, BackupRules, ChecksumRules, EnginePolicy, Limits, ListingRules};
pub use server_config::ServerConfig;
