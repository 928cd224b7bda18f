use serde::{Deserialize, Serialize};

use crate::policy::EnginePolicy;

mod backup;
mod checksum;
mod context;
mod copy_path;
mod delete;
mod encoding;
mod io;
mod list_dir;
mod metadata;
mod mkdir;
mod move_path;
mod outcome;
mod read;
mod resolve;
mod search;
mod stat;
mod write;

pub use backup::{BackupRecord, BackupService};
pub use checksum::{ChecksumAlgorithm, ChecksumError, digest};
pub use copy_path::{CopyRequest, CopyResponse, copy_path};
pub use delete::{ConfirmationRequired, DeleteOutcome, DeleteRequest, DeleteResponse, delete};
pub use encoding::TextEncoding;
pub use list_dir::{ListDirEntry, ListDirRequest, ListDirResponse, list_dir};
pub use metadata::{AccessFlags, EntryKind, FileMetadata};
pub use mkdir::{MkdirRequest, MkdirResponse, mkdir};
pub use move_path::{MoveMethod, MoveRequest, MoveResponse, move_path};
pub use outcome::OperationResult;
pub use read::{ReadRequest, ReadResponse, read_file};
pub use resolve::{CanonicalPath, PathGuard};
pub use search::{SearchMatch, SearchRequest, SearchResponse, search};
pub use stat::{StatRequest, StatResponse, stat};
pub use write::{WriteFileRequest, WriteFileResponse, write_file};


/// The file-operation engine: one canonical workspace root, the policy it was built from,
/// and the backup area derived from both. Immutable once built.
pub struct Engine {
    policy: EnginePolicy,
    guard: PathGuard,
    backups: BackupService,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.guard.root())
            .field("limits", &self.policy.limits)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ScanLimitReason {
    Entries,
    Results,
}

const fn default_true() -> bool {
    true
}
