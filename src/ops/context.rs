use std::path::Path;

use crate::error::Result;
use crate::policy::{BackupFailureMode, EnginePolicy};

use super::backup::{BackupRecord, BackupService};
use super::metadata::EntryKind;
use super::resolve::{CanonicalPath, PathGuard};
use super::{
    CopyRequest, CopyResponse, DeleteOutcome, DeleteRequest, Engine, ListDirRequest,
    ListDirResponse, MkdirRequest, MkdirResponse, MoveRequest, MoveResponse, ReadRequest,
    ReadResponse, SearchRequest, SearchResponse, StatRequest, StatResponse, WriteFileRequest,
    WriteFileResponse,
};

impl Engine {
    pub fn new(policy: EnginePolicy) -> Result<Self> {
        policy.validate()?;
        let guard = PathGuard::new(&policy.workspace_root)?;
        let backups = BackupService::new(guard.root(), &policy.backup);
        tracing::debug!(root = %guard.root().display(), "engine ready");
        Ok(Self {
            policy,
            guard,
            backups,
        })
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    /// Canonical workspace root.
    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub fn backups(&self) -> &BackupService {
        &self.backups
    }

    pub fn list_dir(&self, request: ListDirRequest) -> Result<ListDirResponse> {
        super::list_dir(self, request)
    }

    pub fn read_file(&self, request: ReadRequest) -> Result<ReadResponse> {
        super::read_file(self, request)
    }

    pub fn write_file(&self, request: WriteFileRequest) -> Result<WriteFileResponse> {
        super::write_file(self, request)
    }

    pub fn mkdir(&self, request: MkdirRequest) -> Result<MkdirResponse> {
        super::mkdir(self, request)
    }

    pub fn delete(&self, request: DeleteRequest) -> Result<DeleteOutcome> {
        super::delete(self, request)
    }

    pub fn copy_path(&self, request: CopyRequest) -> Result<CopyResponse> {
        super::copy_path(self, request)
    }

    pub fn move_path(&self, request: MoveRequest) -> Result<MoveResponse> {
        super::move_path(self, request)
    }

    pub fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        super::search(self, request)
    }

    pub fn stat(&self, request: StatRequest) -> Result<StatResponse> {
        super::stat(self, request)
    }

    /// Backs up `target` when `enabled`, honoring the configured failure mode. Entries inside
    /// the backup area and special files are never backed up.
    pub(super) fn backup_before(
        &self,
        target: &CanonicalPath,
        kind: EntryKind,
        enabled: bool,
    ) -> Result<Option<BackupRecord>> {
        if !enabled {
            return Ok(None);
        }
        if kind == EntryKind::Other || self.backups.is_backup_path(&target.absolute) {
            tracing::debug!(path = %target.relative.display(), "backup skipped");
            return Ok(None);
        }
        match self.backups.backup(target) {
            Ok(record) => Ok(Some(record)),
            Err(err) => match self.policy.backup.on_failure {
                BackupFailureMode::Abort => Err(err),
                BackupFailureMode::LogAndContinue => {
                    tracing::warn!(
                        path = %target.relative.display(),
                        error = %err,
                        "backup failed; continuing"
                    );
                    Ok(None)
                }
            },
        }
    }

    /// Configured checksum of a regular file, if checksums are enabled and computable.
    pub(super) fn checksum_if_enabled(&self, absolute: &Path, relative: &Path) -> Option<String> {
        if !self.policy.checksums.enabled {
            return None;
        }
        super::checksum::digest_or_warn(absolute, relative, self.policy.checksums.algorithm)
    }
}
