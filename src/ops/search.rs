use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::path_utils::relative_to;

use super::{Engine, ScanLimitReason};

const MAX_PATTERN_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub path: PathBuf,
    pub pattern: String,
    /// Also match file contents (UTF-8 text only).
    #[serde(default)]
    pub content_search: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Capped by `limits.max_search_results`.
    #[serde(default)]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub filename_match: bool,
    pub content_match: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub path: PathBuf,
    pub pattern: String,
    pub results: Vec<SearchMatch>,
    pub total_matches: usize,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_limit_reason: Option<ScanLimitReason>,
    #[serde(default)]
    pub scanned_files: u64,
    #[serde(default)]
    pub skipped_too_large_files: u64,
    #[serde(default)]
    pub skipped_undecodable_files: u64,
    #[serde(default)]
    pub skipped_io_errors: u64,
}

#[derive(Debug, Default)]
struct SearchCounters {
    scanned_files: u64,
    skipped_too_large_files: u64,
    skipped_undecodable_files: u64,
    skipped_io_errors: u64,
}

struct Needle {
    text: String,
    case_sensitive: bool,
}

impl Needle {
    fn new(pattern: &str, case_sensitive: bool) -> Self {
        let text = if case_sensitive {
            pattern.to_string()
        } else {
            pattern.to_lowercase()
        };
        Self {
            text,
            case_sensitive,
        }
    }

    fn is_in(&self, haystack: &str) -> bool {
        if self.case_sensitive {
            haystack.contains(&self.text)
        } else {
            haystack.to_lowercase().contains(&self.text)
        }
    }
}

fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::InvalidArgument(
            "search pattern must not be empty".to_string(),
        ));
    }
    if pattern.len() > MAX_PATTERN_BYTES {
        return Err(Error::InvalidArgument(format!(
            "search pattern is too large ({} bytes; max {MAX_PATTERN_BYTES} bytes)",
            pattern.len()
        )));
    }
    Ok(())
}

pub fn search(engine: &Engine, request: SearchRequest) -> Result<SearchResponse> {
    validate_pattern(&request.pattern)?;
    let dir = engine.guard().resolve(&request.path)?;
    tracing::debug!(
        path = %dir.relative.display(),
        content_search = request.content_search,
        "search"
    );
    let meta =
        fs::metadata(&dir.absolute).map_err(|err| Error::io_path("metadata", &dir.relative, err))?;
    if !meta.is_dir() {
        return Err(Error::NotADirectory(dir.relative));
    }

    let limits = &engine.policy().limits;
    let max_results = request
        .max_results
        .unwrap_or(limits.max_search_results)
        .clamp(1, limits.max_search_results);
    let needle = Needle::new(&request.pattern, request.case_sensitive);

    let mut results = Vec::<SearchMatch>::new();
    let mut counters = SearchCounters::default();
    let mut scan_limit_reason = None;
    let mut walked_entries: usize = 0;

    let backup_dir = engine.backups().directory().to_path_buf();
    let walker = WalkDir::new(&dir.absolute)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.path() != backup_dir.as_path());

    for entry in walker {
        walked_entries += 1;
        if walked_entries > limits.max_walk_entries {
            scan_limit_reason = Some(ScanLimitReason::Entries);
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => {
                counters.skipped_io_errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        counters.scanned_files += 1;

        let entry_meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(_) => {
                counters.skipped_io_errors += 1;
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = relative_to(entry.path(), engine.root());
        let filename_match = needle.is_in(&name);
        let content_match = request.content_search
            && content_matches(
                engine,
                entry.path(),
                &relative,
                entry_meta.len(),
                &needle,
                &mut counters,
            );

        if !(filename_match || content_match) {
            continue;
        }
        results.push(SearchMatch {
            path: relative,
            name,
            size: entry_meta.len(),
            modified: entry_meta.modified().ok().map(DateTime::<Utc>::from),
            filename_match,
            content_match,
        });
        if results.len() >= max_results {
            scan_limit_reason = Some(ScanLimitReason::Results);
            break;
        }
    }

    Ok(SearchResponse {
        path: dir.relative,
        pattern: request.pattern,
        total_matches: results.len(),
        truncated: scan_limit_reason.is_some(),
        results,
        scan_limit_reason,
        scanned_files: counters.scanned_files,
        skipped_too_large_files: counters.skipped_too_large_files,
        skipped_undecodable_files: counters.skipped_undecodable_files,
        skipped_io_errors: counters.skipped_io_errors,
    })
}

fn content_matches(
    engine: &Engine,
    path: &Path,
    relative: &Path,
    size: u64,
    needle: &Needle,
    counters: &mut SearchCounters,
) -> bool {
    let max_bytes = engine.policy().limits.max_file_size;
    if size > max_bytes {
        counters.skipped_too_large_files += 1;
        return false;
    }
    let bytes = match super::io::read_bytes_limited(path, relative, max_bytes) {
        Ok(bytes) => bytes,
        Err(Error::TooLarge { .. }) => {
            counters.skipped_too_large_files += 1;
            return false;
        }
        Err(_) => {
            counters.skipped_io_errors += 1;
            return false;
        }
    };
    match std::str::from_utf8(&bytes) {
        Ok(text) => needle.is_in(text),
        Err(_) => {
            counters.skipped_undecodable_files += 1;
            false
        }
    }
}
