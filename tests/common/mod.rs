#![allow(dead_code)]

use std::path::Path;

use fs_relay::ops::Engine;
use fs_relay::policy::EnginePolicy;

pub fn test_policy(root: &Path) -> EnginePolicy {
    EnginePolicy::new(root)
}

pub fn test_engine(root: &Path) -> Engine {
    Engine::new(test_policy(root)).expect("engine")
}

/// File names in the default backup area, sorted; empty when it does not exist yet.
pub fn backup_names(root: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(root.join(".backups")) else {
        return Vec::new();
    };
    let mut names = entries
        .map(|entry| {
            entry
                .expect("backup entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect::<Vec<_>>();
    names.sort();
    names
}

/// `<name>.<YYYYMMDDTHHMMSS.ffffffZ>.<seq>.bak`
pub fn is_backup_name_for(backup: &str, original: &str) -> bool {
    let Some(rest) = backup
        .strip_prefix(original)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(".bak"))
    else {
        return false;
    };
    let Some((stamp, seq)) = rest.rsplit_once('.') else {
        return false;
    };
    let stamp_ok = stamp.len() == "20240101T000000.000000Z".len()
        && stamp.as_bytes()[8] == b'T'
        && stamp.ends_with('Z');
    stamp_ok && !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit())
}
