mod common;

use std::path::Path;

use fs_relay::Error;
use fs_relay::ops::{Engine, EntryKind, ListDirRequest, StatRequest};

use common::{test_engine, test_policy};

fn seed(root: &Path) {
    std::fs::create_dir(root.join("beta")).expect("mkdir");
    std::fs::write(root.join("alpha.txt"), "abc").expect("write");
    std::fs::write(root.join("gamma.log"), "g").expect("write");
    std::fs::write(root.join(".hidden"), "h").expect("write");
}

fn names(engine: &Engine, request: ListDirRequest) -> Vec<String> {
    engine
        .list_dir(request)
        .expect("list")
        .entries
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}

#[test]
fn listing_is_sorted_and_hides_dotfiles() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed(dir.path());
    let engine = test_engine(dir.path());

    let response = engine.list_dir(ListDirRequest::default()).expect("list");
    let listed = response
        .entries
        .iter()
        .map(|entry| (entry.name.as_str(), entry.kind))
        .collect::<Vec<_>>();
    assert_eq!(
        listed,
        vec![
            ("alpha.txt", EntryKind::File),
            ("beta", EntryKind::Directory),
            ("gamma.log", EntryKind::File),
        ]
    );
    assert_eq!(response.total_count, 3);
    assert!(response.entries.iter().all(|entry| entry.metadata.is_none()));

    let with_hidden = ListDirRequest {
        include_hidden: Some(true),
        ..ListDirRequest::default()
    };
    assert_eq!(names(&engine, with_hidden)[0], ".hidden");
}

#[test]
fn show_hidden_policy_is_the_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed(dir.path());
    let mut policy = test_policy(dir.path());
    policy.listing.show_hidden = true;
    let engine = Engine::new(policy).expect("engine");

    assert_eq!(names(&engine, ListDirRequest::default()).len(), 4);
    let explicit = ListDirRequest {
        include_hidden: Some(false),
        ..ListDirRequest::default()
    };
    assert_eq!(names(&engine, explicit).len(), 3);
}

#[test]
fn filter_and_metadata() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed(dir.path());
    let mut policy = test_policy(dir.path());
    policy.checksums.enabled = true;
    let engine = Engine::new(policy).expect("engine");

    let response = engine
        .list_dir(ListDirRequest {
            filter: Some(".txt".to_string()),
            include_metadata: true,
            ..ListDirRequest::default()
        })
        .expect("list");
    assert_eq!(response.entries.len(), 1);
    let entry = &response.entries[0];
    assert_eq!(entry.path, Path::new("alpha.txt"));
    let metadata = entry.metadata.as_ref().expect("metadata");
    assert_eq!(metadata.size, 3);
    assert_eq!(metadata.size_formatted, "3.0 B");
    assert!(metadata.modified.is_some());
    assert_eq!(
        metadata.checksum.as_deref(),
        Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
    );
}

#[test]
fn listing_a_file_is_not_a_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed(dir.path());
    let engine = test_engine(dir.path());
    match engine.list_dir(ListDirRequest {
        path: "alpha.txt".into(),
        ..ListDirRequest::default()
    }) {
        Err(Error::NotADirectory(path)) => assert_eq!(path, Path::new("alpha.txt")),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn stat_reports_metadata_and_both_checksums() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed(dir.path());
    let engine = test_engine(dir.path());

    let response = engine
        .stat(StatRequest {
            include_checksums: true,
            ..StatRequest::new("alpha.txt")
        })
        .expect("stat");
    assert_eq!(response.name, "alpha.txt");
    assert_eq!(response.kind, EntryKind::File);
    assert_eq!(response.metadata.size, 3);
    let checksums = response.checksums.expect("checksums");
    assert_eq!(
        checksums.get("sha256").map(String::as_str),
        Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
    );
    assert_eq!(
        checksums.get("md5").map(String::as_str),
        Some("900150983cd24fb0d6963f7d28e17f72")
    );

    let json = serde_json::to_value(
        engine
            .stat(StatRequest::new("beta"))
            .expect("stat dir"),
    )
    .expect("json");
    assert_eq!(json["type"], "directory");
    assert!(json.get("checksums").is_none());
    assert!(json.get("size_formatted").is_some());
}

#[test]
#[cfg(unix)]
fn stat_reports_octal_mode_and_access_flags() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("script.sh"), "#!/bin/sh\n").expect("write");
    std::fs::set_permissions(
        dir.path().join("script.sh"),
        std::fs::Permissions::from_mode(0o750),
    )
    .expect("chmod");
    let engine = test_engine(dir.path());

    let response = engine.stat(StatRequest::new("script.sh")).expect("stat");
    assert_eq!(response.metadata.mode.as_deref(), Some("750"));
    let flags = response.metadata.permissions.expect("flags");
    assert!(flags.readable);
    assert!(flags.executable);
}

#[test]
fn stat_missing_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = test_engine(dir.path());
    match engine.stat(StatRequest::new("nope")) {
        Err(err @ Error::NotFound { .. }) => {
            assert_eq!(err.to_string(), "metadata failed: not found: nope");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
