mod common;

use std::path::Path;

use fs_relay::Error;
use fs_relay::ops::{CopyRequest, Engine, EntryKind, MoveMethod, MoveRequest};

use common::{test_engine, test_policy};

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("read")
}

#[test]
fn copy_file_and_overwrite_guard() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = test_engine(dir.path());
    std::fs::write(dir.path().join("a.txt"), "alpha").expect("write");
    std::fs::write(dir.path().join("b.txt"), "beta").expect("write");

    let copied = engine
        .copy_path(CopyRequest::new("a.txt", "c.txt"))
        .expect("copy");
    assert_eq!(copied.kind, EntryKind::File);
    assert_eq!(copied.files_copied, 1);
    assert_eq!(copied.bytes_copied, 5);
    assert!(!copied.overwritten);
    assert_eq!(read(&dir.path().join("c.txt")), "alpha");

    match engine.copy_path(CopyRequest::new("a.txt", "b.txt")) {
        Err(Error::AlreadyExists(path)) => assert_eq!(path, Path::new("b.txt")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(read(&dir.path().join("b.txt")), "beta");

    let replaced = engine
        .copy_path(CopyRequest {
            overwrite: true,
            ..CopyRequest::new("a.txt", "b.txt")
        })
        .expect("overwrite");
    assert!(replaced.overwritten);
    assert_eq!(read(&dir.path().join("b.txt")), "alpha");
}

#[test]
fn copy_directory_recursively() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = test_engine(dir.path());
    std::fs::create_dir_all(dir.path().join("src/nested")).expect("mkdir");
    std::fs::write(dir.path().join("src/one.txt"), "1").expect("write");
    std::fs::write(dir.path().join("src/nested/two.txt"), "22").expect("write");

    let response = engine
        .copy_path(CopyRequest::new("src", "dst"))
        .expect("copy dir");
    assert_eq!(response.kind, EntryKind::Directory);
    assert_eq!(response.files_copied, 2);
    assert_eq!(response.bytes_copied, 3);
    assert_eq!(read(&dir.path().join("dst/nested/two.txt")), "22");
    assert_eq!(read(&dir.path().join("src/one.txt")), "1");
}

#[test]
fn copy_directory_into_itself_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = test_engine(dir.path());
    std::fs::create_dir(dir.path().join("src")).expect("mkdir");

    match engine.copy_path(CopyRequest::new("src", "src/inner")) {
        Err(Error::InvalidArgument(message)) => assert!(message.contains("into itself")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!dir.path().join("src/inner").exists());
}

#[test]
fn copy_onto_ancestor_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = test_engine(dir.path());
    std::fs::create_dir(dir.path().join("parent")).expect("mkdir");
    std::fs::write(dir.path().join("parent/child.txt"), "c").expect("write");

    match engine.copy_path(CopyRequest {
        overwrite: true,
        ..CopyRequest::new("parent/child.txt", "parent")
    }) {
        Err(Error::InvalidArgument(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(read(&dir.path().join("parent/child.txt")), "c");
}

#[test]
fn copy_requires_parent_unless_create_parents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = test_engine(dir.path());
    std::fs::write(dir.path().join("a.txt"), "a").expect("write");

    match engine.copy_path(CopyRequest::new("a.txt", "deep/er/a.txt")) {
        Err(Error::NotFound { .. }) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    engine
        .copy_path(CopyRequest {
            create_parents: true,
            ..CopyRequest::new("a.txt", "deep/er/a.txt")
        })
        .expect("copy with parents");
    assert_eq!(read(&dir.path().join("deep/er/a.txt")), "a");
}

#[test]
fn copy_missing_source_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = test_engine(dir.path());
    match engine.copy_path(CopyRequest::new("ghost", "copy")) {
        Err(Error::NotFound { path, .. }) => assert_eq!(path, Path::new("ghost")),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn move_overwrite_guard_leaves_both_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = test_engine(dir.path());
    std::fs::write(dir.path().join("a.txt"), "alpha").expect("write");
    std::fs::write(dir.path().join("b.txt"), "beta").expect("write");

    match engine.move_path(MoveRequest::new("a.txt", "b.txt")) {
        Err(Error::AlreadyExists(path)) => assert_eq!(path, Path::new("b.txt")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(read(&dir.path().join("a.txt")), "alpha");
    assert_eq!(read(&dir.path().join("b.txt")), "beta");
}

#[test]
fn move_renames_and_overwrites_with_backup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut policy = test_policy(dir.path());
    policy.backup.on_overwrite = true;
    let engine = Engine::new(policy).expect("engine");
    std::fs::write(dir.path().join("a.txt"), "alpha").expect("write");
    std::fs::write(dir.path().join("b.txt"), "beta").expect("write");

    let response = engine
        .move_path(MoveRequest {
            overwrite: true,
            ..MoveRequest::new("a.txt", "b.txt")
        })
        .expect("move");
    assert_eq!(response.method, MoveMethod::Rename);
    assert!(response.overwritten);
    assert!(!dir.path().join("a.txt").exists());
    assert_eq!(read(&dir.path().join("b.txt")), "alpha");

    let backup = response.backup.expect("backup");
    assert_eq!(read(&dir.path().join(backup.backup_path)), "beta");
}

#[test]
fn move_directory_into_itself_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = test_engine(dir.path());
    std::fs::create_dir(dir.path().join("box")).expect("mkdir");

    match engine.move_path(MoveRequest::new("box", "box/inside")) {
        Err(Error::InvalidArgument(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(dir.path().join("box").is_dir());
}

#[test]
#[cfg(unix)]
fn move_relocates_symlinks_not_targets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = test_engine(dir.path());
    std::fs::write(dir.path().join("target.txt"), "t").expect("write");
    std::os::unix::fs::symlink("target.txt", dir.path().join("link")).expect("symlink");

    let response = engine
        .move_path(MoveRequest::new("link", "renamed"))
        .expect("move");
    assert_eq!(response.kind, EntryKind::Symlink);
    assert!(dir.path().join("target.txt").exists());
    let meta = std::fs::symlink_metadata(dir.path().join("renamed")).expect("metadata");
    assert!(meta.file_type().is_symlink());
}
