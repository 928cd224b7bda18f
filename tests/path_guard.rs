mod common;

use std::path::{Path, PathBuf};

use fs_relay::Error;
use fs_relay::ops::{PathGuard, ReadRequest, WriteFileRequest};

use common::test_engine;

fn read(path: impl Into<PathBuf>) -> ReadRequest {
    ReadRequest {
        path: path.into(),
        ..ReadRequest::default()
    }
}

#[test]
fn relative_and_absolute_paths_inside_root_resolve() {
    let dir = tempfile::tempdir().expect("tempdir");
    let guard = PathGuard::new(dir.path()).expect("guard");
    std::fs::write(guard.root().join("a.txt"), "a").expect("write");

    let relative = guard.resolve("a.txt").expect("relative");
    let absolute = guard.resolve(guard.root().join("a.txt")).expect("absolute");
    assert_eq!(relative, absolute);
    assert_eq!(relative.relative, Path::new("a.txt"));

    let missing = guard.resolve("new/dir/file.txt").expect("missing tail");
    assert_eq!(missing.absolute, guard.root().join("new/dir/file.txt"));
}

#[test]
fn parent_escapes_are_path_violations() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("ws")).expect("mkdir");
    std::fs::write(dir.path().join("outside.txt"), "secret").expect("write");
    let engine = test_engine(&dir.path().join("ws"));

    for raw in ["../outside.txt", "sub/../../outside.txt"] {
        match engine.read_file(read(raw)) {
            Err(Error::PathViolation(path)) => assert_eq!(path, Path::new(raw)),
            other => panic!("unexpected result for {raw}: {other:?}"),
        }
    }

    let absolute_outside = dir.path().join("outside.txt");
    match engine.read_file(read(&absolute_outside)) {
        Err(Error::PathViolation(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn sibling_with_root_prefix_is_outside() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("work")).expect("mkdir");
    std::fs::create_dir(dir.path().join("workspace")).expect("mkdir");
    std::fs::write(dir.path().join("workspace/x.txt"), "x").expect("write");
    let guard = PathGuard::new(dir.path().join("work")).expect("guard");

    match guard.resolve(dir.path().join("workspace/x.txt")) {
        Err(Error::PathViolation(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
#[cfg(unix)]
fn symlink_escapes_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outside = tempfile::tempdir().expect("outside");
    std::fs::write(outside.path().join("secret.txt"), "secret").expect("write");
    std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("leak"))
        .expect("symlink");
    std::os::unix::fs::symlink(outside.path(), dir.path().join("outdir")).expect("symlink");
    let engine = test_engine(dir.path());

    match engine.read_file(read("leak")) {
        Err(Error::PathViolation(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    match engine.write_file(WriteFileRequest::new("outdir/planted.txt", "x")) {
        Err(Error::PathViolation(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!outside.path().join("planted.txt").exists());
}

#[test]
#[cfg(unix)]
fn dangling_symlink_to_outside_is_rejected_for_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outside = tempfile::tempdir().expect("outside");
    std::os::unix::fs::symlink(outside.path().join("later.txt"), dir.path().join("later"))
        .expect("symlink");
    let engine = test_engine(dir.path());

    match engine.write_file(WriteFileRequest::new("later", "payload")) {
        Err(Error::PathViolation(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!outside.path().join("later.txt").exists());
}

#[test]
#[cfg(unix)]
fn symlinks_inside_root_are_followed() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("real.txt"), "inside").expect("write");
    std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("alias"))
        .expect("symlink");
    let engine = test_engine(dir.path());

    let response = engine.read_file(read("alias")).expect("read");
    assert_eq!(response.content, "inside");
    assert_eq!(response.path, Path::new("real.txt"));
}
