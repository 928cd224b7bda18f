mod common;

use std::path::{Path, PathBuf};

use fs_relay::Error;
use fs_relay::ops::{Engine, ScanLimitReason, SearchRequest};

use common::{test_engine, test_policy};

fn search(pattern: &str) -> SearchRequest {
    SearchRequest {
        path: ".".into(),
        pattern: pattern.to_string(),
        ..SearchRequest::default()
    }
}

fn seed(root: &Path) {
    std::fs::create_dir_all(root.join("docs/deep")).expect("mkdir");
    std::fs::write(root.join("Report.md"), "quarterly numbers").expect("write");
    std::fs::write(root.join("docs/notes.txt"), "the REPORT is late").expect("write");
    std::fs::write(root.join("docs/deep/report-final.md"), "done").expect("write");
    std::fs::write(root.join("docs/blob.bin"), [0xff, 0xfe, 0x00, 0x72]).expect("write");
}

fn matched_paths(engine: &Engine, request: SearchRequest) -> Vec<PathBuf> {
    engine
        .search(request)
        .expect("search")
        .results
        .into_iter()
        .map(|found| found.path)
        .collect()
}

#[test]
fn filename_search_ignores_case_by_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed(dir.path());
    let engine = test_engine(dir.path());

    let mut paths = matched_paths(&engine, search("report"));
    paths.sort();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("Report.md"),
            PathBuf::from("docs/deep/report-final.md"),
        ]
    );

    let sensitive = SearchRequest {
        case_sensitive: true,
        ..search("Report")
    };
    assert_eq!(
        matched_paths(&engine, sensitive),
        vec![PathBuf::from("Report.md")]
    );
}

#[test]
fn content_search_counts_undecodable_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed(dir.path());
    let engine = test_engine(dir.path());

    let response = engine
        .search(SearchRequest {
            content_search: true,
            ..search("report")
        })
        .expect("search");
    let notes = response
        .results
        .iter()
        .find(|found| found.path == Path::new("docs/notes.txt"))
        .expect("content match");
    assert!(notes.content_match);
    assert!(!notes.filename_match);
    assert_eq!(response.total_matches, 3);
    assert_eq!(response.skipped_undecodable_files, 1);
    assert_eq!(response.scanned_files, 4);
    assert!(!response.truncated);
}

#[test]
fn oversized_files_are_skipped_for_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut policy = test_policy(dir.path());
    policy.limits.max_file_size = 8;
    let engine = Engine::new(policy).expect("engine");
    std::fs::write(dir.path().join("big.txt"), "needle in a big haystack").expect("write");

    let response = engine
        .search(SearchRequest {
            content_search: true,
            ..search("needle")
        })
        .expect("search");
    assert_eq!(response.total_matches, 0);
    assert_eq!(response.skipped_too_large_files, 1);
}

#[test]
fn max_results_truncates() {
    let dir = tempfile::tempdir().expect("tempdir");
    for index in 0..5 {
        std::fs::write(dir.path().join(format!("hit-{index}.txt")), "x").expect("write");
    }
    let engine = test_engine(dir.path());

    let response = engine
        .search(SearchRequest {
            max_results: Some(2),
            ..search("hit")
        })
        .expect("search");
    assert_eq!(response.results.len(), 2);
    assert!(response.truncated);
    assert_eq!(response.scan_limit_reason, Some(ScanLimitReason::Results));
}

#[test]
fn invalid_requests_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("file.txt"), "x").expect("write");
    let engine = test_engine(dir.path());

    match engine.search(search("")) {
        Err(Error::InvalidArgument(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    match engine.search(SearchRequest {
        path: "file.txt".into(),
        ..search("x")
    }) {
        Err(Error::NotADirectory(path)) => assert_eq!(path, Path::new("file.txt")),
        other => panic!("unexpected result: {other:?}"),
    }
    match engine.search(SearchRequest {
        path: "missing".into(),
        ..search("x")
    }) {
        Err(Error::NotFound { .. }) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
#[cfg(unix)]
fn symlinked_directories_are_not_followed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outside = tempfile::tempdir().expect("outside");
    std::fs::write(outside.path().join("secret-plan.txt"), "x").expect("write");
    std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).expect("symlink");
    let engine = test_engine(dir.path());

    let response = engine.search(search("secret")).expect("search");
    assert_eq!(response.total_matches, 0);
}
