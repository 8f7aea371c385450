/// End-to-end CLI tests: parse real argument lists and run complete ingests
/// against temporary directories and manifests.
use clap::Parser;
use ingestsleuth_cli::modules::FileCategory;
use ingestsleuth_cli::{run, Args};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// ```text
/// root/
///   Users/bob/photo.JPG
///   Users/bob/notes.txt
///   Windows/System32/kernel32.dll
/// ```
fn build_test_tree(root: &Path) {
    let bob = root.join("Users").join("bob");
    let sys = root.join("Windows").join("System32");
    fs::create_dir_all(&bob).unwrap();
    fs::create_dir_all(&sys).unwrap();
    fs::write(bob.join("photo.JPG"), b"\xff\xd8").unwrap();
    fs::write(bob.join("notes.txt"), b"notes").unwrap();
    fs::write(sys.join("kernel32.dll"), b"MZ").unwrap();
}

fn args(list: &[&str]) -> Args {
    let mut argv = vec!["ingestsleuth"];
    argv.extend_from_slice(list);
    Args::try_parse_from(argv).unwrap()
}

fn count(summary: &[(FileCategory, u64)], category: FileCategory) -> u64 {
    summary
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, n)| *n)
        .unwrap_or(0)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn test_directory_ingest_with_report() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("evidence");
    build_test_tree(&src);
    let report = tmp.path().join("out.csv");

    let summary = run(&args(&[
        src.to_str().unwrap(),
        "--csv",
        report.to_str().unwrap(),
        "-w",
        "2",
    ]))
    .unwrap();

    // Users, bob, photo.JPG, notes.txt, Windows, System32, kernel32.dll
    assert_eq!(summary.files_dispatched, 7);
    assert_eq!(summary.images_dispatched, 1);
    assert_eq!(summary.failure_count, 0);
    assert!(!summary.cancelled);
    assert_eq!(count(&summary.file_types, FileCategory::Images), 1);
    assert_eq!(count(&summary.file_types, FileCategory::Documents), 1);
    assert_eq!(count(&summary.file_types, FileCategory::Executables), 1);
    assert_eq!(summary.indexed_names, 7);

    let text = fs::read_to_string(&report).unwrap();
    // Header, one image row, seven file rows.
    assert_eq!(text.lines().count(), 9);
    assert!(text.contains("photo.JPG"));
}

#[test]
fn test_manifest_ingest_without_image_modules() {
    let tmp = TempDir::new().unwrap();
    let manifest = tmp.path().join("usb.json");
    fs::write(
        &manifest,
        r#"{
            "name": "usb.dd",
            "kind": "image",
            "children": [
                { "name": "fs0", "kind": "file_system", "fs_type": "fat32", "children": [
                    { "name": "/", "kind": "directory", "children": [
                        { "name": "DCIM", "kind": "directory", "children": [
                            { "name": "IMG_0001.heic", "kind": "file" }
                        ]}
                    ]}
                ]},
                { "name": "Unalloc_1", "kind": "layout_file" }
            ]
        }"#,
    )
    .unwrap();

    let summary = run(&args(&[
        "--manifest",
        manifest.to_str().unwrap(),
        "--image-modules",
        "",
        "--modules",
        "file-types",
        "--process-unallocated",
    ]))
    .unwrap();

    assert_eq!(summary.images_dispatched, 0);
    // DCIM, IMG_0001.heic, Unalloc_1
    assert_eq!(summary.files_dispatched, 3);
    assert_eq!(count(&summary.file_types, FileCategory::Images), 1);
    assert_eq!(count(&summary.file_types, FileCategory::Other), 1);
    assert_eq!(summary.indexed_names, 0);
}

#[test]
fn test_unknown_module_is_an_error() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());
    let err = run(&args(&[tmp.path().to_str().unwrap(), "--modules", "hash"])).unwrap_err();
    assert!(err.to_string().contains("unknown file module"));
}

#[test]
fn test_missing_source_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope");
    let err = run(&args(&[missing.to_str().unwrap()])).unwrap_err();
    assert!(format!("{err:#}").contains("importing directory"));
}

#[test]
fn test_config_file_applies() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("evidence");
    build_test_tree(&src);

    let bad = tmp.path().join("bad.json");
    fs::write(&bad, r#"{ "workers": 0 }"#).unwrap();
    let err = run(&args(&[src.to_str().unwrap(), "--config", bad.to_str().unwrap()]))
        .unwrap_err();
    assert!(format!("{err:#}").contains("workers must be at least 1"));

    let good = tmp.path().join("good.json");
    fs::write(
        &good,
        r#"{ "workers": 1, "progress_interval": 1,
             "priority_rules": [ { "prefix": "windows", "tier": "high" } ] }"#,
    )
    .unwrap();
    let summary = run(&args(&[src.to_str().unwrap(), "--config", good.to_str().unwrap()]))
        .unwrap();
    assert_eq!(summary.files_dispatched, 7);
}
