//! Tests for sandbox path resolution

use detplan::internal::kernel::sandbox::{resolve, SandboxViolation};
use std::{fs, path::Path};
use tempfile::tempdir;

#[test]
fn test_relative_path_resolves_under_base() {
    let home = tempdir().unwrap();
    fs::create_dir(home.path().join("actions")).unwrap();

    let resolved = resolve(home.path(), Path::new("actions")).unwrap();
    assert_eq!(resolved, fs::canonicalize(home.path()).unwrap().join("actions"));
}

#[test]
fn test_missing_segments_are_allowed() {
    let home = tempdir().unwrap();
    let resolved = resolve(home.path(), Path::new(".detplan/ledger/events.jsonl")).unwrap();
    assert!(resolved.starts_with(fs::canonicalize(home.path()).unwrap()));
    assert!(resolved.ends_with("events.jsonl"));
}

#[test]
fn test_base_itself_is_allowed() {
    let home = tempdir().unwrap();
    let resolved = resolve(home.path(), Path::new(".")).unwrap();
    assert_eq!(resolved, fs::canonicalize(home.path()).unwrap());
}

#[test]
fn test_parent_traversal_rejected_even_when_it_lands_inside() {
    let home = tempdir().unwrap();
    fs::create_dir(home.path().join("a")).unwrap();
    let err = resolve(home.path(), Path::new("a/../a")).unwrap_err();
    assert!(matches!(err, SandboxViolation::ParentTraversal { .. }));
}

#[test]
fn test_absolute_path_outside_base_rejected() {
    let home = tempdir().unwrap();
    let other = tempdir().unwrap();
    let err = resolve(home.path(), other.path()).unwrap_err();
    assert!(matches!(err, SandboxViolation::OutsideBase { .. }));
}

#[test]
fn test_absolute_path_inside_base_accepted() {
    let home = tempdir().unwrap();
    let canonical = fs::canonicalize(home.path()).unwrap();
    let resolved = resolve(home.path(), &canonical.join("logs")).unwrap();
    assert_eq!(resolved, canonical.join("logs"));
}

#[test]
fn test_missing_base_reported() {
    let home = tempdir().unwrap();
    let missing = home.path().join("nope");
    let err = resolve(&missing, Path::new("actions")).unwrap_err();
    assert!(matches!(err, SandboxViolation::BaseUnavailable { .. }));
}

#[cfg(unix)]
#[test]
fn test_symlinked_directory_rejected() {
    let home = tempdir().unwrap();
    let outside = tempdir().unwrap();
    std::os::unix::fs::symlink(outside.path(), home.path().join("actions")).unwrap();

    let err = resolve(home.path(), Path::new("actions/custom.json")).unwrap_err();
    assert!(matches!(err, SandboxViolation::SymlinkInPath { .. }));
}
