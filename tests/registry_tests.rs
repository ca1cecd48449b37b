//! Tests for action discovery and catalog construction

use detplan::internal::{
    actions::{builtin::builtin_action_names, manifest::ContractViolation, spec::ActionOrigin},
    config::Config,
    kernel::sandbox::SandboxViolation,
    registry::{discover, ActionCatalog, RegistryError},
};
use serde_json::{json, Value};
use std::{fs, path::Path};
use tempfile::{tempdir, TempDir};

fn workspace() -> (TempDir, Config) {
    let home = tempdir().unwrap();
    let config = Config {
        home: home.path().to_path_buf(),
        ..Config::default()
    };
    (home, config)
}

fn capabilities() -> Value {
    json!({
        "validate": {"args": ["params", "config"]},
        "run": {"args": ["validated"]},
        "postcheck": {"args": ["result", "config"]},
    })
}

fn write_manifest(dir: &Path, file: &str, manifest: Value) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(file), serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
}

#[test]
fn test_missing_actions_dir_yields_builtins_only() {
    let (_home, config) = workspace();
    let catalog = discover(&config).unwrap();
    assert_eq!(catalog.names(), builtin_action_names());
    assert!(catalog
        .iter()
        .all(|action| *action.origin() == ActionOrigin::BuiltIn));
}

#[test]
fn test_builtin_order_is_fixed() {
    let catalog = ActionCatalog::builtin().unwrap();
    assert_eq!(
        catalog.names(),
        vec![
            "scan_repo_tree",
            "scan_risks",
            "generate_patch",
            "mutate_code",
            "run_tests",
            "summarize_results",
            "write_report",
            "record_ledger",
        ]
    );
}

#[test]
fn test_file_actions_follow_builtins_sorted_by_filename() {
    let (home, config) = workspace();
    let actions = home.path().join("actions");
    write_manifest(&actions, "zeta.json", json!({"capabilities": capabilities()}));
    write_manifest(&actions, "alpha.json", json!({"capabilities": capabilities()}));
    write_manifest(&actions, "__init__.json", json!({"capabilities": capabilities()}));
    write_manifest(&actions, ".hidden.json", json!({"capabilities": capabilities()}));
    fs::write(actions.join("notes.txt"), "ignored").unwrap();

    let catalog = discover(&config).unwrap();
    let names = catalog.names();
    let builtin_count = builtin_action_names().len();
    assert_eq!(names.len(), builtin_count + 2);
    assert_eq!(&names[builtin_count..], &["alpha", "zeta"]);
    assert_eq!(
        catalog.get("alpha").unwrap().origin(),
        &ActionOrigin::File(fs::canonicalize(&actions).unwrap().join("alpha.json"))
    );
}

#[test]
fn test_duplicate_of_builtin_rejected() {
    let (home, config) = workspace();
    write_manifest(
        &home.path().join("actions"),
        "custom.json",
        json!({"name": "scan_risks", "capabilities": capabilities()}),
    );

    let err = discover(&config).unwrap_err();
    match err {
        RegistryError::DuplicateActionName { name, first, .. } => {
            assert_eq!(name, "scan_risks");
            assert_eq!(first, ActionOrigin::BuiltIn);
        }
        other => panic!("expected DuplicateActionName, got {other:?}"),
    }
}

#[test]
fn test_duplicate_between_files_rejected() {
    let (home, config) = workspace();
    let actions = home.path().join("actions");
    write_manifest(&actions, "a.json", json!({"name": "lint", "capabilities": capabilities()}));
    write_manifest(&actions, "b.json", json!({"name": "lint", "capabilities": capabilities()}));

    assert!(matches!(
        discover(&config),
        Err(RegistryError::DuplicateActionName { .. })
    ));
}

#[test]
fn test_contract_violation_aborts_discovery() {
    let (home, config) = workspace();
    let actions = home.path().join("actions");
    write_manifest(&actions, "a_good.json", json!({"capabilities": capabilities()}));
    write_manifest(
        &actions,
        "b_bad.json",
        json!({"capabilities": {
            "validate": {"args": ["params", "config"]},
            "run": {"args": ["validated"]},
        }}),
    );

    let err = discover(&config).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Contract(ContractViolation::MissingCapability { capability: "postcheck", .. })
    ));
}

#[test]
fn test_extra_capability_rejected() {
    let (home, config) = workspace();
    let mut caps = capabilities();
    caps["teardown"] = json!({"args": []});
    write_manifest(&home.path().join("actions"), "extra.json", json!({"capabilities": caps}));

    assert!(matches!(
        discover(&config),
        Err(RegistryError::Contract(ContractViolation::UnexpectedCapability { .. }))
    ));
}

#[test]
fn test_malformed_manifest_rejected() {
    let (home, config) = workspace();
    let actions = home.path().join("actions");
    fs::create_dir_all(&actions).unwrap();
    fs::write(actions.join("broken.json"), "{not json").unwrap();

    assert!(matches!(
        discover(&config),
        Err(RegistryError::Contract(ContractViolation::Malformed { .. }))
    ));
}

#[test]
fn test_actions_dir_outside_home_rejected() {
    let (_home, mut config) = workspace();
    config.actions_dir = "../elsewhere".into();
    assert!(matches!(
        discover(&config),
        Err(RegistryError::Sandbox(SandboxViolation::ParentTraversal { .. }))
    ));
}

#[cfg(unix)]
#[test]
fn test_symlinked_action_file_rejected() {
    let (home, config) = workspace();
    let actions = home.path().join("actions");
    write_manifest(&actions, "real.json", json!({"capabilities": capabilities()}));

    let outside = tempdir().unwrap();
    write_manifest(outside.path(), "evil.json", json!({"capabilities": capabilities()}));
    std::os::unix::fs::symlink(outside.path().join("evil.json"), actions.join("linked.json")).unwrap();

    let err = discover(&config).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Sandbox(SandboxViolation::SymlinkInPath { .. })
    ));
}

#[cfg(unix)]
#[test]
fn test_symlinked_actions_dir_rejected() {
    let (home, config) = workspace();
    let outside = tempdir().unwrap();
    write_manifest(outside.path(), "evil.json", json!({"capabilities": capabilities()}));
    std::os::unix::fs::symlink(outside.path(), home.path().join("actions")).unwrap();

    assert!(matches!(
        discover(&config),
        Err(RegistryError::Sandbox(SandboxViolation::SymlinkInPath { .. }))
    ));
}

#[test]
fn test_discovery_is_repeatable() {
    let (home, config) = workspace();
    write_manifest(
        &home.path().join("actions"),
        "lint.json",
        json!({"keywords": ["lint"], "cost_hint": 0.1, "capabilities": capabilities()}),
    );

    let first = discover(&config).unwrap();
    let second = discover(&config).unwrap();
    assert_eq!(first.names(), second.names());
    assert_eq!(
        first.get("lint").unwrap().profile(),
        second.get("lint").unwrap().profile()
    );
}

#[cfg(unix)]
#[test]
fn test_fifo_named_like_a_manifest_is_skipped() {
    use nix::{sys::stat::Mode, unistd::mkfifo};

    let (home, config) = workspace();
    let actions = home.path().join("actions");
    write_manifest(&actions, "real.json", json!({"capabilities": capabilities()}));
    mkfifo(&actions.join("pipe.json"), Mode::S_IRWXU).unwrap();

    // Would block forever if the pipe were opened for reading.
    let catalog = discover(&config).unwrap();
    assert!(catalog.contains("real"));
    assert!(!catalog.contains("pipe"));
    assert_eq!(catalog.len(), builtin_action_names().len() + 1);
}
