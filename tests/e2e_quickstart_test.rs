//! End-to-end quickstart: discover, plan, execute built-ins, record provenance

use detplan::internal::{
    config::{Config, ResourceTier},
    kernel::{
        context::{FixedRunId, KernelContext},
        failures::ensure_replay_identical,
        hashing::{canonical_json, hash_object},
    },
    plan::{clock::SteppingClock, planner::Planner},
    provenance::ledger::{AppendOutcome, Ledger},
    registry::discover,
};
use serde_json::{json, Value};
use tempfile::tempdir;

#[test]
fn test_e2e_quickstart() {
    let home = tempdir().unwrap();
    let config = Config {
        home: home.path().to_path_buf(),
        resource_tier: ResourceTier::Mobile,
        ledger_enabled: true,
        ..Config::default()
    };

    let catalog = discover(&config).unwrap();
    let planner = Planner::new().with_clock(SteppingClock::frozen());
    let plan = planner
        .plan("Scan risks and write a report", &config, &catalog)
        .unwrap();
    assert_eq!(plan.steps.len(), 4);

    let replay = planner
        .plan("Scan risks and write a report", &config, &catalog)
        .unwrap();
    ensure_replay_identical(
        canonical_json(&plan).unwrap().as_bytes(),
        canonical_json(&replay).unwrap().as_bytes(),
    )
    .unwrap();

    let mut results: Vec<Value> = Vec::new();
    for step in &plan.steps {
        let action = catalog.get(&step.action).unwrap();
        let validated = action.validate(&step.params, &config).unwrap();
        let output = action.run(validated).unwrap();
        results.push(action.postcheck(output, &config).unwrap());
    }
    assert_eq!(results[2]["summary"], json!("# Summary"));
    assert_eq!(results[3]["destination"], json!("report.txt"));

    let context = KernelContext::build_with(&config, &FixedRunId("quickstart".into()))
        .unwrap()
        .register_artifact("plan", "file:///plan.json")
        .unwrap();

    let mut ledger = Ledger::open(&config).unwrap();
    assert_eq!(Some(ledger.path()), context.workspace().ledger_path.clone());

    let outcome = ledger
        .append_next(json!({
            "run_id": context.run_id(),
            "config_hash": context.config().hash(),
            "plan_hash": hash_object(&plan).unwrap(),
            "steps": plan.actions(),
        }))
        .unwrap();
    assert!(matches!(outcome, AppendOutcome::Appended(_)));
    assert_eq!(ledger.verify().unwrap(), 1);
}

#[test]
fn test_e2e_mobile_skips_tests_and_refuses_mutation() {
    let home = tempdir().unwrap();
    let config = Config {
        home: home.path().to_path_buf(),
        ..Config::default()
    };
    let catalog = discover(&config).unwrap();

    let run_tests = catalog.get("run_tests").unwrap();
    let validated = run_tests.validate(&run_tests.profile().defaults, &config).unwrap();
    let result = run_tests
        .postcheck(run_tests.run(validated).unwrap(), &config)
        .unwrap();
    assert_eq!(result["skipped"], json!(true));
    assert_eq!(result["reason"], json!("resource_tier=mobile"));

    let mutate = catalog.get("mutate_code").unwrap();
    assert!(mutate.validate(&mutate.profile().defaults, &config).is_err());
}
