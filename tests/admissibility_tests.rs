//! Admissibility evaluation against hashed evidence graphs

use detplan::internal::kernel::{
    admissibility::{evaluate, make_refusal_record, RefusalMode, Verdict},
    failures::CrashKind,
    hashing::{attach_hash, hash_without_self},
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

struct Graph {
    nodes: BTreeMap<String, Value>,
    authority: Value,
    gates: Vec<Value>,
    token: Value,
    proposal: Value,
    counterfactual: Value,
}

fn sealed(value: Value) -> Value {
    attach_hash(value).unwrap()
}

fn hash_of(node: &Value) -> String {
    node["hash"].as_str().unwrap().to_string()
}

fn graph(can_execute: bool) -> Graph {
    let authority = sealed(json!({
        "type": "AuthoritySource",
        "version": "1",
        "authority_domain": "local_operator",
        "mandate": "Refusal-only dry run",
        "scope": {"can_execute": can_execute, "can_issue_capabilities": false},
    }));
    let proposal = sealed(json!({
        "type": "Proposal",
        "version": "1",
        "proposal_kind": "adapter_call",
        "adapter": "echo",
        "intent": "refusal_demo",
        "inputs": {"message": "refuse"},
        "requested_effects": ["log_refusal"],
        "counterfactual_budget": 3,
    }));
    let gates: Vec<Value> = ["success-justification", "capability-alignment", "determinism-check"]
        .iter()
        .map(|gate_id| {
            sealed(json!({
                "type": "GateResult",
                "version": "1",
                "gate_id": gate_id,
                "result": "PASS",
                "deterministic": true,
                "detail": "ok",
            }))
        })
        .collect();
    let token = sealed(json!({
        "type": "CapabilityToken",
        "version": "1",
        "authority_hash": hash_of(&authority),
        "scopes": ["call_adapter:echo"],
        "decay_only": true,
        "limits": {"expires_at": "2026-01-01T00:00:00Z", "max_calls": 1},
    }));
    let counterfactual = sealed(json!({
        "type": "CounterfactualSummary",
        "version": "1",
        "budget": 3,
        "rejected": [
            {"alt": "do_nothing", "reason": "fails_success_necessity"},
            {"alt": "delegate", "reason": "off-policy"},
        ],
        "unlisted_commitment": "no-other-branches",
    }));

    let mut nodes = BTreeMap::new();
    for node in [&authority, &proposal, &token, &counterfactual]
        .into_iter()
        .chain(gates.iter())
    {
        nodes.insert(hash_of(node), node.clone());
    }

    Graph {
        nodes,
        authority,
        gates,
        token,
        proposal,
        counterfactual,
    }
}

fn bundle(graph: &Graph, will_emit: bool) -> Value {
    sealed(json!({
        "type": "EvidenceBundle",
        "version": "1",
        "authority_hash": hash_of(&graph.authority),
        "proposal_hash": hash_of(&graph.proposal),
        "gate_result_hashes": graph.gates.iter().map(hash_of).collect::<Vec<_>>(),
        "capability_hashes": [hash_of(&graph.token)],
        "counterfactual_hash": hash_of(&graph.counterfactual),
        "will_emit_execution_record": will_emit,
    }))
}

fn crash_kind(result: Result<Verdict, detplan::internal::kernel::failures::KernelCrash>) -> CrashKind {
    result.unwrap_err().kind
}

#[test]
fn test_reference_vector_is_refused_for_authority() {
    let g = graph(false);
    let verdict = evaluate(&bundle(&g, true), &g.nodes).unwrap();
    assert_eq!(verdict.refusal_mode(), Some(RefusalMode::AuthorityDenied));
    assert!(!verdict.is_admissible());
}

#[test]
fn test_executing_authority_is_approved() {
    let g = graph(true);
    assert_eq!(evaluate(&bundle(&g, true), &g.nodes).unwrap(), Verdict::Approved);
}

#[test]
fn test_hashmap_resolver_supported() {
    let g = graph(true);
    let nodes: HashMap<String, Value> = g.nodes.clone().into_iter().collect();
    assert!(evaluate(&bundle(&g, true), &nodes).unwrap().is_admissible());
}

#[test]
fn test_failing_gate_refuses_with_gate_id() {
    let mut g = graph(true);
    let failing = sealed(json!({
        "type": "GateResult",
        "version": "1",
        "gate_id": "capability-alignment",
        "result": "FAIL",
        "deterministic": true,
    }));
    g.nodes.insert(hash_of(&failing), failing.clone());
    g.gates[1] = failing;

    let verdict = evaluate(&bundle(&g, true), &g.nodes).unwrap();
    assert_eq!(
        verdict,
        Verdict::Refused {
            mode: RefusalMode::GateFail,
            failed_gate_id: Some("capability-alignment".to_string()),
        }
    );
}

#[test]
fn test_tampered_node_is_integrity_violation() {
    let g = graph(true);
    let mut nodes = g.nodes.clone();
    let key = hash_of(&g.proposal);
    nodes.get_mut(&key).unwrap()["intent"] = json!("something_else");

    assert_eq!(
        crash_kind(evaluate(&bundle(&g, true), &nodes)),
        CrashKind::IntegrityViolation
    );
}

#[test]
fn test_tampered_bundle_is_integrity_violation() {
    let g = graph(true);
    let mut tampered = bundle(&g, true);
    tampered["version"] = json!("2");
    assert_eq!(
        crash_kind(evaluate(&tampered, &g.nodes)),
        CrashKind::IntegrityViolation
    );
}

#[test]
fn test_missing_node_is_evidence_missing() {
    let g = graph(true);
    let mut nodes = g.nodes.clone();
    nodes.remove(&hash_of(&g.counterfactual));
    assert_eq!(
        crash_kind(evaluate(&bundle(&g, true), &nodes)),
        CrashKind::EvidenceMissing
    );
}

#[test]
fn test_unhashed_bundle_is_evidence_missing() {
    let g = graph(true);
    let mut unhashed = bundle(&g, true);
    unhashed.as_object_mut().unwrap().remove("hash");
    assert_eq!(
        crash_kind(evaluate(&unhashed, &g.nodes)),
        CrashKind::EvidenceMissing
    );
}

#[test]
fn test_disabled_execution_record_is_unlogged() {
    let g = graph(true);
    assert_eq!(
        crash_kind(evaluate(&bundle(&g, false), &g.nodes)),
        CrashKind::UnloggedExecution
    );
}

#[test]
fn test_nondeterministic_gate_is_determinism_breach() {
    let mut g = graph(true);
    let flaky = sealed(json!({
        "type": "GateResult",
        "version": "1",
        "gate_id": "flaky",
        "result": "PASS",
        "deterministic": false,
    }));
    g.nodes.insert(hash_of(&flaky), flaky.clone());
    g.gates.push(flaky);
    assert_eq!(
        crash_kind(evaluate(&bundle(&g, true), &g.nodes)),
        CrashKind::DeterminismBreach
    );
}

#[test]
fn test_foreign_capability_token_is_integrity_violation() {
    let mut g = graph(true);
    let foreign = sealed(json!({
        "type": "CapabilityToken",
        "version": "1",
        "authority_hash": "f".repeat(64),
        "scopes": ["call_adapter:echo"],
        "decay_only": true,
        "limits": {"expires_at": "2026-01-01T00:00:00Z", "max_calls": 1},
    }));
    g.nodes.insert(hash_of(&foreign), foreign.clone());
    g.token = foreign;
    assert_eq!(
        crash_kind(evaluate(&bundle(&g, true), &g.nodes)),
        CrashKind::IntegrityViolation
    );
}

#[test]
fn test_first_failing_check_wins() {
    // Missing authority is detected before the disabled execution record.
    let g = graph(true);
    let mut nodes = g.nodes.clone();
    nodes.remove(&hash_of(&g.authority));
    assert_eq!(
        crash_kind(evaluate(&bundle(&g, false), &nodes)),
        CrashKind::EvidenceMissing
    );
}

#[test]
fn test_refusal_record_is_self_hashed() {
    let record = make_refusal_record(&"a".repeat(64), RefusalMode::GateFail, Some("gate-1")).unwrap();
    assert_eq!(record["refusal_mode"], json!("GATE_FAIL"));
    assert_eq!(record["failed_gate_id"], json!("gate-1"));
    let body = record.as_object().unwrap();
    assert_eq!(record["hash"], json!(hash_without_self(body)));

    let err = make_refusal_record(&"a".repeat(64), RefusalMode::GateFail, None).unwrap_err();
    assert_eq!(err.kind, CrashKind::IntegrityViolation);

    let authority = make_refusal_record(&"a".repeat(64), RefusalMode::AuthorityDenied, None).unwrap();
    assert!(authority.get("failed_gate_id").is_none());
}
