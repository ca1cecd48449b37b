//! Admissibility of evidence bundles.
//!
//! A bundle references its authority, proposal, counterfactual summary, gate
//! results and capability tokens by content hash. Every referenced node is
//! resolved, re-hashed and schema-checked before a verdict is given. Checks
//! run in a fixed order and the first failure wins.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::{
    failures::KernelCrash,
    hashing::{attach_hash, hash_without_self, HASH_FIELD},
};

/// Looks up evidence nodes by content hash.
pub trait NodeResolver {
    fn resolve(&self, hash: &str) -> Option<&Value>;
}

impl NodeResolver for BTreeMap<String, Value> {
    fn resolve(&self, hash: &str) -> Option<&Value> {
        self.get(hash)
    }
}

impl NodeResolver for HashMap<String, Value> {
    fn resolve(&self, hash: &str) -> Option<&Value> {
        self.get(hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefusalMode {
    AuthorityDenied,
    GateFail,
}

impl RefusalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefusalMode::AuthorityDenied => "AUTHORITY_DENIED",
            RefusalMode::GateFail => "GATE_FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Refused {
        mode: RefusalMode,
        /// First failing gate, set for [`RefusalMode::GateFail`].
        failed_gate_id: Option<String>,
    },
}

impl Verdict {
    pub fn is_admissible(&self) -> bool {
        matches!(self, Verdict::Approved)
    }

    pub fn refusal_mode(&self) -> Option<RefusalMode> {
        match self {
            Verdict::Approved => None,
            Verdict::Refused { mode, .. } => Some(*mode),
        }
    }
}

/// Evaluates `bundle` against the nodes reachable through `resolver`.
pub fn evaluate(bundle: &Value, resolver: &dyn NodeResolver) -> Result<Verdict, KernelCrash> {
    match evaluate_inner(bundle, resolver) {
        Ok(verdict) => {
            debug!(?verdict, "Evidence bundle evaluated");
            Ok(verdict)
        }
        Err(crash) => {
            warn!(code = crash.kind.code(), detail = %crash.detail, "Evidence bundle rejected");
            Err(crash)
        }
    }
}

fn evaluate_inner(bundle: &Value, resolver: &dyn NodeResolver) -> Result<Verdict, KernelCrash> {
    let bundle = bundle
        .as_object()
        .ok_or_else(|| KernelCrash::integrity("Evidence bundle must be an object"))?;
    let Some(bundle_hash) = bundle.get(HASH_FIELD) else {
        return Err(KernelCrash::missing("Evidence bundle missing hash"));
    };
    if bundle_hash.as_str() != Some(hash_without_self(bundle).as_str()) {
        return Err(KernelCrash::integrity("Evidence bundle hash mismatch"));
    }

    validate_evidence_bundle(bundle)?;

    let authority = resolve(resolver, &bundle["authority_hash"], "authority")?;
    validate_authority_source(authority)?;
    let authority_denied = authority
        .get("scope")
        .and_then(|scope| scope.get("can_execute"))
        == Some(&Value::Bool(false));

    let proposal = resolve(resolver, &bundle["proposal_hash"], "proposal")?;
    validate_proposal(proposal)?;

    let counterfactual = resolve(resolver, &bundle["counterfactual_hash"], "counterfactual")?;
    validate_counterfactual_summary(counterfactual)?;

    let mut failed_gate_id = None;
    for gate_hash in array_field(bundle, "gate_result_hashes") {
        let gate = resolve(resolver, gate_hash, "gate")?;
        validate_gate_result(gate)?;
        if gate["result"] == "FAIL" && failed_gate_id.is_none() {
            failed_gate_id = gate["gate_id"].as_str().map(str::to_string);
        }
    }

    for cap_hash in array_field(bundle, "capability_hashes") {
        let token = resolve(resolver, cap_hash, "capability token")?;
        validate_capability_token(token)?;
        if token.get("authority_hash") != bundle.get("authority_hash") {
            return Err(KernelCrash::integrity("Capability token authority mismatch"));
        }
    }

    if bundle.get("will_emit_execution_record") != Some(&Value::Bool(true)) {
        return Err(KernelCrash::unlogged("Execution record emission disabled"));
    }

    if authority_denied {
        return Ok(Verdict::Refused {
            mode: RefusalMode::AuthorityDenied,
            failed_gate_id: None,
        });
    }
    if failed_gate_id.is_some() {
        return Ok(Verdict::Refused {
            mode: RefusalMode::GateFail,
            failed_gate_id,
        });
    }
    Ok(Verdict::Approved)
}

/// Builds the hashed execution record emitted for a refused bundle.
pub fn make_refusal_record(
    bundle_hash: &str,
    mode: RefusalMode,
    failed_gate_id: Option<&str>,
) -> Result<Value, KernelCrash> {
    let mut record = json!({
        "type": "ExecutionRecord",
        "version": "1",
        "evidence_bundle_hash": bundle_hash,
        "outcome": "REFUSED",
        "reason": "REFUSAL",
        "refusal_mode": mode.as_str(),
    });
    if mode == RefusalMode::GateFail {
        record["failed_gate_id"] = json!(failed_gate_id);
    }
    let object = record
        .as_object()
        .ok_or_else(|| KernelCrash::integrity("execution record must be an object"))?;
    validate_execution_record(object)?;
    attach_hash(record).map_err(|e| KernelCrash::integrity(e.to_string()))
}

fn resolve<'r>(
    resolver: &'r dyn NodeResolver,
    expected: &Value,
    what: &str,
) -> Result<&'r Map<String, Value>, KernelCrash> {
    let expected = expected
        .as_str()
        .filter(|hash| !hash.is_empty())
        .ok_or_else(|| KernelCrash::missing(format!("Missing hash for {what}")))?;
    let node = resolver
        .resolve(expected)
        .ok_or_else(|| KernelCrash::missing(format!("Missing node for {what}")))?;
    let node = node
        .as_object()
        .ok_or_else(|| KernelCrash::integrity(format!("{what} node must be an object")))?;
    if hash_without_self(node) != expected {
        return Err(KernelCrash::integrity(format!("Hash mismatch for {what}")));
    }
    Ok(node)
}

fn array_field<'a>(object: &'a Map<String, Value>, field: &str) -> &'a [Value] {
    object
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn require_fields(object: &Map<String, Value>, fields: &[&str]) -> Result<(), KernelCrash> {
    match fields.iter().find(|field| !object.contains_key(**field)) {
        Some(field) => Err(KernelCrash::missing(format!("Missing required field: {field}"))),
        None => Ok(()),
    }
}

fn require_type(object: &Map<String, Value>, expected: &str, what: &str) -> Result<(), KernelCrash> {
    if object.get("type").and_then(Value::as_str) != Some(expected) {
        return Err(KernelCrash::integrity(format!("Invalid {what} type")));
    }
    Ok(())
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Number(number)) => number.as_f64() != Some(0.0),
        Some(Value::Bool(true)) => true,
    }
}

pub fn validate_evidence_bundle(object: &Map<String, Value>) -> Result<(), KernelCrash> {
    require_fields(
        object,
        &[
            "type",
            "version",
            "authority_hash",
            "proposal_hash",
            "gate_result_hashes",
            "capability_hashes",
            "counterfactual_hash",
            "will_emit_execution_record",
        ],
    )?;
    require_type(object, "EvidenceBundle", "evidence bundle")?;
    for field in ["gate_result_hashes", "capability_hashes"] {
        if !object[field].is_array() {
            return Err(KernelCrash::integrity(format!("{field} must be list")));
        }
    }
    if !object["will_emit_execution_record"].is_boolean() {
        return Err(KernelCrash::integrity(
            "will_emit_execution_record must be boolean",
        ));
    }
    Ok(())
}

pub fn validate_authority_source(object: &Map<String, Value>) -> Result<(), KernelCrash> {
    require_fields(
        object,
        &["type", "version", "authority_domain", "scope", "mandate"],
    )?;
    require_type(object, "AuthoritySource", "authority source")?;
    if !is_truthy(object.get("authority_domain")) {
        return Err(KernelCrash::integrity("authority_domain must be set"));
    }
    if !is_truthy(object.get("mandate")) {
        return Err(KernelCrash::integrity("mandate must be set"));
    }
    let scope = object["scope"]
        .as_object()
        .ok_or_else(|| KernelCrash::integrity("scope must be dict"))?;
    require_fields(scope, &["can_execute", "can_issue_capabilities"])
        .map_err(|_| KernelCrash::missing("scope missing required flags"))?;
    for flag in ["can_execute", "can_issue_capabilities"] {
        if !scope[flag].is_boolean() {
            return Err(KernelCrash::integrity(format!("scope.{flag} must be bool")));
        }
    }
    Ok(())
}

pub fn validate_proposal(object: &Map<String, Value>) -> Result<(), KernelCrash> {
    require_fields(object, &["type", "version", "proposal_kind"])?;
    require_type(object, "Proposal", "proposal")?;
    if object["proposal_kind"] == "adapter_call" {
        require_fields(
            object,
            &[
                "adapter",
                "intent",
                "inputs",
                "requested_effects",
                "counterfactual_budget",
            ],
        )?;
    }
    Ok(())
}

pub fn validate_gate_result(object: &Map<String, Value>) -> Result<(), KernelCrash> {
    require_fields(
        object,
        &["type", "version", "gate_id", "result", "deterministic"],
    )?;
    require_type(object, "GateResult", "gate result")?;
    if !matches!(object["result"].as_str(), Some("PASS") | Some("FAIL")) {
        return Err(KernelCrash::determinism("Gate result must be PASS or FAIL"));
    }
    if object["deterministic"] != Value::Bool(true) {
        return Err(KernelCrash::determinism("Gate must be deterministic"));
    }
    Ok(())
}

pub fn validate_capability_token(object: &Map<String, Value>) -> Result<(), KernelCrash> {
    require_fields(
        object,
        &[
            "type",
            "version",
            "authority_hash",
            "decay_only",
            "limits",
            "scopes",
        ],
    )?;
    require_type(object, "CapabilityToken", "capability token")?;
    if !object["authority_hash"].is_string() {
        return Err(KernelCrash::integrity("authority_hash must be str"));
    }
    match object["decay_only"] {
        Value::Bool(true) => {}
        Value::Bool(false) => return Err(KernelCrash::integrity("decay_only must be True")),
        _ => return Err(KernelCrash::integrity("decay_only must be bool")),
    }

    let limits = object["limits"]
        .as_object()
        .ok_or_else(|| KernelCrash::integrity("limits must be dict"))?;
    require_fields(limits, &["expires_at", "max_calls"])
        .map_err(|_| KernelCrash::missing("limits missing required fields"))?;
    if !limits["expires_at"].is_string() {
        return Err(KernelCrash::integrity("limits.expires_at must be str"));
    }
    let max_calls = limits["max_calls"]
        .as_i64()
        .ok_or_else(|| KernelCrash::integrity("limits.max_calls must be int"))?;
    if max_calls < 1 {
        return Err(KernelCrash::integrity("limits.max_calls must be >= 1"));
    }

    let scopes = object["scopes"]
        .as_array()
        .ok_or_else(|| KernelCrash::integrity("scopes must be list"))?;
    if scopes.is_empty() {
        return Err(KernelCrash::integrity("scopes must be non-empty"));
    }
    if scopes.iter().any(|scope| !scope.is_string()) {
        return Err(KernelCrash::integrity("scopes[] must be str"));
    }
    Ok(())
}

pub fn validate_counterfactual_summary(object: &Map<String, Value>) -> Result<(), KernelCrash> {
    require_fields(
        object,
        &[
            "type",
            "version",
            "budget",
            "rejected",
            "unlisted_commitment",
        ],
    )?;
    require_type(object, "CounterfactualSummary", "counterfactual summary")?;
    let budget = object["budget"]
        .as_i64()
        .ok_or_else(|| KernelCrash::integrity("budget must be int"))?;
    if budget < 0 {
        return Err(KernelCrash::integrity("budget must be non-negative"));
    }
    let rejected = object["rejected"]
        .as_array()
        .ok_or_else(|| KernelCrash::integrity("rejected must be list"))?;
    if rejected.len() as i64 > budget {
        return Err(KernelCrash::integrity("rejected count exceeds budget"));
    }
    for item in rejected {
        let item = item
            .as_object()
            .ok_or_else(|| KernelCrash::integrity("rejected[] must be dict"))?;
        require_fields(item, &["alt", "reason"])?;
        if !item["alt"].is_string() {
            return Err(KernelCrash::integrity("rejected[].alt must be str"));
        }
        if !item["reason"].is_string() {
            return Err(KernelCrash::integrity("rejected[].reason must be str"));
        }
    }
    if !object["unlisted_commitment"].is_string() {
        return Err(KernelCrash::integrity("unlisted_commitment must be str"));
    }
    Ok(())
}

pub fn validate_execution_record(object: &Map<String, Value>) -> Result<(), KernelCrash> {
    require_fields(
        object,
        &[
            "type",
            "version",
            "evidence_bundle_hash",
            "outcome",
            "reason",
            "refusal_mode",
        ],
    )?;
    require_type(object, "ExecutionRecord", "execution record")?;
    match object["refusal_mode"].as_str() {
        Some("AUTHORITY_DENIED") => Ok(()),
        Some("GATE_FAIL") => {
            require_fields(object, &["failed_gate_id"])?;
            if !is_truthy(object.get("failed_gate_id")) {
                return Err(KernelCrash::integrity(
                    "failed_gate_id required for GATE_FAIL",
                ));
            }
            Ok(())
        }
        _ => Err(KernelCrash::integrity("Invalid refusal_mode")),
    }
}
