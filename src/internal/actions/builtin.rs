//! Built-in actions, registered before anything from the actions directory.
//!
//! Each handler is pure. `run` computes the request an external executor would
//! carry out rather than touching the filesystem or spawning processes.

use serde_json::{json, Value};
use std::{
    path::{Component, Path},
    sync::Arc,
};

use super::spec::{ActionContract, ActionDescriptor, ActionError, ActionOrigin, ActionProfile, Params};
use crate::internal::config::{Config, ResourceTier};

type ValidateFn = fn(&Params, &Config) -> Result<Value, ActionError>;
type RunFn = fn(Value) -> Result<Value, ActionError>;
type PostcheckFn = fn(Value, &Config) -> Result<Value, ActionError>;

pub struct BuiltinSpec {
    pub name: &'static str,
    pub cost_hint: Option<f64>,
    pub preconditions: &'static [&'static str],
    pub effects: &'static [&'static str],
    pub keywords: &'static [&'static str],
    defaults: fn() -> Params,
    validate: ValidateFn,
    run: RunFn,
    postcheck: PostcheckFn,
}

/// Fixed registration order of the built-ins.
pub const BUILTIN_ACTIONS: &[BuiltinSpec] = &[
    BuiltinSpec {
        name: "scan_repo_tree",
        cost_hint: Some(0.2),
        preconditions: &[],
        effects: &["tree_scanned"],
        keywords: &["scan", "repo", "repository", "tree", "files"],
        defaults: scan_repo_tree::defaults,
        validate: scan_repo_tree::validate,
        run: scan_repo_tree::run,
        postcheck: scan_repo_tree::postcheck,
    },
    BuiltinSpec {
        name: "scan_risks",
        cost_hint: Some(0.1),
        preconditions: &["tree_scanned"],
        effects: &["risks_scanned"],
        keywords: &["risk", "risks", "audit", "security"],
        defaults: scan_risks::defaults,
        validate: scan_risks::validate,
        run: scan_risks::run,
        postcheck: scan_risks::postcheck,
    },
    BuiltinSpec {
        name: "generate_patch",
        cost_hint: Some(0.6),
        preconditions: &["risks_scanned"],
        effects: &["patch_ready"],
        keywords: &["patch", "fix", "diff"],
        defaults: generate_patch::defaults,
        validate: generate_patch::validate,
        run: generate_patch::run,
        postcheck: generate_patch::postcheck,
    },
    BuiltinSpec {
        name: "mutate_code",
        cost_hint: None,
        preconditions: &["patch_ready"],
        effects: &["code_mutated"],
        keywords: &["mutate", "mutation", "evolve"],
        defaults: mutate_code::defaults,
        validate: mutate_code::validate,
        run: mutate_code::run,
        postcheck: mutate_code::postcheck,
    },
    BuiltinSpec {
        name: "run_tests",
        cost_hint: Some(2.5),
        preconditions: &["patch_ready"],
        effects: &["tests_run"],
        keywords: &["test", "tests", "verify"],
        defaults: run_tests::defaults,
        validate: run_tests::validate,
        run: run_tests::run,
        postcheck: run_tests::postcheck,
    },
    BuiltinSpec {
        name: "summarize_results",
        cost_hint: Some(0.15),
        preconditions: &[],
        effects: &["summary_ready"],
        keywords: &["summary", "summarize", "results"],
        defaults: summarize_results::defaults,
        validate: summarize_results::validate,
        run: summarize_results::run,
        postcheck: summarize_results::postcheck,
    },
    BuiltinSpec {
        name: "write_report",
        cost_hint: Some(0.05),
        preconditions: &["summary_ready"],
        effects: &["report_written"],
        keywords: &["report", "write"],
        defaults: write_report::defaults,
        validate: write_report::validate,
        run: write_report::run,
        postcheck: write_report::postcheck,
    },
    BuiltinSpec {
        name: "record_ledger",
        cost_hint: Some(0.05),
        preconditions: &[],
        effects: &["ledger_recorded"],
        keywords: &["ledger", "record", "provenance"],
        defaults: record_ledger::defaults,
        validate: record_ledger::validate,
        run: record_ledger::run,
        postcheck: record_ledger::postcheck,
    },
];

pub fn builtin_action_names() -> Vec<&'static str> {
    BUILTIN_ACTIONS.iter().map(|spec| spec.name).collect()
}

impl BuiltinSpec {
    pub fn profile(&self) -> ActionProfile {
        ActionProfile {
            preconditions: self.preconditions.iter().map(|s| s.to_string()).collect(),
            effects: self.effects.iter().map(|s| s.to_string()).collect(),
            cost_hint: self.cost_hint,
            keywords: self.keywords.iter().map(|s| s.to_string()).collect(),
            defaults: (self.defaults)(),
        }
    }

    pub fn descriptor(&'static self) -> ActionDescriptor {
        ActionDescriptor::new(
            self.name,
            ActionOrigin::BuiltIn,
            self.profile(),
            Arc::new(BuiltinAction(self)),
        )
    }
}

struct BuiltinAction(&'static BuiltinSpec);

impl ActionContract for BuiltinAction {
    fn validate(&self, params: &Params, config: &Config) -> Result<Value, ActionError> {
        (self.0.validate)(params, config)
    }

    fn run(&self, validated: Value) -> Result<Value, ActionError> {
        (self.0.run)(validated)
    }

    fn postcheck(&self, result: Value, config: &Config) -> Result<Value, ActionError> {
        (self.0.postcheck)(result, config)
    }
}

fn params(entries: &[(&str, Value)]) -> Params {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn str_param(action: &str, params: &Params, key: &str, default: &str) -> Result<String, ActionError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(ActionError::invalid(
            action,
            format!("{key} must be a string, got {other}"),
        )),
    }
}

/// Lexical check only; validate handlers never touch the filesystem.
fn relative_path_param(action: &str, params: &Params, key: &str, default: &str) -> Result<String, ActionError> {
    let raw = str_param(action, params, key, default)?;
    let path = Path::new(&raw);
    if path.is_absolute() || raw.starts_with('~') {
        return Err(ActionError::invalid(action, format!("{key} must be relative to home")));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ActionError::invalid(action, format!("{key} must not traverse upwards")));
    }
    Ok(raw)
}

fn require_object(action: &str, result: &Value) -> Result<(), ActionError> {
    if result.is_object() {
        Ok(())
    } else {
        Err(ActionError::postcheck(action, "result must be an object"))
    }
}

fn require_field(action: &str, result: &Value, field: &str) -> Result<(), ActionError> {
    require_object(action, result)?;
    if result.get(field).is_none() {
        return Err(ActionError::postcheck(action, format!("result missing {field}")));
    }
    Ok(())
}

mod scan_repo_tree {
    use super::*;

    const NAME: &str = "scan_repo_tree";

    pub(super) fn defaults() -> Params {
        params(&[("root", json!(".")), ("max_depth", json!(3))])
    }

    pub(super) fn validate(params: &Params, _config: &Config) -> Result<Value, ActionError> {
        let root = relative_path_param(NAME, params, "root", ".")?;
        let max_depth = match params.get("max_depth") {
            None | Some(Value::Null) => 3,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| ActionError::invalid(NAME, "max_depth must be a non-negative integer"))?,
        };
        Ok(json!({"root": root, "max_depth": max_depth}))
    }

    pub(super) fn run(validated: Value) -> Result<Value, ActionError> {
        Ok(json!({
            "root": validated["root"],
            "max_depth": validated["max_depth"],
            "deferred": true,
        }))
    }

    pub(super) fn postcheck(result: Value, _config: &Config) -> Result<Value, ActionError> {
        require_field(NAME, &result, "root")?;
        Ok(result)
    }
}

mod scan_risks {
    use super::*;

    const NAME: &str = "scan_risks";

    pub(super) fn defaults() -> Params {
        params(&[("focus", json!("default"))])
    }

    pub(super) fn validate(params: &Params, _config: &Config) -> Result<Value, ActionError> {
        Ok(json!({"focus": str_param(NAME, params, "focus", "default")?}))
    }

    pub(super) fn run(validated: Value) -> Result<Value, ActionError> {
        Ok(json!({"focus": validated["focus"], "risks": []}))
    }

    pub(super) fn postcheck(result: Value, _config: &Config) -> Result<Value, ActionError> {
        require_field(NAME, &result, "risks")?;
        if !result["risks"].is_array() {
            return Err(ActionError::postcheck(NAME, "risks must be a list"));
        }
        Ok(result)
    }
}

mod generate_patch {
    use super::*;

    const NAME: &str = "generate_patch";

    pub(super) fn defaults() -> Params {
        params(&[("diff", json!(""))])
    }

    pub(super) fn validate(params: &Params, _config: &Config) -> Result<Value, ActionError> {
        Ok(json!({"diff": str_param(NAME, params, "diff", "")?}))
    }

    pub(super) fn run(validated: Value) -> Result<Value, ActionError> {
        Ok(json!({"patch": validated["diff"]}))
    }

    pub(super) fn postcheck(result: Value, _config: &Config) -> Result<Value, ActionError> {
        require_field(NAME, &result, "patch")?;
        Ok(result)
    }
}

mod mutate_code {
    use super::*;

    const NAME: &str = "mutate_code";

    pub(super) fn defaults() -> Params {
        params(&[("target", json!(".")), ("strategy", json!("conservative"))])
    }

    pub(super) fn validate(params: &Params, config: &Config) -> Result<Value, ActionError> {
        if !config.mutation_enabled {
            return Err(ActionError::refused(NAME, "mutation_enabled is false"));
        }
        let target = relative_path_param(NAME, params, "target", ".")?;
        let strategy = str_param(NAME, params, "strategy", "conservative")?;
        Ok(json!({"target": target, "strategy": strategy}))
    }

    pub(super) fn run(validated: Value) -> Result<Value, ActionError> {
        Ok(json!({
            "target": validated["target"],
            "strategy": validated["strategy"],
            "deferred": true,
        }))
    }

    pub(super) fn postcheck(result: Value, config: &Config) -> Result<Value, ActionError> {
        if !config.mutation_enabled {
            return Err(ActionError::postcheck(NAME, "mutation result produced while disabled"));
        }
        require_field(NAME, &result, "target")?;
        Ok(result)
    }
}

mod run_tests {
    use super::*;

    const NAME: &str = "run_tests";
    const MAX_TIMEOUT_SECONDS: u64 = 3_600;

    pub(super) fn defaults() -> Params {
        params(&[
            ("command", json!(["cargo", "test"])),
            ("timeout_seconds", json!(60)),
        ])
    }

    pub(super) fn validate(params: &Params, config: &Config) -> Result<Value, ActionError> {
        let command: Vec<String> = match params.get("command") {
            None | Some(Value::Null) => vec!["cargo".to_string(), "test".to_string()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ActionError::invalid(NAME, "command items must be strings"))
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(ActionError::invalid(NAME, "command must be a list")),
        };
        if command.is_empty() {
            return Err(ActionError::invalid(NAME, "command cannot be empty"));
        }
        let timeout = match params.get("timeout_seconds") {
            None | Some(Value::Null) => 60,
            Some(value) => value
                .as_u64()
                .filter(|secs| (1..=MAX_TIMEOUT_SECONDS).contains(secs))
                .ok_or_else(|| {
                    ActionError::invalid(NAME, format!("timeout_seconds must be 1..={MAX_TIMEOUT_SECONDS}"))
                })?,
        };
        Ok(json!({
            "command": command,
            "timeout_seconds": timeout,
            "skip": config.resource_tier == ResourceTier::Mobile,
        }))
    }

    pub(super) fn run(validated: Value) -> Result<Value, ActionError> {
        if validated["skip"].as_bool().unwrap_or(false) {
            return Ok(json!({
                "skipped": true,
                "reason": "resource_tier=mobile",
                "ok": true,
            }));
        }
        Ok(json!({
            "skipped": false,
            "command": validated["command"],
            "timeout_seconds": validated["timeout_seconds"],
            "deferred": true,
            "ok": true,
        }))
    }

    pub(super) fn postcheck(result: Value, config: &Config) -> Result<Value, ActionError> {
        require_object(NAME, &result)?;
        let skipped = result["skipped"]
            .as_bool()
            .ok_or_else(|| ActionError::postcheck(NAME, "skipped must be a boolean"))?;
        if !result["ok"].is_boolean() {
            return Err(ActionError::postcheck(NAME, "ok must be a boolean"));
        }
        if config.resource_tier == ResourceTier::Mobile && !skipped {
            return Err(ActionError::postcheck(NAME, "mobile tier must skip tests"));
        }
        Ok(result)
    }
}

mod summarize_results {
    use super::*;

    const NAME: &str = "summarize_results";

    pub(super) fn defaults() -> Params {
        params(&[("title", json!("Summary")), ("results", json!([]))])
    }

    pub(super) fn validate(params: &Params, _config: &Config) -> Result<Value, ActionError> {
        let title = str_param(NAME, params, "title", "Summary")?;
        let results = match params.get("results") {
            None | Some(Value::Null) => Value::Array(Vec::new()),
            Some(list @ Value::Array(_)) => list.clone(),
            Some(_) => return Err(ActionError::invalid(NAME, "results must be a list")),
        };
        Ok(json!({"title": title, "results": results}))
    }

    pub(super) fn run(validated: Value) -> Result<Value, ActionError> {
        let title = validated["title"].as_str().unwrap_or("Summary");
        let mut lines = vec![format!("# {title}")];
        if let Some(items) = validated["results"].as_array() {
            for item in items {
                match item {
                    Value::String(text) => lines.push(format!("- {text}")),
                    other => lines.push(format!("- {other}")),
                }
            }
        }
        Ok(json!({"title": title, "summary": lines.join("\n")}))
    }

    pub(super) fn postcheck(result: Value, _config: &Config) -> Result<Value, ActionError> {
        require_field(NAME, &result, "summary")?;
        Ok(result)
    }
}

mod write_report {
    use super::*;

    const NAME: &str = "write_report";

    pub(super) fn defaults() -> Params {
        params(&[("destination", json!("report.txt")), ("body", json!(""))])
    }

    pub(super) fn validate(params: &Params, _config: &Config) -> Result<Value, ActionError> {
        let destination = relative_path_param(NAME, params, "destination", "report.txt")?;
        let body = str_param(NAME, params, "body", "")?;
        Ok(json!({"destination": destination, "body": body}))
    }

    pub(super) fn run(validated: Value) -> Result<Value, ActionError> {
        let bytes = validated["body"].as_str().map(str::len).unwrap_or(0);
        Ok(json!({
            "destination": validated["destination"],
            "bytes": bytes,
            "deferred": true,
        }))
    }

    pub(super) fn postcheck(result: Value, _config: &Config) -> Result<Value, ActionError> {
        require_field(NAME, &result, "destination")?;
        Ok(result)
    }
}

mod record_ledger {
    use super::*;

    const NAME: &str = "record_ledger";

    pub(super) fn defaults() -> Params {
        params(&[
            ("event_type", json!("plan_recorded")),
            ("actor", json!("planner")),
        ])
    }

    pub(super) fn validate(params: &Params, config: &Config) -> Result<Value, ActionError> {
        let event_type = str_param(NAME, params, "event_type", "plan_recorded")?;
        let actor = str_param(NAME, params, "actor", "planner")?;
        let payload = match params.get("payload") {
            None | Some(Value::Null) => json!({}),
            Some(object @ Value::Object(_)) => object.clone(),
            Some(_) => return Err(ActionError::invalid(NAME, "payload must be a mapping")),
        };
        Ok(json!({
            "event_type": event_type,
            "actor": actor,
            "payload": payload,
            "ledger_enabled": config.ledger_enabled,
            "ledger_readonly": config.ledger_readonly,
        }))
    }

    pub(super) fn run(validated: Value) -> Result<Value, ActionError> {
        if !validated["ledger_enabled"].as_bool().unwrap_or(false) {
            return Ok(json!({"skipped": true, "reason": "ledger_disabled", "ok": true}));
        }
        if validated["ledger_readonly"].as_bool().unwrap_or(false) {
            return Ok(json!({"skipped": true, "reason": "ledger_readonly", "ok": true}));
        }
        Ok(json!({
            "skipped": false,
            "event_type": validated["event_type"],
            "actor": validated["actor"],
            "payload": validated["payload"],
            "deferred": true,
            "ok": true,
        }))
    }

    pub(super) fn postcheck(result: Value, _config: &Config) -> Result<Value, ActionError> {
        require_object(NAME, &result)?;
        if result["ok"] != Value::Bool(true) {
            return Err(ActionError::postcheck(NAME, "ok must be true on success or skip"));
        }
        Ok(result)
    }
}
