//! Loader for file-sourced actions.
//!
//! An action file is a JSON manifest declaring the planning profile and the
//! three capabilities. Each capability must be an object whose `args` list
//! matches the fixed shape exactly:
//!
//! ```json
//! {
//!   "name": "lint_sources",
//!   "cost_hint": 0.1,
//!   "preconditions": ["tree_scanned"],
//!   "effects": ["lint_done"],
//!   "keywords": ["lint"],
//!   "params": {"strict": true},
//!   "capabilities": {
//!     "validate": {"args": ["params", "config"], "require": ["strict"]},
//!     "run": {"args": ["validated"], "emit": {"tool": "clippy"}},
//!     "postcheck": {"args": ["result", "config"], "require": ["action"]}
//!   }
//! }
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::spec::{
    is_valid_identifier, ActionContract, ActionDescriptor, ActionError, ActionOrigin,
    ActionProfile, Params,
};
use crate::internal::config::Config;

/// Capability names and their required argument lists, in declaration order.
pub const CAPABILITY_SIGNATURES: &[(&str, &[&str])] = &[
    ("validate", &["params", "config"]),
    ("run", &["validated"]),
    ("postcheck", &["result", "config"]),
];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    name: Option<String>,
    #[serde(default)]
    cost_hint: Option<f64>,
    #[serde(default)]
    preconditions: Vec<String>,
    #[serde(default)]
    effects: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    params: Params,
    capabilities: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Capability {
    args: Vec<String>,
    #[serde(default)]
    variadic: bool,
    #[serde(default)]
    require: Vec<String>,
    #[serde(default)]
    emit: Map<String, Value>,
}

/// Parses one manifest. `path` only names the origin; the caller reads the file.
pub fn parse_manifest(path: &Path, contents: &str) -> Result<ActionDescriptor, ContractViolation> {
    let raw: RawManifest =
        serde_json::from_str(contents).map_err(|source| ContractViolation::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    let name = match &raw.name {
        Some(name) => name.trim().to_string(),
        None => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase())
            .unwrap_or_default(),
    };
    if !is_valid_identifier(&name) {
        return Err(ContractViolation::InvalidName {
            path: path.to_path_buf(),
            name,
        });
    }

    let mut capabilities = verify_capabilities(path, &raw.capabilities)?;
    let postcheck = capabilities.pop().unwrap_or_default();
    let run = capabilities.pop().unwrap_or_default();
    let validate = capabilities.pop().unwrap_or_default();

    let profile = build_profile(path, &raw)?;
    let handler = ManifestAction {
        name: name.clone(),
        required_params: validate.require,
        emit: run.emit,
        required_results: postcheck.require,
    };

    Ok(ActionDescriptor::new(
        name,
        ActionOrigin::File(path.to_path_buf()),
        profile,
        Arc::new(handler),
    ))
}

/// Checks the capability table against [`CAPABILITY_SIGNATURES`] and returns
/// the parsed capabilities in signature order.
fn verify_capabilities(
    path: &Path,
    table: &Map<String, Value>,
) -> Result<Vec<Capability>, ContractViolation> {
    for &(capability, _) in CAPABILITY_SIGNATURES {
        if !table.contains_key(capability) {
            return Err(ContractViolation::MissingCapability {
                path: path.to_path_buf(),
                capability,
            });
        }
    }
    if let Some(extra) = table
        .keys()
        .find(|key| !CAPABILITY_SIGNATURES.iter().any(|(name, _)| *name == key.as_str()))
    {
        return Err(ContractViolation::UnexpectedCapability {
            path: path.to_path_buf(),
            capability: extra.clone(),
        });
    }

    let mut parsed = Vec::with_capacity(CAPABILITY_SIGNATURES.len());
    for &(capability, expected) in CAPABILITY_SIGNATURES {
        let value = &table[capability];
        if !value.is_object() {
            return Err(ContractViolation::NotCallable {
                path: path.to_path_buf(),
                capability,
            });
        }
        let entry: Capability = serde_json::from_value(value.clone()).map_err(|source| {
            ContractViolation::Malformed {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let spread = |arg: &String| arg.starts_with('*') || arg.starts_with("...");
        if entry.variadic || entry.args.iter().any(spread) {
            return Err(ContractViolation::Variadic {
                path: path.to_path_buf(),
                capability,
            });
        }
        if entry.args.iter().map(String::as_str).ne(expected.iter().copied()) {
            return Err(ContractViolation::SignatureMismatch {
                path: path.to_path_buf(),
                capability,
                expected: expected.join(", "),
                found: entry.args.join(", "),
            });
        }
        parsed.push(entry);
    }
    Ok(parsed)
}

fn build_profile(path: &Path, raw: &RawManifest) -> Result<ActionProfile, ContractViolation> {
    let invalid = |message: String| ContractViolation::InvalidProfile {
        path: path.to_path_buf(),
        message,
    };

    if let Some(cost) = raw.cost_hint {
        if !cost.is_finite() || cost < 0.0 {
            return Err(invalid(format!("cost_hint must be finite and >= 0, got {cost}")));
        }
    }

    let labels = |field: &str, items: &[String]| -> Result<BTreeSet<String>, ContractViolation> {
        items
            .iter()
            .map(|item| {
                let item = item.trim();
                if item.is_empty() {
                    Err(invalid(format!("{field} entries must be non-empty")))
                } else {
                    Ok(item.to_string())
                }
            })
            .collect()
    };

    let keywords = labels("keywords", &raw.keywords)?
        .into_iter()
        .map(|keyword| keyword.to_lowercase())
        .collect();

    Ok(ActionProfile {
        preconditions: labels("preconditions", &raw.preconditions)?,
        effects: labels("effects", &raw.effects)?,
        cost_hint: raw.cost_hint,
        keywords,
        defaults: raw.params.clone(),
    })
}

/// Declarative action built from a manifest. All three operations are pure.
struct ManifestAction {
    name: String,
    required_params: Vec<String>,
    emit: Map<String, Value>,
    required_results: Vec<String>,
}

impl ActionContract for ManifestAction {
    fn validate(&self, params: &Params, _config: &Config) -> Result<Value, ActionError> {
        for key in &self.required_params {
            match params.get(key) {
                None | Some(Value::Null) => {
                    return Err(ActionError::invalid(&self.name, format!("missing {key}")));
                }
                Some(_) => {}
            }
        }
        Ok(Value::Object(
            params.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        ))
    }

    fn run(&self, validated: Value) -> Result<Value, ActionError> {
        let mut result = self.emit.clone();
        result.insert("action".to_string(), Value::String(self.name.clone()));
        result.insert("input".to_string(), validated);
        Ok(Value::Object(result))
    }

    fn postcheck(&self, result: Value, _config: &Config) -> Result<Value, ActionError> {
        let Some(object) = result.as_object() else {
            return Err(ActionError::postcheck(&self.name, "result must be an object"));
        };
        if let Some(missing) = self
            .required_results
            .iter()
            .find(|key| !object.contains_key(key.as_str()))
        {
            return Err(ActionError::postcheck(&self.name, format!("result missing {missing}")));
        }
        Ok(result)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContractViolation {
    #[error("Action file {path} is not a valid manifest: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Action file {path} has invalid name '{name}'")]
    InvalidName { path: PathBuf, name: String },
    #[error("Action file {path} missing required capability: {capability}")]
    MissingCapability {
        path: PathBuf,
        capability: &'static str,
    },
    #[error("Action file {path} declares unexpected capability: {capability}")]
    UnexpectedCapability { path: PathBuf, capability: String },
    #[error("Action file {path} capability '{capability}' must be callable")]
    NotCallable {
        path: PathBuf,
        capability: &'static str,
    },
    #[error("Action file {path} capability '{capability}' must not use variadic arguments")]
    Variadic {
        path: PathBuf,
        capability: &'static str,
    },
    #[error("Action file {path} capability '{capability}' must accept ({expected}), found ({found})")]
    SignatureMismatch {
        path: PathBuf,
        capability: &'static str,
        expected: String,
        found: String,
    },
    #[error("Action file {path} has an invalid profile: {message}")]
    InvalidProfile { path: PathBuf, message: String },
}
