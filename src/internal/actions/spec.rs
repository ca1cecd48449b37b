use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::PathBuf,
    sync::Arc,
};

use crate::internal::config::Config;

/// Ordered parameter mapping handed to `validate`.
pub type Params = BTreeMap<String, Value>;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("identifier pattern compiles"));

/// Action names and step ids share the same alphabet.
pub fn is_valid_identifier(raw: &str) -> bool {
    IDENTIFIER.is_match(raw)
}

/// The three fixed-shape capabilities every action exposes.
///
/// `validate` and `postcheck` must be pure: no I/O, randomness or environment
/// reads. The kernel never calls `run`; it exists for an external executor.
pub trait ActionContract: Send + Sync {
    fn validate(&self, params: &Params, config: &Config) -> Result<Value, ActionError>;
    fn run(&self, validated: Value) -> Result<Value, ActionError>;
    fn postcheck(&self, result: Value, config: &Config) -> Result<Value, ActionError>;
}

/// Planning-relevant declarations of an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionProfile {
    pub preconditions: BTreeSet<String>,
    pub effects: BTreeSet<String>,
    /// `None` is an unbounded cost.
    pub cost_hint: Option<f64>,
    /// Goal words that select this action.
    pub keywords: BTreeSet<String>,
    /// Parameters every planned step starts from.
    pub defaults: Params,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ActionOrigin {
    BuiltIn,
    File(PathBuf),
}

impl fmt::Display for ActionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOrigin::BuiltIn => f.write_str("built-in"),
            ActionOrigin::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One registered action implementation. Immutable once constructed.
#[derive(Clone)]
pub struct ActionDescriptor {
    name: String,
    origin: ActionOrigin,
    profile: ActionProfile,
    handler: Arc<dyn ActionContract>,
}

impl ActionDescriptor {
    pub fn new(
        name: impl Into<String>,
        origin: ActionOrigin,
        profile: ActionProfile,
        handler: Arc<dyn ActionContract>,
    ) -> Self {
        Self {
            name: name.into(),
            origin,
            profile,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &ActionOrigin {
        &self.origin
    }

    pub fn profile(&self) -> &ActionProfile {
        &self.profile
    }

    pub fn cost_hint(&self) -> Option<f64> {
        self.profile.cost_hint
    }

    pub fn validate(&self, params: &Params, config: &Config) -> Result<Value, ActionError> {
        self.handler.validate(params, config)
    }

    pub fn run(&self, validated: Value) -> Result<Value, ActionError> {
        self.handler.run(validated)
    }

    pub fn postcheck(&self, result: Value, config: &Config) -> Result<Value, ActionError> {
        self.handler.postcheck(result, config)
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Invalid params for {action}: {message}")]
    InvalidParams { action: String, message: String },
    #[error("Action {action} refused: {reason}")]
    Refused { action: String, reason: String },
    #[error("Postcheck failed for {action}: {message}")]
    Postcheck { action: String, message: String },
}

impl ActionError {
    pub fn invalid(action: &str, message: impl Into<String>) -> Self {
        ActionError::InvalidParams {
            action: action.to_string(),
            message: message.into(),
        }
    }

    pub fn refused(action: &str, reason: impl Into<String>) -> Self {
        ActionError::Refused {
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    pub fn postcheck(action: &str, message: impl Into<String>) -> Self {
        ActionError::Postcheck {
            action: action.to_string(),
            message: message.into(),
        }
    }
}
