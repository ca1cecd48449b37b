use serde::Serialize;
use serde_json::{json, Value};
use std::{collections::BTreeMap, fs, path::PathBuf};
use tracing::info;

use super::{
    hashing::{hash_object, HashError},
    sandbox::{self, SandboxViolation},
};
use crate::internal::config::{Config, ConfigError};

/// Supplies the run identifier of a kernel context.
pub trait RunIdSource {
    fn next_run_id(&self) -> String;
}

/// Random v4 UUID in simple (unhyphenated) form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidRunIds;

impl RunIdSource for UuidRunIds {
    fn next_run_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Always hands out the same id. Used for replays and tests.
#[derive(Debug, Clone)]
pub struct FixedRunId(pub String);

impl RunIdSource for FixedRunId {
    fn next_run_id(&self) -> String {
        self.0.clone()
    }
}

/// Workspace locations, each resolved through the sandbox under `home`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspacePaths {
    pub home: PathBuf,
    pub actions_dir: PathBuf,
    pub log_path: PathBuf,
    pub ledger_path: Option<PathBuf>,
}

impl WorkspacePaths {
    pub fn from_config(config: &Config) -> Result<Self, ContextError> {
        let home = fs::canonicalize(&config.home).map_err(|source| {
            SandboxViolation::BaseUnavailable {
                base: config.home.clone(),
                source,
            }
        })?;
        let actions_dir = sandbox::resolve(&home, &config.actions_dir)?;
        let log_path = sandbox::resolve(&home, &config.log_path)?;
        let ledger_path = match config.ledger_relative_path() {
            Some(relative) => Some(sandbox::resolve(&home, &relative)?),
            None => None,
        };
        Ok(Self {
            home,
            actions_dir,
            log_path,
            ledger_path,
        })
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "home": self.home.display().to_string(),
            "actions_dir": self.actions_dir.display().to_string(),
            "log_path": self.log_path.display().to_string(),
            "ledger_path": self.ledger_path.as_ref().map(|p| p.display().to_string()),
        })
    }
}

/// Frozen, ordered configuration values plus their content hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSnapshot {
    values: BTreeMap<String, Value>,
    hash: String,
}

impl ConfigSnapshot {
    pub fn capture(config: &Config) -> Result<Self, ContextError> {
        let values: BTreeMap<String, Value> =
            match serde_json::to_value(config).map_err(HashError::from)? {
                Value::Object(object) => object.into_iter().collect(),
                _ => return Err(ContextError::Hash(HashError::NotAnObject("config"))),
            };
        let hash = hash_object(&values)?;
        Ok(Self { values, hash })
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn to_dict(&self) -> Value {
        json!({"values": self.values, "hash": self.hash})
    }
}

/// Ordered, name-unique artifact list. `register` returns a new registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactRegistry {
    artifacts: Vec<(String, String)>,
}

impl ArtifactRegistry {
    pub fn register(&self, name: &str, uri: &str) -> Result<Self, ContextError> {
        if name.trim().is_empty() {
            return Err(ContextError::InvalidArtifact("artifact name must be set".into()));
        }
        if uri.trim().is_empty() {
            return Err(ContextError::InvalidArtifact("artifact uri must be set".into()));
        }
        if self.artifacts.iter().any(|(existing, _)| existing == name) {
            return Err(ContextError::DuplicateArtifact(name.to_string()));
        }
        let mut artifacts = self.artifacts.clone();
        artifacts.push((name.to_string(), uri.to_string()));
        Ok(Self { artifacts })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.artifacts
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, uri)| uri.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.artifacts
            .iter()
            .map(|(name, uri)| (name.as_str(), uri.as_str()))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn to_dict(&self) -> Value {
        json!(self.artifacts)
    }
}

/// Immutable record binding one run to its workspace, config and artifacts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelContext {
    run_id: String,
    workspace: WorkspacePaths,
    config: ConfigSnapshot,
    artifacts: ArtifactRegistry,
}

impl KernelContext {
    pub fn build(config: &Config) -> Result<Self, ContextError> {
        Self::build_with(config, &UuidRunIds)
    }

    pub fn build_with(config: &Config, run_ids: &dyn RunIdSource) -> Result<Self, ContextError> {
        config.validate()?;
        let workspace = WorkspacePaths::from_config(config)?;
        let snapshot = ConfigSnapshot::capture(config)?;
        let run_id = run_ids.next_run_id();
        info!(
            run_id = %run_id,
            config_hash = %snapshot.hash(),
            home = %workspace.home.display(),
            "Kernel context built"
        );
        Ok(Self {
            run_id,
            workspace,
            config: snapshot,
            artifacts: ArtifactRegistry::default(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn workspace(&self) -> &WorkspacePaths {
        &self.workspace
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactRegistry {
        &self.artifacts
    }

    pub fn register_artifact(&self, name: &str, uri: &str) -> Result<Self, ContextError> {
        Ok(Self {
            artifacts: self.artifacts.register(name, uri)?,
            ..self.clone()
        })
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "run_id": self.run_id,
            "workspace": self.workspace.to_dict(),
            "config": self.config.to_dict(),
            "artifacts": self.artifacts.to_dict(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sandbox(#[from] SandboxViolation),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),
    #[error("Artifact {0} already registered")]
    DuplicateArtifact(String),
}
