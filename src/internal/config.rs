use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    env, fmt,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

pub const ENV_PREFIX: &str = "DETPLAN_";

const MAX_STEPS_CAP: u32 = 10_000;
const MIN_SECONDS: f64 = 0.01;
const MAX_SECONDS: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceTier {
    Mobile,
    Edge,
    Server,
}

impl ResourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceTier::Mobile => "mobile",
            ResourceTier::Edge => "edge",
            ResourceTier::Server => "server",
        }
    }
}

impl fmt::Display for ResourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceTier {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mobile" => Ok(ResourceTier::Mobile),
            "edge" => Ok(ResourceTier::Edge),
            "server" => Ok(ResourceTier::Server),
            _ => Err(ConfigError::InvalidTier(raw.to_string())),
        }
    }
}

/// Frozen inputs of a planning run. Every field ends up in the config snapshot hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Sandbox root; every workspace path resolves under it.
    pub home: PathBuf,
    pub actions_dir: PathBuf,
    pub log_path: PathBuf,
    pub resource_tier: ResourceTier,
    pub planner_max_steps: u32,
    pub planner_max_seconds: f64,
    /// Carried in the snapshot; only the `mutate_code` action consults it.
    pub mutation_enabled: bool,
    pub ledger_enabled: bool,
    pub ledger_readonly: bool,
    pub ledger_dir: PathBuf,
    pub ledger_filename: String,
    pub emergency_halt: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            home: PathBuf::from("."),
            actions_dir: PathBuf::from("actions"),
            log_path: PathBuf::from(".detplan/logs/events.jsonl"),
            resource_tier: ResourceTier::Mobile,
            planner_max_steps: 25,
            planner_max_seconds: 2.0,
            mutation_enabled: false,
            ledger_enabled: false,
            ledger_readonly: false,
            ledger_dir: PathBuf::from(".detplan/ledger"),
            ledger_filename: "events.jsonl".to_string(),
            emergency_halt: false,
        }
    }
}

impl Config {
    /// Loads `DETPLAN_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        Self::from_vars(&vars)
    }

    /// Builds a config from prefixed key/value pairs, falling back to defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            vars.get(&format!("{ENV_PREFIX}{key}"))
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };
        let defaults = Config::default();

        let mut config = Config {
            version: get("VERSION").map(str::to_string).unwrap_or(defaults.version),
            home: get("HOME").map(PathBuf::from).unwrap_or(defaults.home),
            actions_dir: get("ACTIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.actions_dir),
            log_path: get("LOG_PATH").map(PathBuf::from).unwrap_or(defaults.log_path),
            resource_tier: match get("RESOURCE_TIER") {
                Some(raw) => raw.parse()?,
                None => defaults.resource_tier,
            },
            planner_max_steps: match get("PLANNER_MAX_STEPS") {
                Some(raw) => coerce_int("PLANNER_MAX_STEPS", raw)?,
                None => defaults.planner_max_steps,
            },
            planner_max_seconds: match get("PLANNER_MAX_SECONDS") {
                Some(raw) => coerce_float("PLANNER_MAX_SECONDS", raw)?,
                None => defaults.planner_max_seconds,
            },
            mutation_enabled: coerce_flag(get("MUTATION_ENABLED"), "MUTATION_ENABLED", false)?,
            ledger_enabled: coerce_flag(get("LEDGER_ENABLED"), "LEDGER_ENABLED", false)?,
            ledger_readonly: coerce_flag(get("LEDGER_READONLY"), "LEDGER_READONLY", false)?,
            ledger_dir: get("LEDGER_DIR").map(PathBuf::from).unwrap_or(defaults.ledger_dir),
            ledger_filename: get("LEDGER_FILENAME")
                .map(str::to_string)
                .unwrap_or(defaults.ledger_filename),
            emergency_halt: coerce_flag(get("EMERGENCY_HALT"), "EMERGENCY_HALT", false)?,
        };

        if config.emergency_halt {
            config = config.halted();
        }
        config.validate()?;
        Ok(config)
    }

    /// Applies emergency-halt dominance: one step, minimal time, no mutation,
    /// read-only ledger.
    pub fn halted(mut self) -> Self {
        self.emergency_halt = true;
        self.planner_max_steps = 1;
        self.planner_max_seconds = MIN_SECONDS;
        self.mutation_enabled = false;
        self.ledger_readonly = true;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_STEPS_CAP).contains(&self.planner_max_steps) {
            return Err(ConfigError::OutOfRange {
                field: "planner_max_steps",
                message: format!("must be 1..={MAX_STEPS_CAP}, got {}", self.planner_max_steps),
            });
        }
        if !self.planner_max_seconds.is_finite()
            || !(MIN_SECONDS..=MAX_SECONDS).contains(&self.planner_max_seconds)
        {
            return Err(ConfigError::OutOfRange {
                field: "planner_max_seconds",
                message: format!(
                    "must be {MIN_SECONDS}..={MAX_SECONDS}, got {}",
                    self.planner_max_seconds
                ),
            });
        }

        if self.ledger_enabled {
            validate_ledger_filename(&self.ledger_filename)?;
        }

        if self.emergency_halt {
            if self.mutation_enabled {
                return Err(ConfigError::EmergencyHalt(
                    "emergency_halt requires mutation_enabled=false",
                ));
            }
            if !self.ledger_readonly {
                return Err(ConfigError::EmergencyHalt(
                    "emergency_halt requires ledger_readonly=true",
                ));
            }
        }

        Ok(())
    }

    /// Ledger file location relative to `home`, if the ledger is enabled.
    pub fn ledger_relative_path(&self) -> Option<PathBuf> {
        self.ledger_enabled
            .then(|| self.ledger_dir.join(&self.ledger_filename))
    }
}

fn validate_ledger_filename(raw: &str) -> Result<(), ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidLedgerFilename(
            "must be set when the ledger is enabled".to_string(),
        ));
    }
    if trimmed.starts_with('~') {
        return Err(ConfigError::InvalidLedgerFilename(
            "must not start with ~".to_string(),
        ));
    }
    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return Err(ConfigError::InvalidLedgerFilename(
            "must be a relative path".to_string(),
        ));
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
        || trimmed.split(['/', '\\']).any(|part| part == "..")
    {
        return Err(ConfigError::InvalidLedgerFilename(
            "must not contain parent directory traversal".to_string(),
        ));
    }
    Ok(())
}

fn coerce_flag(raw: Option<&str>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}

fn coerce_int(key: &'static str, raw: &str) -> Result<u32, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidInt {
        key,
        value: raw.to_string(),
    })
}

fn coerce_float(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidFloat {
        key,
        value: raw.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid boolean for {key}: {value}")]
    InvalidBool { key: &'static str, value: String },
    #[error("Invalid integer for {key}: {value}")]
    InvalidInt { key: &'static str, value: String },
    #[error("Invalid float for {key}: {value}")]
    InvalidFloat { key: &'static str, value: String },
    #[error("Invalid resource_tier: {0}. Allowed: mobile, edge, server")]
    InvalidTier(String),
    #[error("{field} {message}")]
    OutOfRange { field: &'static str, message: String },
    #[error("ledger_filename {0}")]
    InvalidLedgerFilename(String),
    #[error("{0}")]
    EmergencyHalt(&'static str),
}
