//! Append-only, hash-chained provenance ledger.
//!
//! Each event commits to its payload and to the hash of the event before it;
//! the first event points at [`GENESIS_HASH`]. Appends are check-then-act, so
//! concurrent writers must be serialized by the caller.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{fmt, path::PathBuf};
use tracing::{info, warn};

use super::store::{JsonlLedgerStore, LedgerStore};
use crate::internal::{
    config::Config,
    kernel::{
        hashing::{hash_object, HashError},
        sandbox::{self, SandboxViolation},
    },
};

/// `prev_hash` of the first event in every chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub payload: Value,
    pub prev_hash: String,
    pub hash: String,
}

impl LedgerEvent {
    /// Builds an event chained onto `prev_hash`.
    pub fn seal(prev_hash: &str, payload: Value) -> Result<Self, HashError> {
        let hash = chain_hash(prev_hash, &payload)?;
        Ok(Self {
            payload,
            prev_hash: prev_hash.to_string(),
            hash,
        })
    }

    /// Hash this event should carry given its payload and predecessor.
    pub fn expected_hash(&self) -> Result<String, HashError> {
        chain_hash(&self.prev_hash, &self.payload)
    }
}

fn chain_hash(prev_hash: &str, payload: &Value) -> Result<String, HashError> {
    hash_object(&json!({"payload": payload, "prev_hash": prev_hash}))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    Disabled,
    ReadOnly,
    Writable,
}

impl LedgerMode {
    pub fn from_config(config: &Config) -> Self {
        match (config.ledger_enabled, config.ledger_readonly) {
            (false, _) => LedgerMode::Disabled,
            (true, true) => LedgerMode::ReadOnly,
            (true, false) => LedgerMode::Writable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Appended(LedgerEvent),
    /// The ledger is disabled; nothing was written.
    Skipped,
}

pub struct Ledger<S: LedgerStore> {
    mode: LedgerMode,
    store: S,
}

impl Ledger<JsonlLedgerStore> {
    /// JSON-lines ledger at `home/ledger_dir/ledger_filename`.
    pub fn open(config: &Config) -> Result<Self, LedgerError> {
        let mode = LedgerMode::from_config(config);
        let path = match config.ledger_relative_path() {
            Some(relative) => sandbox::resolve(&config.home, &relative)?,
            None => config.home.join(&config.ledger_dir).join(&config.ledger_filename),
        };
        Ok(Self::new(mode, JsonlLedgerStore::new(path)))
    }

    pub fn path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(mode: LedgerMode, store: S) -> Self {
        Self { mode, store }
    }

    pub fn mode(&self) -> LedgerMode {
        self.mode
    }

    /// Hash the next event must chain onto.
    pub fn head(&self) -> Result<String, LedgerError> {
        self.ensure_enabled()?;
        Ok(self
            .store
            .last_hash()?
            .unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    pub fn append(&mut self, prev_hash: &str, payload: Value) -> Result<AppendOutcome, LedgerError> {
        match self.mode {
            LedgerMode::Disabled => return Ok(AppendOutcome::Skipped),
            LedgerMode::ReadOnly => {
                warn!("Refused append to read-only ledger");
                return Err(LedgerError::ReadOnlyViolation);
            }
            LedgerMode::Writable => {}
        }
        if !payload.is_object() {
            return Err(LedgerError::InvalidPayload("payload must be an object"));
        }

        let head = self.head()?;
        if head != prev_hash {
            return Err(LedgerError::StaleHead {
                head,
                given: prev_hash.to_string(),
            });
        }

        let event = LedgerEvent::seal(prev_hash, payload)?;
        self.store.push(&event)?;
        info!(hash = %event.hash, prev_hash = %event.prev_hash, "Ledger event appended");
        Ok(AppendOutcome::Appended(event))
    }

    /// Appends onto the current head.
    pub fn append_next(&mut self, payload: Value) -> Result<AppendOutcome, LedgerError> {
        if self.mode == LedgerMode::Disabled {
            return Ok(AppendOutcome::Skipped);
        }
        let head = self.head()?;
        self.append(&head, payload)
    }

    pub fn events(&self) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_enabled()?;
        self.store.load()
    }

    /// Verifies the stored chain; returns the number of events checked.
    pub fn verify(&self) -> Result<usize, LedgerError> {
        let events = self.events()?;
        verify(&events)?;
        Ok(events.len())
    }

    fn ensure_enabled(&self) -> Result<(), LedgerError> {
        if self.mode == LedgerMode::Disabled {
            return Err(LedgerError::Disabled);
        }
        Ok(())
    }
}

/// Checks linkage and hashes of `events`. Breaks are reported, never repaired.
pub fn verify(events: &[LedgerEvent]) -> Result<(), ChainError> {
    let mut expected_prev: &str = GENESIS_HASH;
    for (index, event) in events.iter().enumerate() {
        if event.prev_hash != expected_prev {
            return Err(ChainError {
                index,
                reason: ChainBreak::PrevHashMismatch {
                    expected: expected_prev.to_string(),
                    found: event.prev_hash.clone(),
                },
            });
        }
        let recomputed = event.expected_hash().map_err(|e| ChainError {
            index,
            reason: ChainBreak::Unhashable(e.to_string()),
        })?;
        if recomputed != event.hash {
            return Err(ChainError {
                index,
                reason: ChainBreak::HashMismatch {
                    expected: recomputed,
                    found: event.hash.clone(),
                },
            });
        }
        expected_prev = event.hash.as_str();
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainBreak {
    PrevHashMismatch { expected: String, found: String },
    HashMismatch { expected: String, found: String },
    Unhashable(String),
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainBreak::PrevHashMismatch { expected, found } => {
                write!(f, "prev_hash {found} does not match {expected}")
            }
            ChainBreak::HashMismatch { expected, found } => {
                write!(f, "hash {found} does not match recomputed {expected}")
            }
            ChainBreak::Unhashable(message) => write!(f, "event cannot be hashed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Ledger chain broken at event {index}: {reason}")]
pub struct ChainError {
    pub index: usize,
    pub reason: ChainBreak,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger is disabled by configuration")]
    Disabled,
    #[error("Ledger is read-only")]
    ReadOnlyViolation,
    #[error("Stale ledger head: given {given}, current {head}")]
    StaleHead { head: String, given: String },
    #[error("Invalid ledger payload: {0}")]
    InvalidPayload(&'static str),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Sandbox(#[from] SandboxViolation),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("Ledger path {path} is a directory, expected a file")]
    NotAFile { path: PathBuf },
    #[error("Ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt ledger record at {path}:{line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
