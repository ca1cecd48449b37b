use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use super::ledger::{LedgerError, LedgerEvent};
use crate::internal::kernel::hashing::canonical_json;

/// Persistence behind a [`Ledger`](super::ledger::Ledger).
///
/// Stores only ever grow; there is no update or delete.
pub trait LedgerStore {
    fn load(&self) -> Result<Vec<LedgerEvent>, LedgerError>;
    fn push(&mut self, event: &LedgerEvent) -> Result<(), LedgerError>;

    /// The newest `limit` events, oldest first.
    fn load_tail(&self, limit: usize) -> Result<Vec<LedgerEvent>, LedgerError> {
        let mut events = self.load()?;
        let start = events.len().saturating_sub(limit);
        Ok(events.split_off(start))
    }

    /// Hash of the most recent event, if any.
    fn last_hash(&self) -> Result<Option<String>, LedgerError> {
        Ok(self.load_tail(1)?.pop().map(|event| event.hash))
    }
}

const TAIL_CHUNK: u64 = 8 * 1024;

#[derive(Debug, Default, Clone)]
pub struct MemoryLedgerStore {
    events: Vec<LedgerEvent>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Vec<LedgerEvent>, LedgerError> {
        Ok(self.events.clone())
    }

    fn push(&mut self, event: &LedgerEvent) -> Result<(), LedgerError> {
        self.events.push(event.clone());
        Ok(())
    }

    fn last_hash(&self) -> Result<Option<String>, LedgerError> {
        Ok(self.events.last().map(|event| event.hash.clone()))
    }
}

/// One canonical-JSON event per line.
#[derive(Debug, Clone)]
pub struct JsonlLedgerStore {
    path: PathBuf,
}

impl JsonlLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Up to `limit` non-blank lines from the end of the file, newest first.
    /// Reads backwards in fixed chunks, so the cost follows `limit` rather
    /// than the file size.
    fn tail_lines(&self, limit: usize) -> Result<Vec<String>, LedgerError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io_error(err)),
        };
        let mut end = file.metadata().map_err(|e| self.io_error(e))?.len();

        // Bytes between `end` and the start of the last collected line.
        let mut pending: Vec<u8> = Vec::new();
        let mut lines = Vec::new();
        while end > 0 && lines.len() < limit {
            let start = end.saturating_sub(TAIL_CHUNK);
            let mut chunk = vec![0; (end - start) as usize];
            file.seek(SeekFrom::Start(start))
                .and_then(|_| file.read_exact(&mut chunk))
                .map_err(|e| self.io_error(e))?;
            chunk.extend_from_slice(&pending);
            pending = chunk;
            end = start;

            while lines.len() < limit {
                let Some(newline) = pending.iter().rposition(|&b| b == b'\n') else {
                    break;
                };
                let line = pending.split_off(newline + 1);
                pending.truncate(newline);
                push_non_blank(&mut lines, &line);
            }
        }
        if end == 0 && lines.len() < limit {
            push_non_blank(&mut lines, &pending);
        }
        Ok(lines)
    }
}

fn push_non_blank(lines: &mut Vec<String>, raw: &[u8]) {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        lines.push(trimmed.to_string());
    }
}

impl LedgerStore for JsonlLedgerStore {
    fn load(&self) -> Result<Vec<LedgerEvent>, LedgerError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io_error(err)),
        };

        let mut events = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_error(e))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let event = serde_json::from_str(trimmed).map_err(|source| LedgerError::Corrupt {
                path: self.path.clone(),
                line: index + 1,
                source,
            })?;
            events.push(event);
        }
        Ok(events)
    }

    fn load_tail(&self, limit: usize) -> Result<Vec<LedgerEvent>, LedgerError> {
        let mut events = Vec::new();
        for line in self.tail_lines(limit)? {
            match serde_json::from_str(&line) {
                Ok(event) => events.push(event),
                // A full read reports the exact line of the bad record.
                Err(_) => {
                    let mut all = self.load()?;
                    let start = all.len().saturating_sub(limit);
                    return Ok(all.split_off(start));
                }
            }
        }
        events.reverse();
        Ok(events)
    }

    fn push(&mut self, event: &LedgerEvent) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        if self.path.is_dir() {
            return Err(LedgerError::NotAFile {
                path: self.path.clone(),
            });
        }

        let mut line = canonical_json(event)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes()).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}
