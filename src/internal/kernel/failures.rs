use serde::Serialize;
use std::fmt;

/// Kernel crash taxonomy. Codes are stable and appear in refusal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrashKind {
    IntegrityViolation,
    EvidenceMissing,
    DeterminismBreach,
    UnloggedExecution,
}

impl CrashKind {
    pub fn code(&self) -> &'static str {
        match self {
            CrashKind::IntegrityViolation => "CRASH_0x01",
            CrashKind::EvidenceMissing => "CRASH_0x02",
            CrashKind::DeterminismBreach => "CRASH_0x03",
            CrashKind::UnloggedExecution => "CRASH_0x04",
        }
    }
}

impl fmt::Display for CrashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct KernelCrash {
    pub kind: CrashKind,
    pub detail: String,
}

impl KernelCrash {
    pub fn new(kind: CrashKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn integrity(detail: impl Into<String>) -> Self {
        Self::new(CrashKind::IntegrityViolation, detail)
    }

    pub fn missing(detail: impl Into<String>) -> Self {
        Self::new(CrashKind::EvidenceMissing, detail)
    }

    pub fn determinism(detail: impl Into<String>) -> Self {
        Self::new(CrashKind::DeterminismBreach, detail)
    }

    pub fn unlogged(detail: impl Into<String>) -> Self {
        Self::new(CrashKind::UnloggedExecution, detail)
    }
}

/// Fails with `DeterminismBreach` when two renderings of the same run differ.
pub fn ensure_replay_identical(first: &[u8], second: &[u8]) -> Result<(), KernelCrash> {
    if first == second {
        return Ok(());
    }
    let offset = first
        .iter()
        .zip(second)
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| first.len().min(second.len()));
    Err(KernelCrash::determinism(format!(
        "replay output differs at byte {offset} ({} vs {} bytes)",
        first.len(),
        second.len()
    )))
}
