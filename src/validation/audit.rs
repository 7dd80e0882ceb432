use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;
use serde::Serialize;

use crate::models::AuditEntry;
use crate::utils::{CertificateError, Result};

/// Append-only record of every verification attempt.
pub trait AuditLog: Send + Sync {
    /// Store the entry and return its id.
    fn append(&self, entry: AuditEntry) -> Result<u64>;
}

#[derive(Serialize)]
struct AuditLine<'a> {
    id: u64,
    #[serde(flatten)]
    entry: &'a AuditEntry,
}

struct LogState {
    file: File,
    next_id: u64,
}

/// One JSON object per line. Ids continue from the lines already present.
pub struct JsonLinesAuditLog {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl JsonLinesAuditLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let existing = match File::open(&path) {
            Ok(file) => BufReader::new(file)
                .lines()
                .filter(|line| line.as_ref().map_or(false, |l| !l.trim().is_empty()))
                .count() as u64,
            Err(_) => 0,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CertificateError::Audit(format!("failed to open {}: {}", path.display(), e)))?;
        Ok(JsonLinesAuditLog {
            path,
            state: Mutex::new(LogState {
                file,
                next_id: existing + 1,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for JsonLinesAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<u64> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CertificateError::Audit("audit log lock poisoned".to_string()))?;
        let id = state.next_id;
        let mut line = serde_json::to_string(&AuditLine { id, entry: &entry })?;
        line.push('\n');
        state
            .file
            .write_all(line.as_bytes())
            .map_err(|e| CertificateError::Audit(format!("failed to write audit entry: {}", e)))?;
        state.next_id += 1;
        debug!("Audit entry {} written to {}", id, self.path.display());
        Ok(id)
    }
}

/// Keeps entries in memory; ids start at 1.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<u64> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CertificateError::Audit("audit log lock poisoned".to_string()))?;
        entries.push(entry);
        Ok(entries.len() as u64)
    }
}
