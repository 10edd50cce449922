//! Transfer journal: one JSON line per finished session.

use crate::error::SessionError;
use crate::session::Session;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Stalled,
    TimedOut,
    Failed,
}

impl TransferStatus {
    pub fn from_outcome(outcome: Result<(), &SessionError>) -> Self {
        match outcome {
            Ok(()) => TransferStatus::Completed,
            Err(SessionError::StalledPeer(_)) => TransferStatus::Stalled,
            Err(SessionError::IdleTimeout(_)) => TransferStatus::TimedOut,
            Err(_) => TransferStatus::Failed,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub transfer_id: String,
    pub peer: String,
    pub requested_name: Option<String>,
    pub assigned_name: Option<String>,
    pub status: TransferStatus,
    pub expected_bytes: u64,
    pub received_bytes: u64,
    pub error: Option<String>,
}

impl TransferLogEntry {
    /// Snapshot a session at teardown.
    pub fn from_session(session: &Session, outcome: Result<(), &SessionError>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            transfer_id: session.transfer_id().to_string(),
            peer: session.peer().to_string(),
            requested_name: session.requested_name().map(str::to_string),
            assigned_name: session.assigned_name().map(str::to_string),
            status: TransferStatus::from_outcome(outcome),
            expected_bytes: session.expected_size(),
            received_bytes: session.received_bytes(),
            error: outcome.err().map(|e| e.to_string()),
        }
    }
}

pub struct TransferLog {
    log_file_path: PathBuf,
}

impl TransferLog {
    pub fn new(log_file_path: &Path) -> Self {
        TransferLog {
            log_file_path: log_file_path.to_path_buf(),
        }
    }

    pub fn add_entry(&self, entry: &TransferLogEntry) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open transfer journal")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<TransferLogEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open transfer journal for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TransferLogEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
