//! Per-version update journal (JSON lines in the client directory)

use crate::protocol::layout::JOURNAL_FILE;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub timestamp: String,
    pub locale: String,
    pub from_version: u32,
    pub to_version: u32,
    pub status: UpdateStatus,
    pub files: u64,
    pub bytes_transferred: u64,
    pub error: Option<String>,
}

impl JournalEntry {
    pub fn new(locale: &str, from_version: u32, to_version: u32, status: UpdateStatus) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            locale: locale.to_string(),
            from_version,
            to_version,
            status,
            files: 0,
            bytes_transferred: 0,
            error: None,
        }
    }
}

pub struct UpdateJournal {
    log_file_path: PathBuf,
}

impl UpdateJournal {
    pub fn new(client_dir: &Path) -> Self {
        let log_file_path = client_dir.join(JOURNAL_FILE);
        UpdateJournal { log_file_path }
    }

    pub fn add_entry(&self, entry: &JournalEntry) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open update journal")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<JournalEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open update journal for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
