use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::Path;
use std::sync::Mutex;

pub trait Logger: Send + Sync {
    fn connect(&self, _addr: &str) {}
    fn authenticated(&self) {}
    fn versions(&self, _locale: &str, _local: u32, _remote: Option<u32>) {}
    fn manifest(&self, _version: u32, _entries: usize, _path: &Path) {}
    fn file_done(&self, _name: &str, _bytes: u64) {}
    fn commit(&self, _version: u32, _bytes: u64) {}
    fn error(&self, _context: &str, _msg: &str) {}
    fn done(&self, _from: u32, _to: u32, _files: u64, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Append-only session log: one `[rfc3339] EVENT key=value ...` line per event.
pub struct TextLogger {
    sink: Mutex<LineWriter<File>>,
}

impl TextLogger {
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        Ok(Self {
            sink: Mutex::new(LineWriter::new(file)),
        })
    }

    fn emit(&self, event: &str, fields: fmt::Arguments<'_>) {
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        // Logging never fails the session
        let _ = writeln!(sink, "[{}] {event} {fields}", Utc::now().to_rfc3339());
    }
}

impl Logger for TextLogger {
    fn connect(&self, addr: &str) {
        self.emit("CONNECT", format_args!("addr={addr}"));
    }
    fn authenticated(&self) {
        self.emit("AUTH", format_args!("result=accepted"));
    }
    fn versions(&self, locale: &str, local: u32, remote: Option<u32>) {
        match remote {
            Some(v) => self.emit("SEEK", format_args!("locale={locale} local={local} remote={v}")),
            None => self.emit("SEEK", format_args!("locale={locale} local={local} remote=none")),
        }
    }
    fn manifest(&self, version: u32, entries: usize, path: &Path) {
        self.emit(
            "MANIFEST",
            format_args!("version={version} entries={entries} path={}", path.display()),
        );
    }
    fn file_done(&self, name: &str, bytes: u64) {
        self.emit("FILE", format_args!("name={name} bytes={bytes}"));
    }
    fn commit(&self, version: u32, bytes: u64) {
        self.emit("COMMIT", format_args!("version={version} bytes={bytes}"));
    }
    fn error(&self, context: &str, msg: &str) {
        self.emit("ERROR", format_args!("ctx={context} msg={msg}"));
    }
    fn done(&self, from: u32, to: u32, files: u64, bytes: u64, seconds: f64) {
        self.emit(
            "DONE",
            format_args!("from={from} to={to} files={files} bytes={bytes} seconds={seconds:.3}"),
        );
    }
}
