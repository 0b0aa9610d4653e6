//! Synchronous notification fan-out
//!
//! Callbacks fire on the calling task, in registration order. They are for
//! observation only; a slow handler stalls the transfer it observes.

use std::fmt;

/// Status notifications raised while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Connecting { addr: String },
    AuthenticationRequested,
    Authenticated,
    UpdateAvailable { local: u32, target: u32 },
    UpToDate { local: u32 },
    ManifestReceived { version: u32, entries: usize },
    VersionCommitted { version: u32 },
    ArchiveMessage(String),
    ArchiveWarning(String),
    ArchiveProgress(u8),
    Failed(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Connecting { addr } => write!(f, "connecting to {addr}"),
            Status::AuthenticationRequested => write!(f, "server requested authentication"),
            Status::Authenticated => write!(f, "authenticated"),
            Status::UpdateAvailable { local, target } => {
                write!(f, "update available: {local} -> {target}")
            }
            Status::UpToDate { local } => write!(f, "up to date (version {local})"),
            Status::ManifestReceived { version, entries } => {
                write!(f, "manifest for version {version}: {entries} files")
            }
            Status::VersionCommitted { version } => write!(f, "committed version {version}"),
            Status::ArchiveMessage(m) => write!(f, "{m}"),
            Status::ArchiveWarning(m) => write!(f, "warning: {m}"),
            Status::ArchiveProgress(p) => write!(f, "archive {p}%"),
            Status::Failed(m) => write!(f, "failed: {m}"),
        }
    }
}

/// Per-chunk transfer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress<'a> {
    pub file: &'a str,
    pub received: u64,
    pub total: u64,
}

type StatusFn = Box<dyn FnMut(&Status) + Send>;
type ProgressFn = Box<dyn FnMut(&Progress<'_>) + Send>;
type VersionFn = Box<dyn FnMut(u32) + Send>;

#[derive(Default)]
pub struct Notifier {
    status: Vec<StatusFn>,
    progress: Vec<ProgressFn>,
    version: Vec<VersionFn>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_status<F>(&mut self, f: F)
    where
        F: FnMut(&Status) + Send + 'static,
    {
        self.status.push(Box::new(f));
    }

    pub fn subscribe_progress<F>(&mut self, f: F)
    where
        F: FnMut(&Progress<'_>) + Send + 'static,
    {
        self.progress.push(Box::new(f));
    }

    pub fn subscribe_version<F>(&mut self, f: F)
    where
        F: FnMut(u32) + Send + 'static,
    {
        self.version.push(Box::new(f));
    }

    pub fn status(&mut self, status: Status) {
        for cb in self.status.iter_mut() {
            cb(&status);
        }
    }

    pub fn progress(&mut self, file: &str, received: u64, total: u64) {
        let p = Progress {
            file,
            received,
            total,
        };
        for cb in self.progress.iter_mut() {
            cb(&p);
        }
    }

    pub fn version_changed(&mut self, version: u32) {
        for cb in self.version.iter_mut() {
            cb(version);
        }
    }
}
