//! Error taxonomy for a patch session

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PatchError>;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("connect {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("authentication denied (server code {code})")]
    AuthenticationDenied { code: i32 },

    #[error("connection lost during {context}")]
    ConnectionLost { context: &'static str },

    #[error("corrupt manifest line {line}: {fault}")]
    ManifestCorrupt { line: usize, fault: LineFault },

    #[error("{}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("{context} timed out after {ms} ms")]
    Timeout { context: &'static str, ms: u64 },

    #[error("archive import failed: {0}")]
    Archive(String),
}

/// Why a patch manifest line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineFault {
    #[error("expected 9 fields, found {0}")]
    FieldCount(usize),
    #[error("bad sequence number {0:?}")]
    BadSequence(String),
}

impl PatchError {
    /// Map a stream error: EOF becomes `ConnectionLost`, anything else keeps
    /// its io error under a protocol message.
    pub(crate) fn from_stream(err: io::Error, context: &'static str) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => PatchError::ConnectionLost { context },
            _ => PatchError::Protocol(format!("{context}: {err}")),
        }
    }

    pub(crate) fn local(path: &Path, source: io::Error) -> Self {
        PatchError::LocalIo {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Attach a path to an io result, the way `anyhow::Context` attaches text.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| PatchError::local(path, e))
    }
}
