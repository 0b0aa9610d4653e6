//! Command-line options and their merge onto the file configuration

use crate::config::UpdaterConfig;
use anyhow::Result;
use clap::Parser;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Command-line arguments
#[derive(Clone, Debug, Default, Parser)]
#[command(
    author,
    version,
    about = "Patchsync - bring a game client up to the patch server's latest version"
)]
pub struct Args {
    /// Patch server (host[:port] or tpf://host[:port])
    #[arg(long)]
    pub server: Option<String>,

    /// Content locale to track (e.g. us)
    #[arg(long)]
    pub locale: Option<String>,

    /// Client installation directory
    #[arg(long = "client-dir")]
    pub client_dir: Option<PathBuf>,

    /// Credential sent when the server challenges (default: derived from host name)
    #[arg(long)]
    pub fingerprint: Option<String>,

    /// Jump straight to the latest version instead of walking each one
    #[arg(long)]
    pub full: bool,

    /// Keep raw downloaded files after they are imported
    #[arg(long = "keep-update-files")]
    pub keep_update_files: bool,

    /// Transfer read size in bytes
    #[arg(long = "buffer-size")]
    pub buffer_size: Option<usize>,

    /// Per read/write timeout in seconds (default: wait indefinitely)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append session events to this log file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Show every fetched file and archive message
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Load the config file (if any) and apply command-line overrides.
    pub fn resolve_config(&self) -> Result<UpdaterConfig> {
        let mut cfg = match &self.config {
            Some(p) => UpdaterConfig::load(p)?,
            None => UpdaterConfig::default(),
        };
        if let Some(s) = &self.server {
            cfg.server = s.clone();
        }
        if let Some(l) = &self.locale {
            cfg.locale = l.clone();
        }
        if let Some(d) = &self.client_dir {
            cfg.client_dir = d.clone();
        }
        if let Some(f) = &self.fingerprint {
            cfg.fingerprint = f.clone();
        }
        if self.full {
            cfg.segmented = false;
        }
        if self.keep_update_files {
            cfg.keep_update_files = true;
        }
        if let Some(b) = self.buffer_size {
            cfg.buffer_size = b;
        }
        if let Some(t) = self.timeout {
            cfg.io_timeout_secs = Some(t);
        }
        if cfg.fingerprint.is_empty() {
            cfg.fingerprint = default_fingerprint();
        }
        Ok(cfg)
    }
}

/// Hex SHA-256 of the host name; stable per machine.
pub fn default_fingerprint() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_string());
    fingerprint_for(&host)
}

pub fn fingerprint_for(host: &str) -> String {
    let digest = Sha256::digest(host.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
