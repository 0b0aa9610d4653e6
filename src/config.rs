//! Updater configuration, loadable from TOML and overridden by the CLI

use crate::protocol::{buffer, layout};
use crate::url::{parse_server_addr, ServerAddr};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdaterConfig {
    pub server: String,
    pub locale: String,
    pub client_dir: PathBuf,
    pub fingerprint: String,
    /// Walk every intermediate version instead of one jump.
    pub segmented: bool,
    pub keep_update_files: bool,
    pub buffer_size: usize,
    /// Store downloads under `.patches/<version>/`.
    pub namespace_by_version: bool,
    /// Archive location, relative to `client_dir` unless absolute.
    pub archive_path: PathBuf,
    /// Per read/write deadline. Absent means block until the peer answers.
    pub io_timeout_secs: Option<u64>,
    pub journal: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", crate::protocol::DEFAULT_PORT),
            locale: "us".to_string(),
            client_dir: PathBuf::from("."),
            fingerprint: String::new(),
            segmented: true,
            keep_update_files: false,
            buffer_size: buffer::DEFAULT,
            namespace_by_version: true,
            archive_path: PathBuf::from("content"),
            io_timeout_secs: None,
            journal: true,
        }
    }
}

impl UpdaterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: UpdaterConfig =
            toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn server_addr(&self) -> Result<ServerAddr> {
        parse_server_addr(&self.server)
            .with_context(|| format!("invalid server address: {:?}", self.server))
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_secs
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
    }

    pub fn effective_buffer_size(&self) -> usize {
        buffer::clamp(self.buffer_size)
    }

    pub fn archive_location(&self) -> PathBuf {
        if self.archive_path.is_absolute() {
            self.archive_path.clone()
        } else {
            self.client_dir.join(&self.archive_path)
        }
    }

    pub fn patch_dir(&self, version: u32) -> PathBuf {
        let base = self.client_dir.join(layout::PATCH_DIR);
        if self.namespace_by_version {
            base.join(version.to_string())
        } else {
            base
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.server_addr()?;
        if self.locale.is_empty() || self.locale.contains([':', '/', '\\']) {
            anyhow::bail!("invalid locale: {:?}", self.locale);
        }
        if self.fingerprint.is_empty() {
            anyhow::bail!("fingerprint must not be empty");
        }
        if !self.fingerprint.is_ascii() {
            anyhow::bail!("fingerprint must be ASCII: {:?}", self.fingerprint);
        }
        Ok(())
    }
}
