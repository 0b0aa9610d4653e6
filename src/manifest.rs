//! Version and patch manifests
//!
//! Version manifest text: `locale1:version1:locale2:version2:...`
//!
//! Patch manifest text, one record per line, nine positional fields:
//! `archive:locale:sequence:storage_name:slot0:slot1:slot2:slot3:path_fragment`

use crate::error::{IoResultExt, LineFault, PatchError, Result};
use crate::protocol::layout;
use crate::protocol_core::ensure_dir_exists;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Latest server version per locale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionManifest {
    versions: BTreeMap<String, u32>,
}

impl VersionManifest {
    /// Parse the seek response. A version that fails to parse counts as 0;
    /// a trailing locale without a version is ignored.
    pub fn parse(text: &str) -> Self {
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        let mut versions = BTreeMap::new();
        if text.is_empty() {
            return Self { versions };
        }
        let fields: Vec<&str> = text.split(':').collect();
        for pair in fields.chunks_exact(2) {
            let locale = pair[0].trim();
            if locale.is_empty() {
                continue;
            }
            let version = pair[1].trim().parse().unwrap_or(0);
            versions.insert(locale.to_string(), version);
        }
        Self { versions }
    }

    pub fn get(&self, locale: &str) -> Option<u32> {
        self.versions.get(locale).copied()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Target version if the server is ahead of `local` for `locale`.
    pub fn update_target(&self, locale: &str, local: u32) -> Option<u32> {
        self.get(locale).filter(|&remote| remote > local)
    }
}

impl fmt::Display for VersionManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (locale, version) in &self.versions {
            if !first {
                f.write_str(":")?;
            }
            write!(f, "{locale}:{version}")?;
            first = false;
        }
        Ok(())
    }
}

pub const ENTRY_FIELDS: usize = 9;

/// One file needed to reach a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchManifestEntry {
    pub archive: String,
    pub locale: String,
    pub sequence: u32,
    pub storage_name: String,
    /// Size/hash slots; compared byte-for-byte, never interpreted.
    pub slots: [String; 4],
    pub path_fragment: String,
}

impl PatchManifestEntry {
    fn parse(line: &str, line_no: usize) -> Result<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() != ENTRY_FIELDS {
            return Err(PatchError::ManifestCorrupt {
                line: line_no,
                fault: LineFault::FieldCount(fields.len()),
            });
        }
        let sequence = fields[2]
            .trim()
            .parse()
            .map_err(|_| PatchError::ManifestCorrupt {
                line: line_no,
                fault: LineFault::BadSequence(fields[2].to_string()),
            })?;
        Ok(Self {
            archive: fields[0].to_string(),
            locale: fields[1].to_string(),
            sequence,
            storage_name: fields[3].to_string(),
            slots: [
                fields[4].to_string(),
                fields[5].to_string(),
                fields[6].to_string(),
                fields[7].to_string(),
            ],
            path_fragment: fields[8].to_string(),
        })
    }

    /// Remote key: `<locale><pathFragment><storageName>`.
    pub fn download_key(&self, session_locale: &str) -> String {
        format!(
            "{}{}{}",
            session_locale, self.path_fragment, self.storage_name
        )
    }
}

/// Ordered file list for one target version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchManifest {
    pub version: u32,
    pub entries: Vec<PatchManifestEntry>,
}

impl PatchManifest {
    /// Parse the manifest text. Blank lines are skipped; line numbers in
    /// errors are 1-based.
    pub fn parse(version: u32, text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            entries.push(PatchManifestEntry::parse(line, idx + 1)?);
        }
        Ok(Self { version, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `<client>/.manifests/<LOCALE><version>.tpf`
pub fn manifest_path(client_dir: &Path, locale: &str, version: u32) -> PathBuf {
    client_dir.join(layout::MANIFEST_DIR).join(format!(
        "{}{}.{}",
        locale.to_ascii_uppercase(),
        version,
        layout::MANIFEST_EXT
    ))
}

/// Write the raw manifest bytes. An existing file for the same version is
/// overwritten.
pub fn persist_manifest(
    client_dir: &Path,
    locale: &str,
    version: u32,
    raw: &[u8],
) -> Result<PathBuf> {
    let path = manifest_path(client_dir, locale, version);
    if let Some(dir) = path.parent() {
        ensure_dir_exists(dir)?;
    }
    std::fs::write(&path, raw).at(&path)?;
    Ok(path)
}
