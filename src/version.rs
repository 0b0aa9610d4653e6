//! Persisted local version marker (`patch.ver`, 4-byte little-endian)

use crate::error::{IoResultExt, PatchError, Result};
use crate::protocol::layout::VERSION_FILE;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub fn version_path(client_dir: &Path) -> PathBuf {
    client_dir.join(VERSION_FILE)
}

/// Read the installed version. A missing marker means a fresh install (0).
pub fn load_local_version(client_dir: &Path) -> Result<u32> {
    let path = version_path(client_dir);
    let data = match std::fs::read(&path) {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(PatchError::local(&path, e)),
    };
    let raw: [u8; 4] = data.as_slice().try_into().map_err(|_| {
        PatchError::local(
            &path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("version marker must be 4 bytes, found {}", data.len()),
            ),
        )
    })?;
    Ok(u32::from_le_bytes(raw))
}

/// Durably replace the marker. Readers see either the old or the new value.
pub fn commit_local_version(client_dir: &Path, version: u32) -> Result<()> {
    let path = version_path(client_dir);
    std::fs::create_dir_all(client_dir).at(client_dir)?;
    // atomic write
    let mut tmp = tempfile::NamedTempFile::new_in(client_dir).at(client_dir)?;
    tmp.write_all(&version.to_le_bytes()).at(tmp.path())?;
    tmp.as_file().sync_all().at(tmp.path())?;
    tmp.persist(&path).map_err(|e| PatchError::local(&path, e.error))?;
    Ok(())
}
