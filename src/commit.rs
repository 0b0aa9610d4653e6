//! Version commit: hand downloaded files to the archive, then advance the
//! local version marker.

use crate::error::{IoResultExt, PatchError, Result};
use crate::events::{Notifier, Status};
use crate::version::commit_local_version;
use std::path::{Component, Path, PathBuf};

/// Notices raised by the archive while it loads or imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveNotice {
    Message(String),
    Warning(String),
    ProgressChanged(u8),
}

impl From<ArchiveNotice> for Status {
    fn from(n: ArchiveNotice) -> Self {
        match n {
            ArchiveNotice::Message(m) => Status::ArchiveMessage(m),
            ArchiveNotice::Warning(m) => Status::ArchiveWarning(m),
            ArchiveNotice::ProgressChanged(p) => Status::ArchiveProgress(p),
        }
    }
}

/// Content container that ingests fetched files by logical name.
pub trait Archive {
    fn load(&mut self, path: &Path) -> anyhow::Result<()>;
    fn import_file_entry(&mut self, name: &str, data: &[u8]) -> anyhow::Result<()>;
    /// Drain notices raised since the last call.
    fn take_notices(&mut self) -> Vec<ArchiveNotice> {
        Vec::new()
    }
}

/// Maps an obfuscated storage name back to its logical file name.
pub trait FileNameDecoder {
    fn decode(&self, storage_name: &str) -> String;
}

impl<F> FileNameDecoder for F
where
    F: Fn(&str) -> String,
{
    fn decode(&self, storage_name: &str) -> String {
        self(storage_name)
    }
}

pub struct IdentityDecoder;

impl FileNameDecoder for IdentityDecoder {
    fn decode(&self, storage_name: &str) -> String {
        storage_name.to_string()
    }
}

pub(crate) fn relay_notices(archive: &mut dyn Archive, notifier: &mut Notifier) {
    for notice in archive.take_notices() {
        notifier.status(notice.into());
    }
}

/// Import every file of `version`, drop the raw downloads unless asked to
/// keep them, and only then write the new version marker. Returns the
/// number of bytes imported.
pub fn commit_version(
    client_dir: &Path,
    version: u32,
    files: &[PathBuf],
    archive: &mut dyn Archive,
    decoder: &dyn FileNameDecoder,
    keep_update_files: bool,
    notifier: &mut Notifier,
) -> Result<u64> {
    let mut imported = 0u64;
    for path in files {
        let storage_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PatchError::Protocol(format!("no file name in {}", path.display())))?;
        let logical = decoder.decode(&storage_name);
        let data = std::fs::read(path).at(path)?;
        let res = archive.import_file_entry(&logical, &data);
        relay_notices(archive, notifier);
        res.map_err(|e| PatchError::Archive(format!("{logical}: {e:#}")))?;
        imported += data.len() as u64;
    }

    if !keep_update_files {
        for path in files {
            std::fs::remove_file(path).at(path)?;
        }
    }

    commit_local_version(client_dir, version)?;
    notifier.status(Status::VersionCommitted { version });
    notifier.version_changed(version);
    Ok(imported)
}

/// Plain-directory archive: each imported entry becomes a file under the
/// loaded root.
#[derive(Default)]
pub struct DirectoryArchive {
    root: Option<PathBuf>,
    notices: Vec<ArchiveNotice>,
}

impl DirectoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_path(root: &Path, name: &str) -> anyhow::Result<PathBuf> {
        let mut safe = PathBuf::new();
        for component in Path::new(name).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(s) => safe.push(s),
                other => anyhow::bail!("entry name contains disallowed component: {:?}", other),
            }
        }
        if safe.as_os_str().is_empty() {
            anyhow::bail!("empty entry name");
        }
        Ok(root.join(safe))
    }
}

impl Archive for DirectoryArchive {
    fn load(&mut self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;
        std::fs::create_dir_all(path)
            .with_context(|| format!("create archive root {}", path.display()))?;
        self.notices
            .push(ArchiveNotice::Message(format!("loaded {}", path.display())));
        self.root = Some(path.to_path_buf());
        Ok(())
    }

    fn import_file_entry(&mut self, name: &str, data: &[u8]) -> anyhow::Result<()> {
        use anyhow::Context;
        let root = self
            .root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("archive not loaded"))?;
        let dst = Self::entry_path(root, name)?;
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if dst.exists() {
            self.notices
                .push(ArchiveNotice::Warning(format!("replacing {name}")));
        }
        std::fs::write(&dst, data).with_context(|| format!("write {}", dst.display()))?;
        self.notices.push(ArchiveNotice::Message(format!(
            "imported {} ({} bytes)",
            name,
            data.len()
        )));
        Ok(())
    }

    fn take_notices(&mut self) -> Vec<ArchiveNotice> {
        std::mem::take(&mut self.notices)
    }
}
