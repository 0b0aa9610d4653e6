//! Chunked file download from the patch connection

use crate::error::{IoResultExt, PatchError, Result};
use crate::events::Notifier;
use crate::manifest::PatchManifestEntry;
use crate::protocol::command;
use crate::protocol_core::{ensure_parent_exists, Connection};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Book-keeping for one file download. `received <= total` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    pub destination: PathBuf,
    pub total: u64,
    pub received: u64,
}

impl TransferSession {
    pub fn new(destination: PathBuf, total: u64) -> Self {
        Self {
            destination,
            total,
            received: 0,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.total - self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.total
    }

    fn advance(&mut self, n: usize) {
        self.received += n as u64;
        debug_assert!(self.received <= self.total);
    }
}

/// Stream `total` bytes from `conn` into `destination`, creating or
/// truncating it. Progress fires after every chunk with the running count.
///
/// On failure the partial file stays on disk; callers must not import it.
pub async fn receive_to_file<S>(
    conn: &mut Connection<S>,
    destination: &Path,
    total: u64,
    label: &str,
    buffer_size: usize,
    notifier: &mut Notifier,
) -> Result<TransferSession>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ensure_parent_exists(destination)?;
    let mut file = tokio::fs::File::create(destination)
        .await
        .at(destination)?;
    let mut session = TransferSession::new(destination.to_path_buf(), total);
    let mut buf = vec![0u8; buffer_size.max(1)];
    while !session.is_complete() {
        let to_read = session.remaining().min(buf.len() as u64) as usize;
        let n = match conn.read_chunk(&mut buf[..to_read]).await {
            Ok(n) => n,
            Err(e) => {
                // Land what arrived so the partial file matches `received`
                let _ = file.flush().await;
                return Err(e);
            }
        };
        file.write_all(&buf[..n]).await.at(destination)?;
        session.advance(n);
        notifier.progress(label, session.received, session.total);
    }
    file.flush().await.at(destination)?;
    file.sync_all().await.at(destination)?;
    Ok(session)
}

/// Request one manifest entry and write it under `patch_dir`.
pub async fn download_entry<S>(
    conn: &mut Connection<S>,
    entry: &PatchManifestEntry,
    locale: &str,
    patch_dir: &Path,
    buffer_size: usize,
    notifier: &mut Notifier,
) -> Result<TransferSession>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if entry.storage_name.is_empty()
        || entry.storage_name.contains(['/', '\\'])
        || entry.storage_name == ".."
    {
        return Err(PatchError::Protocol(format!(
            "unsafe storage name {:?}",
            entry.storage_name
        )));
    }
    let key = entry.download_key(locale);
    conn.write_command(&command::download(&key)).await?;
    let total = conn.read_transfer_length().await?;
    let destination = patch_dir.join(&entry.storage_name);
    receive_to_file(
        conn,
        &destination,
        total,
        &entry.storage_name,
        buffer_size,
        notifier,
    )
    .await
}
