//! One update session: connect, authenticate, discover the target version,
//! then fetch, transfer and commit one version increment at a time.

use crate::auth::authenticate;
use crate::commit::{commit_version, relay_notices, Archive, FileNameDecoder, IdentityDecoder};
use crate::config::UpdaterConfig;
use crate::error::{PatchError, Result};
use crate::events::{Notifier, Status};
use crate::log::{JournalEntry, UpdateJournal, UpdateStatus};
use crate::logger::{Logger, NoopLogger};
use crate::manifest::{persist_manifest, PatchManifest, VersionManifest};
use crate::protocol::command;
use crate::protocol_core::{connect, ensure_dir_exists, Connection};
use crate::transfer::download_entry;
use crate::url::ServerAddr;
use crate::version::load_local_version;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate {
        version: u32,
    },
    Updated {
        from: u32,
        to: u32,
        files: u64,
        bytes: u64,
    },
}

/// Send `update-seek` and parse the per-locale version list.
pub async fn seek_versions<S>(conn: &mut Connection<S>) -> Result<VersionManifest>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.write_command(command::SEEK).await?;
    let payload = conn.read_framed().await?;
    let text = String::from_utf8(payload)
        .map_err(|e| PatchError::Protocol(format!("version manifest is not UTF-8: {e}")))?;
    Ok(VersionManifest::parse(&text))
}

/// Send `update-get` and read the incoming version plus raw manifest bytes.
pub async fn fetch_patch_manifest<S>(
    conn: &mut Connection<S>,
    segmented: bool,
    local_version: u32,
    locale: &str,
) -> Result<(u32, Vec<u8>)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.write_command(&command::get(segmented, local_version, locale))
        .await?;
    let incoming = conn.read_i32("incoming version").await?;
    let incoming = u32::try_from(incoming)
        .map_err(|_| PatchError::Protocol(format!("negative incoming version: {incoming}")))?;
    let raw = conn.read_framed().await?;
    Ok((incoming, raw))
}

struct StepStats {
    version: u32,
    files: u64,
    bytes: u64,
}

pub struct UpdateSession {
    config: UpdaterConfig,
    addr: ServerAddr,
    notifier: Notifier,
    logger: Arc<dyn Logger>,
    archive: Box<dyn Archive + Send>,
    decoder: Box<dyn FileNameDecoder + Send + Sync>,
    journal: Option<UpdateJournal>,
}

impl UpdateSession {
    pub fn new(config: UpdaterConfig, archive: Box<dyn Archive + Send>) -> anyhow::Result<Self> {
        config.validate()?;
        let addr = config.server_addr()?;
        let journal = config
            .journal
            .then(|| UpdateJournal::new(&config.client_dir));
        Ok(Self {
            config,
            addr,
            notifier: Notifier::new(),
            logger: Arc::new(NoopLogger),
            archive,
            decoder: Box::new(IdentityDecoder),
            journal,
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_decoder(mut self, decoder: Box<dyn FileNameDecoder + Send + Sync>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn notifier(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    /// Full session over TCP. The local version is read before connecting.
    pub async fn run(&mut self) -> Result<UpdateOutcome> {
        let local = self.report(load_local_version(&self.config.client_dir))?;
        let addr = self.addr.to_string();
        self.notifier.status(Status::Connecting { addr: addr.clone() });
        self.logger.connect(&addr);
        let mut conn = self.report(connect(&addr, self.config.io_timeout()).await)?;
        let res = self.drive(&mut conn, local).await;
        conn.shutdown().await;
        self.report(res)
    }

    /// Same as [`run`](Self::run) over an already open stream. The stream is
    /// shut down on failure and left open on success.
    pub async fn run_with<S>(&mut self, conn: &mut Connection<S>) -> Result<UpdateOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let res = match load_local_version(&self.config.client_dir) {
            Ok(local) => self.drive(conn, local).await,
            Err(e) => Err(e),
        };
        if res.is_err() {
            conn.shutdown().await;
        }
        self.report(res)
    }

    fn report<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(e) = &res {
            let msg = e.to_string();
            self.logger.error("session", &msg);
            self.notifier.status(Status::Failed(msg));
        }
        res
    }

    async fn drive<S>(&mut self, conn: &mut Connection<S>, local: u32) -> Result<UpdateOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        authenticate(conn, &self.config.fingerprint, &mut self.notifier).await?;
        self.logger.authenticated();

        let versions = seek_versions(conn).await?;
        let locale = self.config.locale.clone();
        self.logger.versions(&locale, local, versions.get(&locale));
        let Some(target) = versions.update_target(&locale, local) else {
            self.notifier.status(Status::UpToDate { local });
            return Ok(UpdateOutcome::UpToDate { version: local });
        };
        self.notifier
            .status(Status::UpdateAvailable { local, target });

        let archive_path = self.config.archive_location();
        let loaded = self.archive.load(&archive_path);
        relay_notices(&mut *self.archive, &mut self.notifier);
        loaded.map_err(|e| PatchError::Archive(format!("load {}: {e:#}", archive_path.display())))?;

        let mut current = local;
        let (mut files, mut bytes) = (0u64, 0u64);
        while current < target {
            self.journal_entry(JournalEntry::new(&locale, current, target, UpdateStatus::InProgress));
            match self.update_once(conn, current).await {
                Ok(step) => {
                    let mut entry =
                        JournalEntry::new(&locale, current, step.version, UpdateStatus::Completed);
                    entry.files = step.files;
                    entry.bytes_transferred = step.bytes;
                    self.journal_entry(entry);
                    current = step.version;
                    files += step.files;
                    bytes += step.bytes;
                }
                Err(e) => {
                    let mut entry =
                        JournalEntry::new(&locale, current, target, UpdateStatus::Failed);
                    entry.error = Some(e.to_string());
                    self.journal_entry(entry);
                    return Err(e);
                }
            }
        }

        self.logger.done(
            local,
            current,
            files,
            bytes,
            started.elapsed().as_secs_f64(),
        );
        Ok(UpdateOutcome::Updated {
            from: local,
            to: current,
            files,
            bytes,
        })
    }

    /// One manifest fetch, one transfer per entry, one commit.
    async fn update_once<S>(&mut self, conn: &mut Connection<S>, current: u32) -> Result<StepStats>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let locale = &self.config.locale;
        let client_dir = &self.config.client_dir;
        let (incoming, raw) =
            fetch_patch_manifest(conn, self.config.segmented, current, locale).await?;
        if incoming <= current {
            return Err(PatchError::Protocol(format!(
                "server offered version {incoming} while at {current}"
            )));
        }
        // Persisted before any further request goes out.
        let manifest_file = persist_manifest(client_dir, locale, incoming, &raw)?;
        let text = String::from_utf8(raw)
            .map_err(|e| PatchError::Protocol(format!("manifest {incoming} is not UTF-8: {e}")))?;
        let manifest = PatchManifest::parse(incoming, &text)?;
        self.notifier.status(Status::ManifestReceived {
            version: incoming,
            entries: manifest.len(),
        });
        self.logger
            .manifest(incoming, manifest.len(), &manifest_file);

        let patch_dir = self.config.patch_dir(incoming);
        ensure_dir_exists(&patch_dir)?;
        let buffer_size = self.config.effective_buffer_size();
        let mut written: Vec<PathBuf> = Vec::with_capacity(manifest.len());
        let mut bytes = 0u64;
        for entry in &manifest.entries {
            let session = download_entry(
                conn,
                entry,
                locale,
                &patch_dir,
                buffer_size,
                &mut self.notifier,
            )
            .await?;
            self.logger.file_done(&entry.storage_name, session.total);
            bytes += session.total;
            if !written.contains(&session.destination) {
                written.push(session.destination);
            }
        }

        let imported = commit_version(
            client_dir,
            incoming,
            &written,
            &mut *self.archive,
            &*self.decoder,
            self.config.keep_update_files,
            &mut self.notifier,
        )?;
        self.logger.commit(incoming, imported);
        if self.config.namespace_by_version && !self.config.keep_update_files {
            // Leftovers from an earlier interrupted run keep the directory alive
            if let Err(e) = std::fs::remove_dir(&patch_dir) {
                self.logger
                    .error("cleanup", &format!("{}: {e}", patch_dir.display()));
            }
        }
        Ok(StepStats {
            version: incoming,
            files: written.len() as u64,
            bytes,
        })
    }

    fn journal_entry(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.add_entry(&entry) {
                self.logger.error("journal", &format!("{e:#}"));
            }
        }
    }
}
