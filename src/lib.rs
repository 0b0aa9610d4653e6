//! Patchsync Library
//!
//! Client-side patch synchronization: authenticate to a patch server, find the
//! latest version for a locale, and walk the local install up to it.

pub mod auth;
pub mod cli;
pub mod commit;
pub mod config;
pub mod error;
pub mod events;
pub mod log;
pub mod logger;
pub mod manifest;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod session;
pub mod transfer;
pub mod url;
pub mod version;

pub use cli::Args;
pub use commit::{Archive, ArchiveNotice, DirectoryArchive, FileNameDecoder, IdentityDecoder};
pub use config::UpdaterConfig;
pub use error::{PatchError, Result};
pub use events::{Notifier, Progress, Status};
pub use session::{UpdateOutcome, UpdateSession};
pub use version::{commit_local_version, load_local_version};
