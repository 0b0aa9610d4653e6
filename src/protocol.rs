//! Shared protocol constants for the patch server transport

// Maximum frame payload size (64MB) - prevents DoS via memory exhaustion
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

// Default patch server port when an address omits one
pub const DEFAULT_PORT: u16 = 9034;

/// Width of the raw length header that precedes every file download body.
/// The server sends an `i64` little-endian; 32-bit headers are not accepted.
pub const TRANSFER_LENGTH_BYTES: usize = 8;

// Authentication response codes (framed i32 LE payload)
pub mod auth_code {
    pub const CHALLENGE: i32 = 511;
    pub const ACCEPTED: i32 = 202;
}

// Request vocabulary. Every request is one framed ASCII string.
pub mod command {
    pub const SEEK: &str = "update-seek";
    pub const GET: &str = "update-get";
    pub const DOWNLOAD: &str = "update-download";

    /// `update-get:<segmented>:<localVersion>:<locale>`
    pub fn get(segmented: bool, local_version: u32, locale: &str) -> String {
        // The server parses the flag with a case-sensitive boolean parser
        let flag = if segmented { "True" } else { "False" };
        format!("{GET}:{flag}:{local_version}:{locale}")
    }

    /// `update-download:<key>`
    pub fn download(key: &str) -> String {
        format!("{DOWNLOAD}:{key}")
    }
}

// Local on-disk layout inside the client directory
pub mod layout {
    pub const VERSION_FILE: &str = "patch.ver";
    pub const MANIFEST_DIR: &str = ".manifests";
    pub const PATCH_DIR: &str = ".patches";
    pub const MANIFEST_EXT: &str = "tpf";
    pub const JOURNAL_FILE: &str = ".patch_journal.jsonl";
}

// Transfer buffer bounds. Buffer size never affects correctness, only the
// granularity of progress notifications.
pub mod buffer {
    pub const DEFAULT: usize = 1024;
    pub const MIN: usize = 64;
    pub const MAX: usize = 1024 * 1024;

    pub fn clamp(size: usize) -> usize {
        size.clamp(MIN, MAX)
    }
}
