//! Content fingerprints and persisted file records.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HashParseError;
use crate::volume::VolumeId;

/// Timestamp layout shared with SQLite's `CURRENT_TIMESTAMP`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// BLAKE3 content hash identifying file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a 64-digit hex string.
    pub fn from_hex(value: &str) -> Result<Self, HashParseError> {
        let reject = |reason| HashParseError {
            value: value.to_string(),
            reason,
        };

        if value.len() != 64 {
            return Err(reject("expected 64 hex digits"));
        }

        let mut bytes = [0u8; 32];
        for (i, chunk) in value.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| reject("not ASCII"))?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| reject("not a hex digit"))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Inode information used to recognise files that are already hardlinked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InodeInfo {
    /// Inode number.
    pub inode: u64,
    /// Device ID.
    pub device: u64,
}

impl InodeInfo {
    /// Create new inode info.
    pub fn new(inode: u64, device: u64) -> Self {
        Self { inode, device }
    }

    /// Read inode information from metadata, where the platform has it.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self::new(metadata.ino(), metadata.dev()))
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// One persisted row per known absolute file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Content fingerprint. Not unique across records.
    pub hash: ContentHash,
    /// Absolute path, unique key of the store.
    pub path: PathBuf,
    /// Volume the file lived on when it was recorded.
    pub device_id: Option<VolumeId>,
    /// Size in bytes. Absent for rows imported from an interchange file.
    pub size: Option<u64>,
    /// Last modification time of the file.
    pub modified_time: Option<DateTime<Utc>>,
    /// Last time this path was verified against the filesystem.
    pub checked_time: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Create a record for a freshly fingerprinted file.
    pub fn new(
        hash: ContentHash,
        path: impl Into<PathBuf>,
        device_id: Option<VolumeId>,
        size: u64,
        modified: Option<SystemTime>,
    ) -> Self {
        Self {
            hash,
            path: path.into(),
            device_id,
            size: Some(size),
            modified_time: modified.map(DateTime::<Utc>::from),
            checked_time: None,
        }
    }

    /// True if the stored size equals `size`. This is the whole cheap-skip
    /// test: content is trusted unchanged when the size is.
    pub fn matches_size(&self, size: u64) -> bool {
        self.size == Some(size)
    }

    /// Format a timestamp the way the store writes it.
    pub fn format_time(time: &DateTime<Utc>) -> String {
        time.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Parse a stored timestamp. Empty or malformed values yield `None`.
    pub fn parse_time(value: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}
