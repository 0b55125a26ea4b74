//! Per-root run report.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use dupelink_core::ScanWarning;
use dupelink_store::WriterStats;

/// What one run over one root did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Absolute root that was processed.
    #[serde(serialize_with = "dupelink_core::paths::serialize_lossy")]
    pub root: PathBuf,
    /// Regular files handed to the workers.
    pub files_seen: u64,
    /// Files whose content was read and fingerprinted.
    pub files_hashed: u64,
    /// Files whose stored fingerprint was trusted because the size matched.
    pub cheap_skips: u64,
    /// Files found to duplicate a canonical path.
    pub duplicates: u64,
    /// Duplicates replaced by a hardlink.
    pub hardlinks: u64,
    /// Duplicates replaced by a symlink.
    pub symlinks: u64,
    /// Link transactions that failed and were rolled back.
    pub link_failures: u64,
    /// Total size of all duplicates, linked or not.
    pub savings_bytes: u64,
    /// Non-fatal problems, one per skipped file or failed link.
    pub warnings: Vec<ScanWarning>,
    /// Wall-clock time of the run.
    pub duration: Duration,
    /// Store writer totals, when a store is configured.
    pub writer: Option<WriterStats>,
}

impl RunReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
