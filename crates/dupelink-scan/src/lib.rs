//! Duplicate detection engine for dupelink.
//!
//! A [`Deduper`] walks a root, fingerprints every regular file with BLAKE3
//! on a fixed-width worker pool, and keeps a [`DedupIndex`] mapping each
//! fingerprint to the first path seen with it. Later paths with the same
//! content are duplicates; depending on the configuration they are
//! replaced by a hardlink or a relative symlink to the canonical file.
//!
//! # Example
//!
//! ```rust,no_run
//! use dupelink_core::DedupConfig;
//! use dupelink_scan::Deduper;
//!
//! let config = DedupConfig::builder().hardlink(true).build().unwrap();
//! let mut deduper = Deduper::new(config).unwrap();
//! let report = deduper.run("/srv/photos".as_ref()).unwrap();
//!
//! println!("{} duplicate bytes", report.savings_bytes);
//! ```
//!
//! # Persistent store
//!
//! With `database` configured, fingerprints are remembered across runs.
//! A file whose size matches its stored record is not read again, and the
//! index starts out seeded with every stored fingerprint.

mod error;
mod fingerprint;
mod index;
mod pool;
mod report;
mod scanner;
mod walker;

pub use error::DedupError;
pub use fingerprint::{MMAP_THRESHOLD, fingerprint_file, fingerprint_reader};
pub use index::{Decision, DedupIndex};
pub use report::RunReport;
pub use scanner::Deduper;

// Re-export core types for convenience
pub use dupelink_core::{ContentHash, DedupConfig, ScanError, ScanWarning, WarningKind};
