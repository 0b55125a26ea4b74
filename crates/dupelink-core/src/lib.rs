//! Core types and traits for dupelink.
//!
//! This crate provides the fundamental data structures shared by the
//! store, the link operations and the scanner: configuration, content
//! fingerprints, persisted file records, volume identity and the
//! lexical path helpers used for link eligibility.

mod config;
mod error;
pub mod paths;
mod record;
mod volume;

pub use config::{DedupConfig, DedupConfigBuilder, DedupConfigBuilderError};
pub use error::{HashParseError, ScanError, ScanWarning, WarningKind};
pub use record::{ContentHash, FileRecord, InodeInfo};
pub use volume::{FsVolumes, VolumeId, VolumeProbe};
