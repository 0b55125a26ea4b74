//! Run configuration.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::paths;

/// Configuration for a dedup run. Built once at startup and passed by
/// reference to everything that needs it.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct DedupConfig {
    /// Number of hashing workers (0 = available parallelism).
    #[builder(default = "0")]
    pub workers: usize,

    /// Replace duplicates with hardlinks to the canonical file.
    #[builder(default = "false")]
    pub hardlink: bool,

    /// Replace duplicates with relative symlinks to the canonical file.
    #[builder(default = "false")]
    pub symlink: bool,

    /// Hardlinks are only made when both files lie under one of these
    /// prefixes. Empty means anywhere.
    #[builder(default)]
    pub hardlink_paths: Vec<PathBuf>,

    /// Report less.
    #[builder(default = "false")]
    pub quiet: bool,

    /// Report more.
    #[builder(default = "false")]
    pub verbose: bool,

    /// SQLite store remembering fingerprints across runs.
    #[builder(default)]
    pub database: Option<PathBuf>,

    /// JSON index seeding the run. Takes precedence over the store.
    #[builder(default)]
    pub load_index: Option<PathBuf>,

    /// Where to write the final index as JSON.
    #[builder(default)]
    pub save_index: Option<PathBuf>,

    /// Store writer queue capacity, as a multiple of the worker count.
    #[builder(default = "2")]
    pub writer_buffer_factor: usize,
}

impl DedupConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.writer_buffer_factor == Some(0) {
            return Err("writer_buffer_factor must be at least 1".to_string());
        }
        if let Some(ref prefixes) = self.hardlink_paths {
            if prefixes.iter().any(|p| p.as_os_str().is_empty()) {
                return Err("hardlink_paths cannot contain an empty path".to_string());
            }
        }
        Ok(())
    }
}

impl DedupConfig {
    /// Create a new config builder.
    pub fn builder() -> DedupConfigBuilder {
        DedupConfigBuilder::default()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ScanError> {
        let config: Self = toml::from_str(source).map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.check()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ScanError> {
        let source = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        Self::from_toml_str(&source)
    }

    /// Re-run builder validation on a value that bypassed the builder.
    pub fn check(&self) -> Result<(), ScanError> {
        let builder = DedupConfigBuilder {
            writer_buffer_factor: Some(self.writer_buffer_factor),
            hardlink_paths: Some(self.hardlink_paths.clone()),
            ..Default::default()
        };
        builder
            .validate()
            .map_err(|message| ScanError::InvalidConfig { message })
    }

    /// Pool width actually used.
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    /// Capacity of the store writer queue.
    pub fn writer_capacity(&self) -> usize {
        self.effective_workers() * self.writer_buffer_factor.max(1)
    }

    /// Hardlink allow-list as absolute, cleaned prefixes. Entries that
    /// cannot be made absolute are dropped.
    pub fn allowed_hardlink_paths(&self) -> Vec<PathBuf> {
        self.hardlink_paths
            .iter()
            .filter_map(|p| paths::absolutize(p).ok())
            .collect()
    }

    /// Default log filter directive for the configured verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            hardlink: false,
            symlink: false,
            hardlink_paths: Vec::new(),
            quiet: false,
            verbose: false,
            database: None,
            load_index: None,
            save_index: None,
            writer_buffer_factor: 2,
        }
    }
}
