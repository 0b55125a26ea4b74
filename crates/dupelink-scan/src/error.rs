//! Run-level errors.

use thiserror::Error;

use dupelink_core::ScanError;
use dupelink_store::StoreError;

/// Fatal error that aborts a run.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The root or the configuration is unusable.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The configured store could not be opened, seeded or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The worker pool could not be started.
    #[error("Cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
