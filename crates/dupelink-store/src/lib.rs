//! Persistent fingerprint store for dupelink.
//!
//! The store is a single SQLite table of [`FileRecord`]s keyed by absolute
//! path. It lets repeated runs skip re-hashing files whose size has not
//! changed, and it seeds the dedup index across runs.
//!
//! SQLite tolerates many readers but one writer, so the two sides are kept
//! apart:
//!
//! - [`FileStore`] answers point lookups from a small pool of query-only
//!   connections and can be shared by reference between workers.
//! - [`StoreWriter`] owns the only read-write connection on a dedicated
//!   thread and applies queued [`StoreOp`]s one at a time.
//!
//! ```rust,no_run
//! use dupelink_store::{FileStore, StoreWriter};
//!
//! let store = FileStore::open("hashes.db").unwrap();
//! let writer = StoreWriter::spawn(&store, 16).unwrap();
//! // ... workers call store.lookup() and writer.enqueue() ...
//! let stats = writer.finish();
//! println!("{} records written", stats.written);
//! ```
//!
//! The [`interchange`] module reads and writes the flat `{hash: path}` JSON
//! documents used to load, save, import and export an index.

mod db;
mod error;
pub mod interchange;
mod writer;

pub use db::FileStore;
pub use error::{StoreError, StoreResult};
pub use writer::{StoreOp, StoreWriter, WriterStats};

pub use dupelink_core::FileRecord;
