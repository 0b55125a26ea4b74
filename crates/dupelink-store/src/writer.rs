//! Single-writer task for the fingerprint store.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use dupelink_core::FileRecord;

use crate::db::{self, FileStore};
use crate::error::{StoreError, StoreResult};

/// A mutation queued for the writer.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Insert or refresh the full record of a freshly hashed file.
    Record(FileRecord),
    /// Mark a known path as verified now, leaving the rest of its row alone.
    TouchChecked(PathBuf),
}

/// What the writer did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterStats {
    /// Records inserted or refreshed.
    pub written: u64,
    /// `checked_time` refreshes applied.
    pub touched: u64,
    /// Operations that failed and were skipped.
    pub failed: u64,
}

/// Owns the only read-write connection and applies queued operations on a
/// dedicated thread, one at a time.
///
/// Producers call [`enqueue`](Self::enqueue) or
/// [`touch_checked`](Self::touch_checked); these only block once the
/// bounded queue is full. A failing operation is logged and counted and
/// the writer moves on to the next one.
pub struct StoreWriter {
    tx: Sender<StoreOp>,
    handle: JoinHandle<WriterStats>,
}

impl StoreWriter {
    /// Open the writer connection and start the writer thread with a queue
    /// of `capacity` operations.
    pub fn spawn(store: &FileStore, capacity: usize) -> StoreResult<Self> {
        let conn = store.open_writer()?;
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));

        let handle = thread::Builder::new()
            .name("store-writer".to_string())
            .spawn(move || write_loop(conn, rx))
            .map_err(|e| StoreError::io(store.path(), e))?;

        Ok(Self { tx, handle })
    }

    /// Queue a full record write.
    pub fn enqueue(&self, record: FileRecord) -> StoreResult<()> {
        self.send(StoreOp::Record(record))
    }

    /// Queue a `checked_time` refresh for `path`.
    pub fn touch_checked(&self, path: PathBuf) -> StoreResult<()> {
        self.send(StoreOp::TouchChecked(path))
    }

    fn send(&self, op: StoreOp) -> StoreResult<()> {
        self.tx.send(op).map_err(|_| StoreError::WriterGone)
    }

    /// Close the queue, wait until every queued operation is applied, and
    /// return the writer's statistics.
    pub fn finish(self) -> WriterStats {
        drop(self.tx);
        match self.handle.join() {
            Ok(stats) => stats,
            Err(_) => {
                error!("store writer thread panicked");
                WriterStats::default()
            }
        }
    }
}

fn write_loop(conn: Connection, rx: Receiver<StoreOp>) -> WriterStats {
    let mut stats = WriterStats::default();

    for op in rx {
        match op {
            StoreOp::Record(record) => match db::upsert_record(&conn, &record) {
                Ok(()) => stats.written += 1,
                Err(e) => {
                    warn!(path = %record.path.display(), error = %e, "failed to store record");
                    stats.failed += 1;
                }
            },
            StoreOp::TouchChecked(path) => match db::touch_checked(&conn, &path) {
                Ok(_) => stats.touched += 1,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "could not update checked_time");
                    stats.failed += 1;
                }
            },
        }
    }

    debug!(
        written = stats.written,
        touched = stats.touched,
        failed = stats.failed,
        "store writer drained"
    );
    stats
}
