//! SQLite persistence for file records.
//!
//! One `file_hashes` table keyed by absolute path. Paths are stored as
//! UTF-8 text; paths that are not valid UTF-8 are refused rather than
//! stored lossily, since a lossy key names a different file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, warn};

use dupelink_core::{ContentHash, FileRecord, VolumeId, VolumeProbe};

use crate::error::{StoreError, StoreResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS file_hashes (
        id INTEGER PRIMARY KEY,
        hash TEXT NOT NULL,
        file_path TEXT NOT NULL UNIQUE,
        device_id TEXT,
        size INTEGER,
        modified_time DATETIME,
        checked_time DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_hash ON file_hashes(hash);
    CREATE INDEX IF NOT EXISTS idx_file_path ON file_hashes(file_path);
    CREATE INDEX IF NOT EXISTS idx_device_id ON file_hashes(device_id);
    CREATE INDEX IF NOT EXISTS idx_checked_time ON file_hashes(checked_time);";

const SELECT_RECORD: &str = "
    SELECT hash, file_path, device_id, size, modified_time, checked_time
    FROM file_hashes WHERE file_path = ?1";

const UPSERT_RECORD: &str = "
    INSERT INTO file_hashes (hash, file_path, device_id, size, modified_time, checked_time)
    VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)
    ON CONFLICT(file_path) DO UPDATE SET
        hash = excluded.hash,
        device_id = excluded.device_id,
        size = excluded.size,
        modified_time = excluded.modified_time,
        checked_time = CURRENT_TIMESTAMP";

const IMPORT_RECORD: &str = "
    INSERT OR IGNORE INTO file_hashes (hash, file_path, device_id) VALUES (?1, ?2, ?3)";

const TOUCH_CHECKED: &str =
    "UPDATE file_hashes SET checked_time = CURRENT_TIMESTAMP WHERE file_path = ?1";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle on the SQLite fingerprint store.
///
/// Lookups are served from a pool of query-only connections, so any number
/// of workers may read concurrently. Writes go through
/// [`StoreWriter`](crate::StoreWriter), except for the bulk import which
/// runs on its own connection in a single transaction.
pub struct FileStore {
    path: PathBuf,
    readers: Mutex<Vec<Connection>>,
}

impl FileStore {
    /// Open (creating if needed) the store at `path` and make sure the
    /// schema exists.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        open_read_write(&path)?.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "fingerprint store ready");

        Ok(Self {
            path,
            readers: Mutex::new(Vec::new()),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the read-write connection for the single writer.
    pub(crate) fn open_writer(&self) -> StoreResult<Connection> {
        open_read_write(&self.path)
    }

    /// Point lookup of the record for an absolute path.
    pub fn lookup(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        let key = path_key(path)?;
        let raw = self.with_reader(|conn| {
            conn.prepare_cached(SELECT_RECORD)?
                .query_row([key], RawRecord::from_row)
                .optional()
        })?;

        raw.map(RawRecord::into_record).transpose()
    }

    /// True iff a record exists for `path` and its stored size equals
    /// `size`. When it does, the stored hash is trusted without reading
    /// the file.
    pub fn cheap_skip_check(&self, path: &Path, size: u64) -> StoreResult<bool> {
        Ok(self
            .lookup(path)?
            .is_some_and(|record| record.matches_size(size)))
    }

    /// All `(hash, path)` pairs in insertion order.
    pub fn load_index_pairs(&self) -> StoreResult<Vec<(String, PathBuf)>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT hash, file_path FROM file_hashes ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, PathBuf::from(row.get::<_, String>(1)?)))
            })?;
            rows.collect()
        })
    }

    /// Number of stored records.
    pub fn count(&self) -> StoreResult<u64> {
        self.with_reader(|conn| {
            conn.query_row("SELECT COUNT(*) FROM file_hashes", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|n| u64::try_from(n).unwrap_or(0))
    }

    /// Insert `{hash: path}` pairs in one transaction, ignoring paths that
    /// are already stored and keys that are not valid fingerprints.
    ///
    /// The device of each path is read from `probe` and left empty for
    /// files that no longer exist. A row that fails to insert is logged and
    /// skipped. Returns the number of rows actually inserted.
    pub fn import_map(
        &self,
        map: &BTreeMap<String, PathBuf>,
        probe: &dyn VolumeProbe,
    ) -> StoreResult<usize> {
        let mut conn = open_read_write(&self.path)?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        let mut failed = 0usize;
        {
            let mut stmt = tx.prepare(IMPORT_RECORD)?;
            for (hash, path) in map {
                if let Err(e) = ContentHash::from_hex(hash) {
                    warn!(path = %path.display(), error = %e, "skipping import entry");
                    continue;
                }
                let device = probe
                    .volume_of(path)
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                let result = path_key(path).and_then(|key| {
                    stmt.execute(params![hash, key, device])
                        .map_err(StoreError::from)
                });
                match result {
                    Ok(n) => inserted += n,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "import entry failed");
                        failed += 1;
                    }
                }
            }
        }
        tx.commit()?;
        if failed > 0 {
            warn!(failed, inserted, "import finished with failures");
        }
        Ok(inserted)
    }

    /// Fold every stored pair into a `{hash: path}` map. When several
    /// paths share a hash, the most recently inserted one wins.
    pub fn export_map(&self) -> StoreResult<BTreeMap<String, PathBuf>> {
        Ok(self.load_index_pairs()?.into_iter().collect())
    }

    /// Run `f` on a pooled reader, opening a new one if all are in use.
    fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let pooled = self.pool().pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => open_reader(&self.path)?,
        };
        let result = f(&conn);
        self.pool().push(conn);
        Ok(result?)
    }

    fn pool(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}

/// Insert a freshly fingerprinted record, or refresh every field of the
/// existing row for that path.
pub(crate) fn upsert_record(conn: &Connection, record: &FileRecord) -> StoreResult<()> {
    let key = path_key(&record.path)?;
    conn.prepare_cached(UPSERT_RECORD)?.execute(params![
        record.hash.to_hex(),
        key,
        record.device_id.map(|v| v.to_string()),
        record.size.and_then(|s| i64::try_from(s).ok()),
        record.modified_time.as_ref().map(FileRecord::format_time),
    ])?;
    Ok(())
}

/// Refresh only `checked_time`. Returns whether a row matched.
pub(crate) fn touch_checked(conn: &Connection, path: &Path) -> StoreResult<bool> {
    let key = path_key(path)?;
    let changed = conn.prepare_cached(TOUCH_CHECKED)?.execute([key])?;
    Ok(changed > 0)
}

fn open_read_write(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

fn open_reader(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "query_only", true)?;
    Ok(conn)
}

fn path_key(path: &Path) -> StoreResult<&str> {
    path.to_str().ok_or_else(|| StoreError::NonUtf8Path {
        path: path.to_path_buf(),
    })
}

/// Row as stored, before the hash is validated.
struct RawRecord {
    hash: String,
    path: String,
    device_id: Option<String>,
    size: Option<i64>,
    modified_time: Option<String>,
    checked_time: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            hash: row.get(0)?,
            path: row.get(1)?,
            device_id: row.get(2)?,
            size: row.get(3)?,
            modified_time: row.get(4)?,
            checked_time: row.get(5)?,
        })
    }

    fn into_record(self) -> StoreResult<FileRecord> {
        let path = PathBuf::from(self.path);
        let hash = ContentHash::from_hex(&self.hash).map_err(|source| StoreError::InvalidHash {
            path: path.clone(),
            source,
        })?;

        Ok(FileRecord {
            hash,
            path,
            device_id: self.device_id.and_then(|d| d.parse::<VolumeId>().ok()),
            size: self.size.and_then(|s| u64::try_from(s).ok()),
            modified_time: self.modified_time.as_deref().and_then(FileRecord::parse_time),
            checked_time: self.checked_time.as_deref().and_then(FileRecord::parse_time),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(hash_byte: u8, path: &str, size: u64) -> FileRecord {
        FileRecord::new(ContentHash::new([hash_byte; 32]), path, Some(VolumeId(7)), size, None)
    }

    #[test]
    fn test_open_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("hashes.db");

        let store = FileStore::open(&db).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        drop(store);

        let store = FileStore::open(&db).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_upsert_then_lookup() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("hashes.db")).unwrap();
        let conn = store.open_writer().unwrap();

        upsert_record(&conn, &record(1, "/data/a.txt", 512)).unwrap();

        let found = store.lookup(Path::new("/data/a.txt")).unwrap().unwrap();
        assert_eq!(found.hash, ContentHash::new([1; 32]));
        assert_eq!(found.size, Some(512));
        assert_eq!(found.device_id, Some(VolumeId(7)));
        assert!(found.checked_time.is_some());

        assert!(store.lookup(Path::new("/data/missing.txt")).unwrap().is_none());
    }

    #[test]
    fn test_upsert_refreshes_known_path() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("hashes.db")).unwrap();
        let conn = store.open_writer().unwrap();

        upsert_record(&conn, &record(1, "/data/a.txt", 512)).unwrap();
        upsert_record(&conn, &record(2, "/data/a.txt", 1024)).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let found = store.lookup(Path::new("/data/a.txt")).unwrap().unwrap();
        assert_eq!(found.hash, ContentHash::new([2; 32]));
        assert_eq!(found.size, Some(1024));
    }

    #[test]
    fn test_cheap_skip_check() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("hashes.db")).unwrap();
        let conn = store.open_writer().unwrap();
        upsert_record(&conn, &record(1, "/data/a.txt", 512)).unwrap();

        assert!(store.cheap_skip_check(Path::new("/data/a.txt"), 512).unwrap());
        assert!(!store.cheap_skip_check(Path::new("/data/a.txt"), 513).unwrap());
        assert!(!store.cheap_skip_check(Path::new("/data/b.txt"), 512).unwrap());
    }

    #[test]
    fn test_touch_checked_only_changes_checked_time() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("hashes.db")).unwrap();
        let conn = store.open_writer().unwrap();
        upsert_record(&conn, &record(1, "/data/a.txt", 512)).unwrap();
        conn.execute(
            "UPDATE file_hashes SET checked_time = '2000-01-01 00:00:00'",
            [],
        )
        .unwrap();

        assert!(touch_checked(&conn, Path::new("/data/a.txt")).unwrap());
        assert!(!touch_checked(&conn, Path::new("/data/other.txt")).unwrap());

        let found = store.lookup(Path::new("/data/a.txt")).unwrap().unwrap();
        assert_ne!(
            found.checked_time,
            FileRecord::parse_time("2000-01-01 00:00:00")
        );
        assert_eq!(found.hash, ContentHash::new([1; 32]));
        assert_eq!(found.size, Some(512));
    }

    #[test]
    fn test_lookup_rejects_corrupt_hash() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("hashes.db")).unwrap();
        let conn = store.open_writer().unwrap();
        conn.execute(
            "INSERT INTO file_hashes (hash, file_path, size) VALUES ('nothex', '/data/a.txt', 3)",
            [],
        )
        .unwrap();

        let err = store.lookup(Path::new("/data/a.txt")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidHash { .. }));
    }

    #[test]
    fn test_load_index_pairs_in_insertion_order() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("hashes.db")).unwrap();
        let conn = store.open_writer().unwrap();
        upsert_record(&conn, &record(1, "/data/z.txt", 1)).unwrap();
        upsert_record(&conn, &record(1, "/data/a.txt", 1)).unwrap();

        let pairs = store.load_index_pairs().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].1, PathBuf::from("/data/z.txt"));
        assert_eq!(pairs[1].1, PathBuf::from("/data/a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_are_refused() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("hashes.db")).unwrap();
        let conn = store.open_writer().unwrap();
        let path = PathBuf::from(OsStr::from_bytes(b"/data/photo\xff.jpg"));

        let mut bad = record(1, "/unused", 9);
        bad.path = path.clone();
        assert!(matches!(
            upsert_record(&conn, &bad),
            Err(StoreError::NonUtf8Path { .. })
        ));
        assert!(matches!(
            store.lookup(&path),
            Err(StoreError::NonUtf8Path { .. })
        ));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_import_continues_past_failed_rows() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("hashes.db")).unwrap();
        store
            .open_writer()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON file_hashes
                 WHEN NEW.file_path = '/data/bad.txt'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let mut map = BTreeMap::new();
        map.insert(ContentHash::new([1; 32]).to_hex(), PathBuf::from("/data/a.txt"));
        map.insert(ContentHash::new([2; 32]).to_hex(), PathBuf::from("/data/bad.txt"));
        map.insert(ContentHash::new([3; 32]).to_hex(), PathBuf::from("/data/c.txt"));

        struct NoVolume;
        impl VolumeProbe for NoVolume {
            fn volume_of(&self, _path: &Path) -> Option<VolumeId> {
                None
            }
        }

        assert_eq!(store.import_map(&map, &NoVolume).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 2);
        assert!(store.lookup(Path::new("/data/bad.txt")).unwrap().is_none());
    }
}
