use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dupelink_core::{ContentHash, FileRecord, VolumeId, VolumeProbe};
use dupelink_store::interchange::{read_index_map, write_index_map};
use dupelink_store::{FileStore, StoreWriter};
use tempfile::TempDir;

struct FixedVolume(Option<VolumeId>);

impl VolumeProbe for FixedVolume {
    fn volume_of(&self, _path: &Path) -> Option<VolumeId> {
        self.0
    }
}

fn hex(byte: u8) -> String {
    ContentHash::new([byte; 32]).to_hex()
}

#[test]
fn test_writer_then_lookup_from_reader() {
    let temp = TempDir::new().unwrap();
    let store = FileStore::open(temp.path().join("hashes.db")).unwrap();

    let writer = StoreWriter::spawn(&store, 2).unwrap();
    writer
        .enqueue(FileRecord::new(
            ContentHash::new([3; 32]),
            "/data/a.txt",
            Some(VolumeId(9)),
            512,
            Some(std::time::SystemTime::now()),
        ))
        .unwrap();
    let stats = writer.finish();
    assert_eq!(stats.written, 1);

    let record = store.lookup(Path::new("/data/a.txt")).unwrap().unwrap();
    assert_eq!(record.hash, ContentHash::new([3; 32]));
    assert_eq!(record.device_id, Some(VolumeId(9)));
    assert!(record.modified_time.is_some());
    assert!(store.cheap_skip_check(Path::new("/data/a.txt"), 512).unwrap());
}

#[test]
fn test_import_ignores_known_paths() {
    let temp = TempDir::new().unwrap();
    let store = FileStore::open(temp.path().join("hashes.db")).unwrap();

    let writer = StoreWriter::spawn(&store, 2).unwrap();
    writer
        .enqueue(FileRecord::new(
            ContentHash::new([1; 32]),
            "/data/a.txt",
            None,
            10,
            None,
        ))
        .unwrap();
    writer.finish();

    let mut map = BTreeMap::new();
    map.insert(hex(2), PathBuf::from("/data/a.txt"));
    map.insert(hex(3), PathBuf::from("/data/b.txt"));

    let inserted = store.import_map(&map, &FixedVolume(Some(VolumeId(4)))).unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(store.count().unwrap(), 2);

    // The existing row keeps its hash.
    let a = store.lookup(Path::new("/data/a.txt")).unwrap().unwrap();
    assert_eq!(a.hash, ContentHash::new([1; 32]));

    // Imported rows have no size and so never cheap-skip.
    let b = store.lookup(Path::new("/data/b.txt")).unwrap().unwrap();
    assert_eq!(b.size, None);
    assert_eq!(b.device_id, Some(VolumeId(4)));
    assert!(!store.cheap_skip_check(Path::new("/data/b.txt"), 0).unwrap());
}

#[test]
fn test_import_without_volume_leaves_device_empty() {
    let temp = TempDir::new().unwrap();
    let store = FileStore::open(temp.path().join("hashes.db")).unwrap();

    let mut map = BTreeMap::new();
    map.insert(hex(5), PathBuf::from("/gone/file.txt"));
    store.import_map(&map, &FixedVolume(None)).unwrap();

    let record = store.lookup(Path::new("/gone/file.txt")).unwrap().unwrap();
    assert_eq!(record.device_id, None);
}

#[test]
fn test_export_folds_shared_hash_to_latest_path() {
    let temp = TempDir::new().unwrap();
    let store = FileStore::open(temp.path().join("hashes.db")).unwrap();

    let writer = StoreWriter::spawn(&store, 4).unwrap();
    for path in ["/data/first.txt", "/data/second.txt"] {
        writer
            .enqueue(FileRecord::new(ContentHash::new([8; 32]), path, None, 1, None))
            .unwrap();
    }
    writer
        .enqueue(FileRecord::new(ContentHash::new([9; 32]), "/data/other.txt", None, 1, None))
        .unwrap();
    writer.finish();

    let map = store.export_map().unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map[&hex(8)], PathBuf::from("/data/second.txt"));
    assert_eq!(map[&hex(9)], PathBuf::from("/data/other.txt"));
}

#[test]
fn test_export_then_import_into_fresh_store() {
    let temp = TempDir::new().unwrap();
    let source = FileStore::open(temp.path().join("source.db")).unwrap();

    let writer = StoreWriter::spawn(&source, 4).unwrap();
    writer
        .enqueue(FileRecord::new(ContentHash::new([1; 32]), "/data/a.txt", None, 1, None))
        .unwrap();
    writer
        .enqueue(FileRecord::new(ContentHash::new([2; 32]), "/data/b.txt", None, 2, None))
        .unwrap();
    writer.finish();

    let json = temp.path().join("export.json");
    write_index_map(&json, &source.export_map().unwrap(), true).unwrap();

    let target = FileStore::open(temp.path().join("target.db")).unwrap();
    let map = read_index_map(&json).unwrap();
    assert_eq!(target.import_map(&map, &FixedVolume(None)).unwrap(), 2);
    assert_eq!(target.export_map().unwrap(), source.export_map().unwrap());
}

#[test]
fn test_import_skips_invalid_fingerprints() {
    let temp = TempDir::new().unwrap();
    let store = FileStore::open(temp.path().join("hashes.db")).unwrap();

    let mut map = BTreeMap::new();
    map.insert("a".repeat(40), PathBuf::from("/data/legacy.txt"));
    map.insert(hex(6), PathBuf::from("/data/current.txt"));

    assert_eq!(store.import_map(&map, &FixedVolume(None)).unwrap(), 1);
    assert!(store.lookup(Path::new("/data/legacy.txt")).unwrap().is_none());
}
