//! BLAKE3 content fingerprints.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use blake3::Hasher;

use dupelink_core::ContentHash;

/// Files larger than this are hashed through a memory map.
pub const MMAP_THRESHOLD: u64 = 128 * 1024;

const BUFFER_SIZE: usize = 64 * 1024;

/// Hash everything `reader` yields.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<ContentHash> {
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentHash::new(*hasher.finalize().as_bytes()))
}

/// Hash the full content of the file at `path`.
pub fn fingerprint_file(path: &Path) -> io::Result<ContentHash> {
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();

    if file_size > MMAP_THRESHOLD {
        let mut hasher = Hasher::new();
        hasher.update_mmap(path)?;
        return Ok(ContentHash::new(*hasher.finalize().as_bytes()));
    }

    fingerprint_reader(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_reader_matches_one_shot_hash() {
        let data = b"hello world".repeat(10_000);
        let hash = fingerprint_reader(Cursor::new(&data)).unwrap();
        assert_eq!(hash.0, *blake3::hash(&data).as_bytes());
    }

    #[test]
    fn test_content_only() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("nested_name.dat");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();

        assert_eq!(fingerprint_file(&a).unwrap(), fingerprint_file(&b).unwrap());
    }

    #[test]
    fn test_large_file_uses_same_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.bin");
        let data: Vec<u8> = (0..MMAP_THRESHOLD as usize * 3).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        assert_eq!(
            fingerprint_file(&path).unwrap(),
            fingerprint_reader(Cursor::new(&data)).unwrap()
        );
    }

    #[test]
    fn test_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        assert_eq!(fingerprint_file(&path).unwrap().0, *blake3::hash(b"").as_bytes());
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(fingerprint_file(&temp.path().join("absent")).is_err());
    }
}
