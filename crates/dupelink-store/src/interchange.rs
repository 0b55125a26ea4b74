//! `{hash: path}` JSON documents.
//!
//! The same flat object is used to seed a run (`load`), dump the final
//! index (`save`), and move data in and out of the store (`import` and
//! `export`).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Flat mapping from hex fingerprint to absolute path.
pub type IndexMap = BTreeMap<String, PathBuf>;

/// Read an index document.
pub fn read_index_map(path: &Path) -> StoreResult<IndexMap> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write an index document, replacing any existing file.
///
/// JSON strings cannot carry paths that are not UTF-8; such entries are
/// left out with a warning. Returns the number of entries written.
pub fn write_index_map(path: &Path, map: &IndexMap, pretty: bool) -> StoreResult<usize> {
    let entries: BTreeMap<&str, &str> = map
        .iter()
        .filter_map(|(hash, file)| match file.to_str() {
            Some(file) => Some((hash.as_str(), file)),
            None => {
                warn!(path = %file.display(), "path is not UTF-8, left out of index file");
                None
            }
        })
        .collect();

    let file = File::create(path).map_err(|e| StoreError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let encoded = if pretty {
        serde_json::to_writer_pretty(&mut writer, &entries)
    } else {
        serde_json::to_writer(&mut writer, &entries)
    };
    encoded.map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    writer.write_all(b"\n").map_err(|e| StoreError::io(path, e))?;
    writer.flush().map_err(|e| StoreError::io(path, e))?;
    Ok(entries.len())
}
