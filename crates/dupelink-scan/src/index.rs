//! Fingerprint to canonical path index.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use dupelink_core::{ContentHash, HashParseError};

/// What [`DedupIndex::observe`] concluded about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// First time this content is seen. The path is now canonical.
    New,
    /// The path is already the canonical path for this content.
    Known,
    /// Same content as the canonical path carried here.
    DuplicateOf(PathBuf),
}

/// Maps each fingerprint to exactly one canonical path.
///
/// The first path recorded for a fingerprint stays canonical; later paths
/// with the same fingerprint are duplicates of it and never replace it.
#[derive(Debug, Default)]
pub struct DedupIndex {
    entries: HashMap<ContentHash, PathBuf>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` as holding `hash` and say whether it duplicates an
    /// earlier path.
    pub fn observe(&mut self, hash: ContentHash, path: &Path) -> Decision {
        match self.entries.get(&hash) {
            None => {
                self.entries.insert(hash, path.to_path_buf());
                Decision::New
            }
            Some(canonical) if canonical == path => Decision::Known,
            Some(canonical) => Decision::DuplicateOf(canonical.clone()),
        }
    }

    /// Seed a pair from a prior index. Returns false if the fingerprint was
    /// already present, in which case the earlier path is kept.
    pub fn seed(&mut self, hash: ContentHash, path: PathBuf) -> bool {
        if self.entries.contains_key(&hash) {
            return false;
        }
        self.entries.insert(hash, path);
        true
    }

    /// [`seed`](Self::seed) from a hex fingerprint.
    pub fn seed_hex(&mut self, hex: &str, path: PathBuf) -> Result<bool, HashParseError> {
        Ok(self.seed(ContentHash::from_hex(hex)?, path))
    }

    /// Canonical path for `hash`, if any.
    pub fn canonical(&self, hash: &ContentHash) -> Option<&Path> {
        self.entries.get(hash).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The index as a `{hex: path}` map, ready for the interchange format.
    pub fn snapshot(&self) -> BTreeMap<String, PathBuf> {
        self.entries
            .iter()
            .map(|(hash, path)| (hash.to_hex(), path.clone()))
            .collect()
    }
}
