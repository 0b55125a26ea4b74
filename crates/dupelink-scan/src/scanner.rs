//! Run orchestration: walk, fingerprint, detect and reconcile duplicates.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use dupelink_core::{
    ContentHash, DedupConfig, FileRecord, FsVolumes, InodeInfo, ScanError, ScanWarning,
    VolumeProbe, WarningKind, paths,
};
use dupelink_ops::{Eligibility, HardlinkPolicy, LinkKind, safe_link};
use dupelink_store::interchange::{read_index_map, write_index_map};
use dupelink_store::{FileStore, StoreWriter};

use crate::error::DedupError;
use crate::fingerprint::fingerprint_file;
use crate::index::{Decision, DedupIndex};
use crate::pool::run_bounded;
use crate::report::RunReport;
use crate::walker::{FileJob, Root, open_root, walk_dir};

/// Finds duplicate files under one or more roots and replaces them with
/// links to their canonical copy.
///
/// The index persists across calls to [`run`](Self::run), so a path seen
/// under an earlier root stays canonical for later ones.
pub struct Deduper {
    config: DedupConfig,
    probe: Box<dyn VolumeProbe>,
    policy: HardlinkPolicy,
    store: Option<FileStore>,
    index: DedupIndex,
}

impl Deduper {
    /// Create a deduper that reads volume identity from the filesystem.
    pub fn new(config: DedupConfig) -> Result<Self, DedupError> {
        Self::with_probe(config, Box::new(FsVolumes))
    }

    /// Create a deduper with a custom volume probe.
    ///
    /// Opens the store when one is configured and seeds the index, from the
    /// prior index file when given and from the store otherwise.
    pub fn with_probe(
        config: DedupConfig,
        probe: Box<dyn VolumeProbe>,
    ) -> Result<Self, DedupError> {
        config.check()?;

        let store = config.database.as_deref().map(FileStore::open).transpose()?;
        let policy = HardlinkPolicy::new(config.allowed_hardlink_paths());

        let mut index = DedupIndex::new();
        if let Some(path) = &config.load_index {
            seed_from_file(&mut index, path)?;
        } else if let Some(store) = &store {
            seed_from_store(&mut index, store)?;
        }
        if !index.is_empty() {
            info!(entries = index.len(), "index seeded");
        }

        Ok(Self {
            config,
            probe,
            policy,
            store,
            index,
        })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    pub fn index(&self) -> &DedupIndex {
        &self.index
    }

    /// The persistent store, when one is configured.
    pub fn store(&self) -> Option<&FileStore> {
        self.store.as_ref()
    }

    /// Process every regular file under `root`.
    ///
    /// Fails only when the root cannot be traversed or the store writer
    /// cannot start. Per-file problems end up in the report's warnings. When
    /// `save_index` is configured, the index is written after the run.
    pub fn run(&mut self, root: &Path) -> Result<RunReport, DedupError> {
        let start = Instant::now();
        let root = paths::absolutize(root).map_err(|e| ScanError::io(root, e))?;
        let entry = open_root(&root)?;

        let writer = match &self.store {
            Some(store) => Some(StoreWriter::spawn(store, self.config.writer_capacity())?),
            None => None,
        };

        let workers = self.config.effective_workers();
        info!(root = %root.display(), workers, "scanning");

        let run = RunContext {
            config: &self.config,
            probe: self.probe.as_ref(),
            policy: &self.policy,
            store: self.store.as_ref(),
            writer: writer.as_ref(),
            state: Mutex::new(RunState {
                index: std::mem::take(&mut self.index),
                savings: 0,
            }),
            counters: Counters::default(),
            warnings: Mutex::new(Vec::new()),
        };

        let pooled = run_bounded(
            workers,
            |tx| match entry {
                Root::File(job) => {
                    let _ = tx.send(job);
                }
                Root::Dir(dir) => walk_dir(
                    &dir,
                    |job| tx.send(job).is_ok(),
                    |warning| run.push_warning(warning),
                ),
            },
            |job| run.process(job),
        );

        let RunContext {
            state,
            counters,
            warnings,
            ..
        } = run;
        let writer_stats = writer.map(StoreWriter::finish);
        let state = state.into_inner().unwrap_or_else(PoisonError::into_inner);
        self.index = state.index;
        pooled?;

        let report = RunReport {
            root,
            files_seen: counters.files_seen.into_inner(),
            files_hashed: counters.files_hashed.into_inner(),
            cheap_skips: counters.cheap_skips.into_inner(),
            duplicates: counters.duplicates.into_inner(),
            hardlinks: counters.hardlinks.into_inner(),
            symlinks: counters.symlinks.into_inner(),
            link_failures: counters.link_failures.into_inner(),
            savings_bytes: state.savings,
            warnings: warnings.into_inner().unwrap_or_else(PoisonError::into_inner),
            duration: start.elapsed(),
            writer: writer_stats,
        };

        info!(
            root = %report.root.display(),
            files = report.files_seen,
            duplicates = report.duplicates,
            savings = report.savings_bytes,
            "scan complete"
        );

        if let Some(path) = &self.config.save_index {
            self.save_index(path)?;
        }

        Ok(report)
    }

    /// Write the current index as a `{hash: path}` JSON document.
    pub fn save_index(&self, path: &Path) -> Result<(), DedupError> {
        let entries = write_index_map(path, &self.index.snapshot(), true)?;
        info!(path = %path.display(), entries, "index saved");
        Ok(())
    }
}

impl std::fmt::Debug for Deduper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduper")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("indexed", &self.index.len())
            .finish()
    }
}

fn seed_from_file(index: &mut DedupIndex, path: &Path) -> Result<(), DedupError> {
    let map = read_index_map(path)?;
    for (hex, canonical) in map {
        if let Err(e) = index.seed_hex(&hex, canonical) {
            warn!(file = %path.display(), error = %e, "skipping index entry");
        }
    }
    debug!(file = %path.display(), entries = index.len(), "index loaded");
    Ok(())
}

fn seed_from_store(index: &mut DedupIndex, store: &FileStore) -> Result<(), DedupError> {
    for (hex, canonical) in store.load_index_pairs()? {
        if let Err(e) = index.seed_hex(&hex, canonical) {
            warn!(error = %e, "skipping stored fingerprint");
        }
    }
    debug!(entries = index.len(), "index seeded from store");
    Ok(())
}

/// The index and the savings accumulator, guarded together.
struct RunState {
    index: DedupIndex,
    savings: u64,
}

#[derive(Default)]
struct Counters {
    files_seen: AtomicU64,
    files_hashed: AtomicU64,
    cheap_skips: AtomicU64,
    duplicates: AtomicU64,
    hardlinks: AtomicU64,
    symlinks: AtomicU64,
    link_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Everything a worker needs for one run, shared by reference.
struct RunContext<'a> {
    config: &'a DedupConfig,
    probe: &'a dyn VolumeProbe,
    policy: &'a HardlinkPolicy,
    store: Option<&'a FileStore>,
    writer: Option<&'a StoreWriter>,
    state: Mutex<RunState>,
    counters: Counters,
    warnings: Mutex<Vec<ScanWarning>>,
}

impl RunContext<'_> {
    fn process(&self, job: FileJob) {
        bump(&self.counters.files_seen);

        let Some(hash) = self.resolve_hash(&job) else {
            return;
        };

        let mut state = self.lock_state();
        match state.index.observe(hash, &job.path) {
            Decision::New | Decision::Known => {}
            Decision::DuplicateOf(canonical) => {
                state.savings += job.size;
                bump(&self.counters.duplicates);
                info!(
                    path = %job.path.display(),
                    canonical = %canonical.display(),
                    size = job.size,
                    "duplicate"
                );
                // Links are made while the lock is held so no two workers
                // replace files against the same canonical path at once.
                self.reconcile(&job.path, &canonical);
            }
        }
    }

    /// Stored fingerprint when the size is unchanged, otherwise a fresh one.
    fn resolve_hash(&self, job: &FileJob) -> Option<ContentHash> {
        let store = self.store.filter(|_| self.storable(&job.path));
        let writer = self.writer.filter(|_| store.is_some());

        if let Some(store) = store {
            match store.lookup(&job.path) {
                Ok(Some(record)) if record.matches_size(job.size) => {
                    bump(&self.counters.cheap_skips);
                    debug!(path = %job.path.display(), "size unchanged, using stored hash");
                    if let Some(writer) = writer {
                        if let Err(e) = writer.touch_checked(job.path.clone()) {
                            debug!(
                                path = %job.path.display(),
                                error = %e,
                                "checked_time not queued"
                            );
                        }
                    }
                    return Some(record.hash);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %job.path.display(), error = %e, "store lookup failed");
                    self.push_warning(ScanWarning::new(
                        &job.path,
                        e.to_string(),
                        WarningKind::StoreError,
                    ));
                }
            }
        }

        let hash = match fingerprint_file(&job.path) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(path = %job.path.display(), error = %e, "cannot fingerprint file");
                self.push_warning(ScanWarning::read_error(&job.path, &e));
                return None;
            }
        };
        bump(&self.counters.files_hashed);

        if let Some(writer) = writer {
            let record = FileRecord::new(
                hash,
                &job.path,
                self.probe.volume_of(&job.path),
                job.size,
                job.modified,
            );
            if let Err(e) = writer.enqueue(record) {
                warn!(path = %job.path.display(), error = %e, "record not queued");
            }
        }

        Some(hash)
    }

    /// Paths that are not UTF-8 bypass the store and are always hashed.
    fn storable(&self, path: &Path) -> bool {
        if path.to_str().is_some() {
            return true;
        }
        warn!(path = %path.display(), "path is not UTF-8, not stored");
        self.push_warning(ScanWarning::new(
            path,
            "Path is not valid UTF-8 and is not stored",
            WarningKind::PathError,
        ));
        false
    }

    /// Apply the configured link actions to a duplicate.
    fn reconcile(&self, duplicate: &Path, canonical: &Path) {
        if !self.config.hardlink && !self.config.symlink {
            return;
        }

        // A seeded canonical may have been removed since it was recorded.
        if !fs::symlink_metadata(canonical).is_ok_and(|m| m.is_file()) {
            warn!(
                path = %duplicate.display(),
                canonical = %canonical.display(),
                "canonical copy is missing, duplicate left in place"
            );
            self.push_warning(ScanWarning::new(
                duplicate,
                format!("Canonical copy {} is missing", canonical.display()),
                WarningKind::MissingCanonical,
            ));
            return;
        }

        if self.config.hardlink {
            match self.policy.check(self.probe, duplicate, canonical) {
                Eligibility::Eligible if same_inode(duplicate, canonical) => {
                    debug!(path = %duplicate.display(), "already hardlinked");
                }
                Eligibility::Eligible => {
                    if !self.link(duplicate, canonical, LinkKind::Hard) {
                        return;
                    }
                }
                Eligibility::Skip(reason) => {
                    debug!(path = %duplicate.display(), %reason, "hardlink skipped");
                }
            }
        }

        if self.config.symlink {
            self.link(duplicate, canonical, LinkKind::Soft);
        }
    }

    fn link(&self, duplicate: &Path, canonical: &Path, kind: LinkKind) -> bool {
        match safe_link(canonical, duplicate, kind) {
            Ok(()) => {
                let counter = match kind {
                    LinkKind::Hard => &self.counters.hardlinks,
                    LinkKind::Soft => &self.counters.symlinks,
                };
                bump(counter);
                info!(
                    path = %duplicate.display(),
                    canonical = %canonical.display(),
                    %kind,
                    "linked"
                );
                true
            }
            Err(e) => {
                bump(&self.counters.link_failures);
                warn!(path = %duplicate.display(), %kind, error = %e, "link failed");
                self.push_warning(ScanWarning::link_failed(duplicate, &e));
                false
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_warning(&self, warning: ScanWarning) {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }
}

fn same_inode(a: &Path, b: &Path) -> bool {
    let inode = |p: &Path| fs::metadata(p).ok().as_ref().and_then(InodeInfo::from_metadata);
    match (inode(a), inode(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
