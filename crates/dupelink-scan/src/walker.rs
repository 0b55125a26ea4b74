//! Directory traversal feeding the worker pool.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use jwalk::{Parallelism, WalkDir};
use tracing::warn;

use dupelink_core::{ScanError, ScanWarning, WarningKind};

/// One regular file to process.
#[derive(Debug, Clone)]
pub(crate) struct FileJob {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileJob {
    fn new(path: PathBuf, metadata: &Metadata) -> Self {
        Self {
            path,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// What a run starts from.
#[derive(Debug)]
pub(crate) enum Root {
    /// A single regular file.
    File(FileJob),
    /// A directory whose tree is walked.
    Dir(PathBuf),
}

/// Check that `root` can be traversed at all. Any failure here is fatal.
pub(crate) fn open_root(root: &Path) -> Result<Root, ScanError> {
    let metadata = fs::metadata(root).map_err(|e| ScanError::io(root, e))?;

    if metadata.is_file() {
        return Ok(Root::File(FileJob::new(root.to_path_buf(), &metadata)));
    }
    if !metadata.is_dir() {
        return Err(ScanError::NotARegularFileOrDirectory {
            path: root.to_path_buf(),
        });
    }

    fs::read_dir(root).map_err(|e| ScanError::io(root, e))?;
    Ok(Root::Dir(root.to_path_buf()))
}

/// Visit every regular file under `root` in sorted order.
///
/// Symlinks are not followed and hidden entries are included. Entries
/// that cannot be read are reported to `on_warning` and skipped. Walking
/// stops early once `on_file` returns false.
pub(crate) fn walk_dir(
    root: &Path,
    mut on_file: impl FnMut(FileJob) -> bool,
    mut on_warning: impl FnMut(ScanWarning),
) {
    let walker = WalkDir::new(root)
        .parallelism(Parallelism::Serial)
        .sort(true)
        .skip_hidden(false)
        .follow_links(false);

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                warn!(path = %path.display(), error = %err, "cannot read directory entry");
                on_warning(ScanWarning::new(path, err.to_string(), WarningKind::ReadError));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read metadata");
                on_warning(ScanWarning::new(
                    &path,
                    err.to_string(),
                    WarningKind::MetadataError,
                ));
                continue;
            }
        };

        if !on_file(FileJob::new(path, &metadata)) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn collect(root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        walk_dir(
            root,
            |job| {
                files.push(job.path);
                true
            },
            |_| {},
        );
        files
    }

    #[test]
    fn test_walk_visits_regular_files_sorted() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join(".hidden"), "h").unwrap();
        fs::write(root.join("sub/deeper/c.txt"), "c").unwrap();

        let files = collect(root);
        assert_eq!(files.len(), 4);
        assert!(files.iter().all(|p| p.is_absolute()));
        assert!(files.contains(&root.join(".hidden")));
        assert!(files.contains(&root.join("sub/deeper/c.txt")));

        let a = files.iter().position(|p| p.ends_with("a.txt")).unwrap();
        let b = files.iter().position(|p| p.ends_with("b.txt")).unwrap();
        assert!(a < b);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_skips_symlinks() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt")).unwrap();

        assert_eq!(collect(root), vec![root.join("real.txt")]);
    }

    #[test]
    fn test_walk_stops_when_asked() {
        let temp = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            fs::write(temp.path().join(name), name).unwrap();
        }

        let mut seen = 0;
        walk_dir(
            temp.path(),
            |_| {
                seen += 1;
                false
            },
            |_| {},
        );
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_open_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("single.txt");
        fs::write(&file, "12345").unwrap();

        assert!(matches!(open_root(temp.path()).unwrap(), Root::Dir(_)));
        match open_root(&file).unwrap() {
            Root::File(job) => assert_eq!(job.size, 5),
            other => panic!("unexpected root {other:?}"),
        }
        assert!(matches!(
            open_root(&temp.path().join("missing")).unwrap_err(),
            ScanError::NotFound { .. }
        ));
    }
}
