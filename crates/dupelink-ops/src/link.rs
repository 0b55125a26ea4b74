//! Replace a file with a link without ever losing it.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use dupelink_core::paths;

/// Random bytes in a backup suffix (two hex digits each).
const BACKUP_SUFFIX_BYTES: usize = 5;

/// Which kind of link replaces the duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// A hardlink to the original's inode.
    Hard,
    /// A relative symbolic link to the original.
    Soft,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hard => write!(f, "hardlink"),
            Self::Soft => write!(f, "symlink"),
        }
    }
}

/// Failure of a link transaction.
///
/// Apart from [`LinkError::Restore`], every variant guarantees the file at
/// the link path is exactly what it was before the call.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The existing file could not be moved out of the way. Nothing was touched.
    #[error("Cannot back up {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Creating the link failed. The original file was put back.
    #[error("Cannot {kind} {link} to {original}: {source}")]
    Link {
        kind: LinkKind,
        original: PathBuf,
        link: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Creating the link failed and the backup could not be renamed back.
    /// The original content survives at `backup`.
    #[error("Cannot restore {path} from {backup} after failed link: {source}")]
    Restore {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The OS random source failed while naming the backup.
    #[error("Random source unavailable: {0}")]
    RandomSource(#[source] rand::Error),

    /// No relative path leads from the link's directory to the original.
    #[error("No relative path from {from} to {to}")]
    NoRelativePath { from: PathBuf, to: PathBuf },
}

/// Replace `link` with a link of `kind` pointing at `original`.
///
/// An existing file at `link` is first renamed to a random backup name in
/// the same directory. If the link cannot be created the backup is renamed
/// back and the error returned; on success the backup is removed, and a
/// failure to remove it is only logged.
///
/// Symlinks store the path of `original` relative to the directory of
/// `link`, so the tree stays valid when moved as a whole. A symlink that
/// does not resolve is removed and counts as a failed link.
pub fn safe_link(original: &Path, link: &Path, kind: LinkKind) -> Result<(), LinkError> {
    let target = match kind {
        LinkKind::Hard => original.to_path_buf(),
        LinkKind::Soft => symlink_target(original, link)?,
    };

    let backup = match fs::symlink_metadata(link) {
        Ok(_) => {
            let backup = backup_path(link)?;
            fs::rename(link, &backup).map_err(|source| LinkError::Backup {
                path: link.to_path_buf(),
                source,
            })?;
            Some(backup)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(source) => {
            return Err(LinkError::Backup {
                path: link.to_path_buf(),
                source,
            });
        }
    };

    match create_link(&target, link, kind).and_then(|()| verify_link(link, kind)) {
        Ok(()) => {
            if let Some(backup) = backup {
                if let Err(e) = fs::remove_file(&backup) {
                    debug!(backup = %backup.display(), error = %e, "could not remove link backup");
                }
            }
            Ok(())
        }
        Err(source) => {
            if let Some(backup) = backup {
                fs::rename(&backup, link).map_err(|restore| LinkError::Restore {
                    path: link.to_path_buf(),
                    backup: backup.clone(),
                    source: restore,
                })?;
            }
            Err(LinkError::Link {
                kind,
                original: original.to_path_buf(),
                link: link.to_path_buf(),
                source,
            })
        }
    }
}

fn symlink_target(original: &Path, link: &Path) -> Result<PathBuf, LinkError> {
    let no_path = || LinkError::NoRelativePath {
        from: link.to_path_buf(),
        to: original.to_path_buf(),
    };
    let dir = link.parent().ok_or_else(no_path)?;
    paths::relative_path(dir, original).ok_or_else(no_path)
}

/// `<link>.<10 random hex digits>` next to `link`.
fn backup_path(link: &Path) -> Result<PathBuf, LinkError> {
    let name = link.file_name().ok_or_else(|| LinkError::Backup {
        path: link.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
    })?;

    let mut bytes = [0u8; BACKUP_SUFFIX_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(LinkError::RandomSource)?;
    let suffix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

    let mut backup = OsString::from(name);
    backup.push(".");
    backup.push(suffix);
    Ok(link.with_file_name(backup))
}

fn create_link(target: &Path, link: &Path, kind: LinkKind) -> io::Result<()> {
    match kind {
        LinkKind::Hard => fs::hard_link(target, link),
        LinkKind::Soft => symlink(target, link),
    }
}

/// A fresh symlink must reach an existing file before the backup goes.
fn verify_link(link: &Path, kind: LinkKind) -> io::Result<()> {
    if kind == LinkKind::Hard {
        return Ok(());
    }
    if let Err(e) = fs::metadata(link) {
        if let Err(remove) = fs::remove_file(link) {
            debug!(link = %link.display(), error = %remove, "could not remove dangling symlink");
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}
