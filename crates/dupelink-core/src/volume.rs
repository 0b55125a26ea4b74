//! Storage volume identity.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque token naming the volume a file lives on.
///
/// Equal tokens mean the same filesystem, so a hardlink between the two
/// paths can succeed. Nothing else about the value is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeId(pub u64);

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VolumeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Capability to resolve the volume of a path.
pub trait VolumeProbe: Send + Sync {
    /// Volume of `path`, or `None` when it cannot be determined.
    fn volume_of(&self, path: &Path) -> Option<VolumeId>;
}

/// Volume identity read from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsVolumes;

impl VolumeProbe for FsVolumes {
    #[cfg(unix)]
    fn volume_of(&self, path: &Path) -> Option<VolumeId> {
        use std::os::unix::fs::MetadataExt;
        std::fs::metadata(path).ok().map(|m| VolumeId(m.dev()))
    }

    // No stable volume identifier on this target; hardlinking stays off.
    #[cfg(not(unix))]
    fn volume_of(&self, _path: &Path) -> Option<VolumeId> {
        None
    }
}
