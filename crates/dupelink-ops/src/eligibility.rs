//! Rules deciding whether a duplicate may be hardlinked.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dupelink_core::{VolumeProbe, paths};

/// Why a hardlink was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The volume of one of the two files could not be determined.
    UnknownVolume,
    /// The files live on different volumes.
    CrossVolume,
    /// One of the files is outside every allowed prefix.
    OutsideAllowedPaths,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownVolume => write!(f, "volume unknown"),
            Self::CrossVolume => write!(f, "different volumes"),
            Self::OutsideAllowedPaths => write!(f, "outside allowed hardlink paths"),
        }
    }
}

/// Outcome of [`HardlinkPolicy::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Skip(SkipReason),
}

/// Hardlink allow-list. An empty list allows every path.
#[derive(Debug, Clone, Default)]
pub struct HardlinkPolicy {
    allowed: Vec<PathBuf>,
}

impl HardlinkPolicy {
    /// Policy restricted to `allowed` prefixes. Prefixes should be absolute;
    /// they are cleaned here.
    pub fn new(allowed: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            allowed: allowed.into_iter().map(|p| paths::clean(&p)).collect(),
        }
    }

    /// Policy with no path restriction.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Decide whether `duplicate` may be replaced by a hardlink to
    /// `canonical`. Volumes are checked first, then the allow-list.
    pub fn check(
        &self,
        probe: &dyn VolumeProbe,
        duplicate: &Path,
        canonical: &Path,
    ) -> Eligibility {
        let (Some(dup_volume), Some(canonical_volume)) =
            (probe.volume_of(duplicate), probe.volume_of(canonical))
        else {
            return Eligibility::Skip(SkipReason::UnknownVolume);
        };

        if dup_volume != canonical_volume {
            return Eligibility::Skip(SkipReason::CrossVolume);
        }

        if !self.permits(duplicate) || !self.permits(canonical) {
            return Eligibility::Skip(SkipReason::OutsideAllowedPaths);
        }

        Eligibility::Eligible
    }

    fn permits(&self, path: &Path) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|prefix| paths::is_within(path, prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dupelink_core::VolumeId;

    /// Volume 1 for paths under `/one`, 2 under `/two`, unknown elsewhere.
    struct TwoVolumes;

    impl VolumeProbe for TwoVolumes {
        fn volume_of(&self, path: &Path) -> Option<VolumeId> {
            if path.starts_with("/one") {
                Some(VolumeId(1))
            } else if path.starts_with("/two") {
                Some(VolumeId(2))
            } else {
                None
            }
        }
    }

    #[test]
    fn test_same_volume_unrestricted() {
        let policy = HardlinkPolicy::unrestricted();
        let result = policy.check(&TwoVolumes, Path::new("/one/b"), Path::new("/one/a"));
        assert_eq!(result, Eligibility::Eligible);
    }

    #[test]
    fn test_cross_volume() {
        let policy = HardlinkPolicy::unrestricted();
        assert_eq!(
            policy.check(&TwoVolumes, Path::new("/two/b"), Path::new("/one/a")),
            Eligibility::Skip(SkipReason::CrossVolume)
        );
    }

    #[test]
    fn test_unknown_volume() {
        let policy = HardlinkPolicy::unrestricted();
        assert_eq!(
            policy.check(&TwoVolumes, Path::new("/elsewhere/b"), Path::new("/one/a")),
            Eligibility::Skip(SkipReason::UnknownVolume)
        );
        assert_eq!(
            policy.check(&TwoVolumes, Path::new("/one/b"), Path::new("/elsewhere/a")),
            Eligibility::Skip(SkipReason::UnknownVolume)
        );
    }

    #[test]
    fn test_allow_list_requires_both_paths() {
        let policy = HardlinkPolicy::new([PathBuf::from("/one/media")]);

        assert_eq!(
            policy.check(&TwoVolumes, Path::new("/one/media/b"), Path::new("/one/media/sub/a")),
            Eligibility::Eligible
        );
        assert_eq!(
            policy.check(&TwoVolumes, Path::new("/one/media/b"), Path::new("/one/other/a")),
            Eligibility::Skip(SkipReason::OutsideAllowedPaths)
        );
        assert_eq!(
            policy.check(&TwoVolumes, Path::new("/one/other/b"), Path::new("/one/media/a")),
            Eligibility::Skip(SkipReason::OutsideAllowedPaths)
        );
    }

    #[test]
    fn test_allow_list_is_component_wise() {
        let policy = HardlinkPolicy::new([PathBuf::from("/one/a/")]);
        assert_eq!(
            policy.check(&TwoVolumes, Path::new("/one/ab/x"), Path::new("/one/a/y")),
            Eligibility::Skip(SkipReason::OutsideAllowedPaths)
        );
        assert_eq!(
            policy.check(&TwoVolumes, Path::new("/one/a/./x"), Path::new("/one/a/z/../y")),
            Eligibility::Eligible
        );
    }
}
