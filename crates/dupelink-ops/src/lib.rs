//! Filesystem operations for dupelink.
//!
//! This crate replaces duplicate files with links to their canonical copy.
//! [`safe_link`] performs the replacement as a backup/link/restore
//! transaction so a failed link never loses the original file, and
//! [`HardlinkPolicy`] decides whether a hardlink may be attempted at all.

mod eligibility;
mod link;

pub use eligibility::{Eligibility, HardlinkPolicy, SkipReason};
pub use link::{LinkError, LinkKind, safe_link};
