//! Lexical path helpers.
//!
//! None of these touch the filesystem: symlinks are not resolved, which is
//! what the allow-list and relative symlink targets want.

use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serializer;

/// Lexically normalise a path: drop `.`, fold `name/..`, and never climb
/// above the root of an absolute path.
pub fn clean(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Make `path` absolute against the current directory, then clean it.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    std::path::absolute(path).map(|p| clean(&p))
}

/// True if `path` is `prefix` or lies below it. Both are compared cleaned,
/// component by component, so `/data/ab` is not within `/data/a`.
pub fn is_within(path: &Path, prefix: &Path) -> bool {
    clean(path).starts_with(clean(prefix))
}

/// Serialize a path as a string, replacing bytes that are not UTF-8.
///
/// For reports and warnings, where a readable path beats failing outright.
pub fn serialize_lossy<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

/// Relative path that leads from directory `base` to `target`.
///
/// Returns `None` when one path is absolute and the other is not, or when
/// they sit under different prefixes (drive letters).
pub fn relative_path(base: &Path, target: &Path) -> Option<PathBuf> {
    let base = clean(base);
    let target = clean(target);

    if base.is_absolute() != target.is_absolute() {
        return None;
    }

    let base_parts: Vec<Component<'_>> = base.components().collect();
    let target_parts: Vec<Component<'_>> = target.components().collect();

    if let (Some(Component::Prefix(a)), Some(Component::Prefix(b))) =
        (base_parts.first(), target_parts.first())
    {
        if a != b {
            return None;
        }
    }

    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    // Climbing out of a relative base that itself starts with `..` has no answer.
    if base_parts[common..]
        .iter()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part.as_os_str());
    }

    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    Some(relative)
}
