//! Defines [`normalize`] --- canonicalisation of caller-supplied paths.
//!
//! The normalized form is the sole key used for node lookup; callers
//! never see or compare unnormalized paths.

use crate::error::{Error, Result};

/// Path separator of the virtual namespace.
pub const SEPARATOR: char = '/';

/// Normalize a caller-provided path into an absolute `/`-separated form.
///
/// Backslashes are treated as separators, empty input as the root, and
/// `.` / `..` segments and redundant separators are collapsed. A path
/// that steps above the virtual root is rejected.
pub fn normalize(raw: &str) -> Result<String> {
    let unified = raw.replace('\\', "/");

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::invalid_argument(format!(
                        "path escapes the filesystem root: {raw:?}"
                    )));
                }
            }
            name => segments.push(name),
        }
    }

    if segments.is_empty() {
        return Ok(String::from("/"));
    }

    let mut normalized = String::with_capacity(unified.len() + 1);
    for segment in segments {
        normalized.push(SEPARATOR);
        normalized.push_str(segment);
    }
    Ok(normalized)
}

/// Split a normalized path into its parent path and final name.
///
/// Returns `None` for the root, which has neither.
pub(crate) fn split(normalized: &str) -> Option<(&str, &str)> {
    if normalized == "/" {
        return None;
    }
    let cut = normalized.rfind(SEPARATOR).expect("normalized paths start with a separator");
    let parent = if cut == 0 { "/" } else { &normalized[..cut] };
    Some((parent, &normalized[cut + 1..]))
}

/// Iterate the segments of a normalized path, root first.
pub(crate) fn segments(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(SEPARATOR).filter(|segment| !segment.is_empty())
}

/// Join a normalized directory path with a child name.
pub(crate) fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Whether `path` equals `prefix` or lies underneath it.
pub(crate) fn is_within(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == SEPARATOR as u8)
}
