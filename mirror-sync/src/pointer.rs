//! Latest-version pointer files.
//!
//! A pointer is a small text file published next to versioned release
//! directories, e.g.
//!
//! ```text
//! # Latest as of Sun, 07 Jan 2024 17:03:09 +0000
//! # ts=1704647
//! 20240107T170309Z/stage3-amd64-hardened-openrc-20240107T170309Z.tar.xz 226384440
//! ```
//!
//! Comment lines start with `#`. The first remaining entry names a path whose
//! directory part is the current version directory. Clearsigned pointers are
//! reduced to their signed text first.

use crate::utils::errors::{MirrorError, Result};
use std::path::Path;

const SIGNED_MESSAGE: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE: &str = "-----BEGIN PGP SIGNATURE-----";

/// The signed text of a clearsigned message, or every line otherwise.
fn message_lines(content: &str) -> Vec<&str> {
    let lines: Vec<&str> = content.lines().collect();
    let Some(start) = lines.iter().position(|l| l.trim() == SIGNED_MESSAGE) else {
        return lines;
    };

    // Armour headers (`Hash: SHA512`) end at the first blank line.
    lines[start + 1..]
        .iter()
        .copied()
        .skip_while(|l| !l.trim().is_empty())
        .take_while(|l| l.trim() != SIGNATURE)
        .map(|l| l.strip_prefix("- ").unwrap_or(l))
        .collect()
}

/// Version directory named by pointer `content`, if any.
pub fn parse_pointer(content: &str) -> Option<String> {
    let line = message_lines(content)
        .into_iter()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))?;
    let token = line.split_whitespace().next()?.trim_end_matches('/');

    let dir = match token.rsplit_once('/') {
        Some((dir, _file)) => dir,
        None => token,
    };

    let usable = !dir.is_empty()
        && !dir.starts_with('/')
        && dir.split('/').all(|part| !part.is_empty() && part != "." && part != "..");
    usable.then(|| dir.to_string())
}

/// Read the pointer file at `path` and return the version directory it names.
pub fn resolve_pointer(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| MirrorError::PointerResolution {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    parse_pointer(&content).ok_or_else(|| MirrorError::PointerResolution {
        path: path.to_path_buf(),
        reason: "no usable entry after stripping comments".to_string(),
    })
}
