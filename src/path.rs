//! Lexical path algebra and zip-path classification.
//!
//! Every path at this layer is a forward-slash string; the functions here
//! never touch the disk and never reinterpret backslashes. Operations that
//! need OS semantics live behind the [`crate::vfs::FileSystem`] trait.

/// Marker segment identifying a virtual path.
pub const VIRTUAL_SEGMENT: &str = "/__virtual__/";

// =============================================================================
// Zip-path classification
// =============================================================================

/// Whether a path addresses a zip archive or a file inside one.
///
/// True if the path ends with `.zip` or contains `.zip/` anywhere.
///
/// # Example
///
/// ```
/// use pnp_vfs::is_zip_path;
///
/// assert!(is_zip_path("/cache/pkg.zip"));
/// assert!(is_zip_path("/cache/pkg.zip/lib/index.js"));
/// assert!(!is_zip_path("/cache/pkg.zip.txt"));
/// ```
pub fn is_zip_path(path: &str) -> bool {
    path.ends_with(".zip") || path.contains(".zip/")
}

/// Split a path into its archive portion and in-archive portion.
///
/// Splits on the first `.zip/` occurrence; the archive portion keeps the
/// `.zip` suffix, the internal portion gets a leading `/`. A path with no
/// `.zip/` maps to itself with `/` as the internal portion.
pub fn split_zip_path(path: &str) -> (String, String) {
    match path.find(".zip/") {
        Some(idx) => {
            let archive = &path[..idx + ".zip".len()];
            let internal = &path[idx + ".zip".len()..];
            (archive.to_string(), internal.to_string())
        }
        None => (path.to_string(), "/".to_string()),
    }
}

/// Whether a path contains the virtual marker segment.
pub fn is_virtual_path(path: &str) -> bool {
    path.contains(VIRTUAL_SEGMENT)
}

// =============================================================================
// Lexical operations
// =============================================================================

/// Lexically simplify a path: collapse repeated slashes, drop `.` segments,
/// resolve `..` against preceding segments where possible.
///
/// Rooted paths never escape `/`; relative paths keep leading `..` segments.
/// The empty path cleans to `.`.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                _ => {
                    if !rooted {
                        out.push("..");
                    }
                }
            },
            other => out.push(other),
        }
    }
    if rooted {
        let mut cleaned = String::from("/");
        cleaned.push_str(&out.join("/"));
        cleaned
    } else if out.is_empty() {
        ".".to_string()
    } else {
        out.join("/")
    }
}

/// Join path fragments with `/` and clean the result. Empty fragments are
/// skipped; joining nothing yields the empty string.
pub fn join_paths(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .copied()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        return String::new();
    }
    clean_path(&joined)
}

/// The parent directory of a path: `/a/b` → `/a`, `/a` → `/`, `/` → `/`.
///
/// A path without any `/` has parent `.`.
pub fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        None => ".".to_string(),
        Some(0) => "/".to_string(),
        Some(idx) => clean_path(&path[..idx]),
    }
}

/// Compute `target` relative to `base`, lexically.
///
/// Both sides are cleaned first. Returns `None` when one side is rooted and
/// the other is not, or when a `..` remainder in `base` makes the result
/// unrepresentable. Identical paths map to `.`.
pub fn relative_path(base: &str, target: &str) -> Option<String> {
    let base = clean_path(base);
    let target = clean_path(target);
    if base == target {
        return Some(".".to_string());
    }
    if base.starts_with('/') != target.starts_with('/') {
        return None;
    }

    fn segments_of(path: &str) -> Vec<&str> {
        path.trim_start_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect()
    }
    let base_segments = segments_of(&base);
    let target_segments = segments_of(&target);

    let common = base_segments
        .iter()
        .zip(target_segments.iter())
        .take_while(|(a, b)| a == b)
        .count();

    // A `..` left over in the base has no lexical inverse.
    if base_segments[common..].contains(&"..") {
        return None;
    }

    let mut segments: Vec<&str> = Vec::new();
    for _ in common..base_segments.len() {
        segments.push("..");
    }
    segments.extend(&target_segments[common..]);

    if segments.is_empty() {
        Some(".".to_string())
    } else {
        Some(segments.join("/"))
    }
}

// =============================================================================
// Tests
// =============================================================================
