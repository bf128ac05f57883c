//! Virtual path rewriting.
//!
//! Yarn PnP uses virtual paths to let several logical identities of one
//! physical file or folder coexist: a path of the form
//! `<anchor>/__virtual__/<hash>/<n>/<sub>` resolves to the real location
//! obtained by walking `n` levels up from `<anchor>` and descending into
//! `<sub>`. See <https://yarnpkg.com/advanced/lexicon#virtual-package> and
//! <https://yarnpkg.com/advanced/pnpapi#resolvevirtual>.
//!
//! [`resolve_virtual`] and [`make_virtual_path`] are inverse on well-formed
//! inputs, so paths returned by the filesystem layer stay stable under
//! virtual wrapping.

use crate::path::{clean_path, join_paths, parent_path, relative_path, VIRTUAL_SEGMENT};

/// Outcome of stripping the virtual wrapping from a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualResolution {
    /// The real path the input resolves to. Equal to the input when the
    /// input carried no well-formed virtual segment.
    pub real: String,
    /// The hash component, empty when the input was not virtual.
    pub hash: String,
    /// The anchor up to and including `/__virtual__`, empty when the input
    /// was not virtual. Feed this back into [`make_virtual_path`] to re-tag
    /// derived paths.
    pub base: String,
}

impl VirtualResolution {
    fn passthrough(path: &str) -> Self {
        Self {
            real: path.to_string(),
            hash: String::new(),
            base: String::new(),
        }
    }
}

/// Whether a path contains the `/__virtual__/` marker.
///
/// Virtual PnP packages have no `node_modules` folder in their path, so
/// callers use this predicate when classifying a file as coming from an
/// external library.
pub fn is_pnp_virtual_path(path: &str) -> bool {
    path.contains(VIRTUAL_SEGMENT)
}

/// Strip the virtual wrapping from a path.
///
/// A malformed virtual segment (fewer than three parts after the marker, or
/// a depth that is not a non-negative integer) leaves the path untouched,
/// with empty `hash` and `base`.
pub fn resolve_virtual(path: &str) -> VirtualResolution {
    let Some(idx) = path.find(VIRTUAL_SEGMENT) else {
        return VirtualResolution::passthrough(path);
    };

    let rest = &path[idx + VIRTUAL_SEGMENT.len()..];
    let mut parts = rest.splitn(3, '/');
    let (Some(hash), Some(depth_str), Some(subpath)) = (parts.next(), parts.next(), parts.next())
    else {
        return VirtualResolution::passthrough(path);
    };
    let Ok(depth) = depth_str.parse::<usize>() else {
        return VirtualResolution::passthrough(path);
    };

    let mut base = path[..idx].to_string();
    for _ in 0..depth {
        base = parent_path(&base);
    }

    let real = if base == "/" {
        format!("/{subpath}")
    } else {
        join_paths(&[&base, subpath])
    };

    VirtualResolution {
        real,
        hash: hash.to_string(),
        base: format!("{}{}", &path[..idx], "/__virtual__"),
    }
}

/// Re-wrap a real path under a virtual prefix.
///
/// `base` is the anchor-plus-`/__virtual__` prefix and `hash` the hash
/// component, both as produced by [`resolve_virtual`]; if either is empty
/// the target is returned unchanged.
///
/// # Panics
///
/// Panics when `target` cannot be expressed relative to the anchor, which
/// only happens when the caller mixes rooted and unrooted paths.
pub fn make_virtual_path(base: &str, hash: &str, target: &str) -> String {
    if base.is_empty() || hash.is_empty() {
        return target.to_string();
    }

    let anchor = parent_path(base);
    let Some(relative) = relative_path(&anchor, target) else {
        panic!("could not make virtual path: {target} is not relative to {anchor}");
    };

    let segments: Vec<&str> = relative.split('/').collect();
    let depth = segments.iter().take_while(|segment| **segment == "..").count();
    let subpath = segments[depth..].join("/");

    join_paths(&[base, hash, &depth.to_string(), &clean_path(&subpath)])
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_virtual_basic() {
        let resolved = resolve_virtual("/a/b/__virtual__/abc/2/x/y.js");
        assert_eq!(resolved.real, "/x/y.js");
        assert_eq!(resolved.hash, "abc");
        assert_eq!(resolved.base, "/a/b/__virtual__");
    }

    #[test]
    fn test_resolve_virtual_depth_zero() {
        let resolved = resolve_virtual("/root/.yarn/__virtual__/h1/0/pkg/index.js");
        assert_eq!(resolved.real, "/root/.yarn/pkg/index.js");
        assert_eq!(resolved.hash, "h1");
        assert_eq!(resolved.base, "/root/.yarn/__virtual__");
    }

    #[test]
    fn test_resolve_virtual_passthrough() {
        // No marker: untouched.
        let plain = resolve_virtual("/a/b/c.js");
        assert_eq!(plain.real, "/a/b/c.js");
        assert_eq!(plain.hash, "");
        assert_eq!(plain.base, "");

        // Too few parts after the marker.
        let short = resolve_virtual("/a/__virtual__/hash/2");
        assert_eq!(short.real, "/a/__virtual__/hash/2");
        assert_eq!(short.hash, "");

        // Depth is not a non-negative integer.
        for path in ["/a/__virtual__/h/x/sub", "/a/__virtual__/h/-1/sub"] {
            let bad = resolve_virtual(path);
            assert_eq!(bad.real, path);
            assert_eq!(bad.base, "");
        }
    }

    #[test]
    fn test_make_virtual_path_empty_controls() {
        assert_eq!(make_virtual_path("", "", "/x/y.js"), "/x/y.js");
        assert_eq!(make_virtual_path("/a/__virtual__", "", "/x/y.js"), "/x/y.js");
        assert_eq!(make_virtual_path("", "abc", "/x/y.js"), "/x/y.js");
    }

    #[test]
    fn test_round_trip() {
        // The scenario from the resolver side: parent-of-2 of /a/b is /.
        assert_eq!(
            make_virtual_path("/a/b/__virtual__", "abc", "/x/y.js"),
            "/a/b/__virtual__/abc/2/x/y.js"
        );

        let originals = [
            "/a/b/__virtual__/abc/2/x/y.js",
            "/root/.yarn/__virtual__/h1/0/pkg/index.js",
            "/p/q/r/__virtual__/deadbeef/1/lib/main.ts",
        ];
        for original in originals {
            let resolved = resolve_virtual(original);
            assert_eq!(
                make_virtual_path(&resolved.base, &resolved.hash, &resolved.real),
                original,
                "{original}"
            );
        }
    }

    #[test]
    fn test_make_virtual_path_same_dir_target() {
        // Target inside the anchor directory itself: depth 0.
        assert_eq!(
            make_virtual_path("/r/__virtual__", "h", "/r/file.js"),
            "/r/__virtual__/h/0/file.js"
        );
    }

    #[test]
    #[should_panic(expected = "could not make virtual path")]
    fn test_make_virtual_path_unrooted_target_panics() {
        make_virtual_path("/a/__virtual__", "h", "relative/target");
    }
}
