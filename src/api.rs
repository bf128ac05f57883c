//! Process-wide manifest cache.
//!
//! Manifest discovery walks the filesystem, so it is done at most once per
//! process: the first caller's path decides which manifest the process
//! binds to, and the outcome (including "no manifest present") is cached
//! until [`clear_pnp_cache`] is called, typically from a file watcher.
//!
//! An atomic initialization flag keeps reads off the write lock after the
//! first call; mutation always happens under the lock with a double check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use crate::resolver::PnpApi;

static PNP_INITIALIZED: AtomicBool = AtomicBool::new(false);
static PNP_API_SLOT: LazyLock<RwLock<Option<Arc<PnpApi>>>> = LazyLock::new(|| RwLock::new(None));

/// Get the resolution API for the given file path, discovering and loading
/// the closest manifest on first use. `None` when no manifest is present
/// or the last discovery failed.
pub fn get_pnp_api(file_path: &str) -> Option<Arc<PnpApi>> {
    if PNP_INITIALIZED.load(Ordering::Acquire) {
        return PNP_API_SLOT.read().clone();
    }

    let mut slot = PNP_API_SLOT.write();
    // Another thread may have finished discovery while we waited.
    if PNP_INITIALIZED.load(Ordering::Acquire) {
        return slot.clone();
    }

    *slot = PnpApi::find_closest(file_path).ok().map(Arc::new);
    PNP_INITIALIZED.store(true, Ordering::Release);
    slot.clone()
}

/// Forget the cached manifest (or cached absence), making the next
/// [`get_pnp_api`] call discover again.
pub fn clear_pnp_cache() {
    let mut slot = PNP_API_SLOT.write();
    *slot = None;
    PNP_INITIALIZED.store(false, Ordering::Release);
}

/// Whether two paths live in different packages of the installation
/// owning `from`. False when no manifest is present.
pub fn is_in_pnp_module(from: &str, to: &str) -> bool {
    match get_pnp_api(from) {
        Some(api) => api.is_in_pnp_module(from, to),
        None => false,
    }
}

/// Append the type roots contributed by the `@types/*` dependencies of the
/// package owning `base_dir`.
///
/// Returns the extended list and the updated "configured explicitly" flag,
/// which is raised when any root was appended. Both inputs pass through
/// unchanged when no manifest is present.
pub fn append_pnp_type_roots(
    type_roots: Vec<String>,
    base_dir: &str,
    from_config: bool,
) -> (Vec<String>, bool) {
    let Some(api) = get_pnp_api(base_dir) else {
        return (type_roots, from_config);
    };

    let pnp_roots = api.pnp_type_roots(base_dir);
    let from_config = from_config || !pnp_roots.is_empty();
    let mut type_roots = type_roots;
    type_roots.extend(pnp_roots);
    (type_roots, from_config)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PAYLOAD: &str = r#"{
        "enableTopLevelFallback": false,
        "packageRegistryData": [
            [null, [[null, {
                "packageLocation": "./",
                "packageDependencies": [["left", "1.0"], ["@types/left", "1.0"]],
                "linkType": "SOFT"
            }]]],
            ["left", [["1.0", {
                "packageLocation": "./node_modules/left/",
                "packageDependencies": [],
                "linkType": "HARD"
            }]]],
            ["@types/left", [["1.0", {
                "packageLocation": "./node_modules/@types/left/",
                "packageDependencies": [],
                "linkType": "HARD"
            }]]]
        ]
    }"#;

    /// The cache is process-wide state, so its whole lifecycle runs in one
    /// test: discovery, memoization, concurrent access, invalidation.
    #[test]
    fn test_cache_lifecycle() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let root = root.to_str().unwrap();
        std::fs::write(format!("{root}/.pnp.cjs"), "/* loader stub */").unwrap();
        std::fs::write(format!("{root}/.pnp.data.json"), PAYLOAD).unwrap();

        clear_pnp_cache();
        let api = get_pnp_api(&format!("{root}/src/main.ts")).expect("manifest should be found");
        assert_eq!(api.manifest().dir_path(), root);

        // Memoized: later callers get the same instance, whatever path
        // they ask for.
        let again = get_pnp_api("/somewhere/unrelated.ts").unwrap();
        assert!(Arc::ptr_eq(&api, &again));

        // Concurrent callers all observe the single cached instance.
        clear_pnp_cache();
        let entry = format!("{root}/src/main.ts");
        let apis: Vec<_> = std::thread::scope(|scope| {
            (0..8)
                .map(|_| scope.spawn(|| get_pnp_api(&entry)))
                .collect::<Vec<_>>()
                .into_iter()
                .map(|handle| handle.join().unwrap().unwrap())
                .collect()
        });
        for window in apis.windows(2) {
            assert!(Arc::ptr_eq(&window[0], &window[1]));
        }

        // Helpers ride on the cached manifest.
        assert!(is_in_pnp_module(
            &format!("{root}/src/main.ts"),
            &format!("{root}/node_modules/left/index.js"),
        ));
        let (roots, from_config) =
            append_pnp_type_roots(vec!["/existing".to_string()], root, false);
        assert_eq!(
            roots,
            vec![
                "/existing".to_string(),
                format!("{root}/node_modules/@types"),
            ]
        );
        assert!(from_config);

        // A failed discovery is cached as absence until invalidated.
        clear_pnp_cache();
        let missing = TempDir::new().unwrap();
        let missing_root = missing.path().canonicalize().unwrap();
        let missing_file = format!("{}/a.ts", missing_root.to_str().unwrap());
        assert!(get_pnp_api(&missing_file).is_none());
        // Even for paths that do have a manifest: first caller wins.
        assert!(get_pnp_api(&format!("{root}/src/main.ts")).is_none());

        clear_pnp_cache();
        assert!(get_pnp_api(&format!("{root}/src/main.ts")).is_some());
        clear_pnp_cache();
    }
}
