//! Manifest loading.
//!
//! Installations ship their dependency graph as `.pnp.cjs`, a loader
//! script defined by the Yarn Plug'n'Play specification (version 3; see
//! <https://yarnpkg.com/advanced/pnp-spec>). The graph data is either
//! inlined into the script as a single-quoted JSON payload or written next
//! to it as `.pnp.data.json`. Both forms are supported here; the script
//! itself is never executed.

use std::fs;
use std::io;

use serde::Deserialize;
use thiserror::Error;

use super::{Locator, Manifest, PackageDependency, PackageInfo, TrieNode};
use crate::path::{clean_path, join_paths};

/// File name of the Plug'n'Play loader script.
pub const MANIFEST_FILE_NAME: &str = ".pnp.cjs";

/// File name of the external data form.
const DATA_FILE_NAME: &str = ".pnp.data.json";

/// Marker preceding the inlined payload inside `.pnp.cjs`.
const INLINE_STATE_MARKER: &str = "RAW_RUNTIME_STATE";

/// Failure while locating or decoding a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No manifest file exists in the searched directories.
    #[error("no PnP manifest found")]
    NotFound,

    /// The manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    Io(#[from] io::Error),

    /// `.pnp.cjs` carries no recognizable inlined payload.
    #[error("no runtime state payload found in {MANIFEST_FILE_NAME}")]
    MissingPayload,

    /// The payload is not valid manifest JSON.
    #[error("malformed manifest data: {0}")]
    Json(#[from] serde_json::Error),

    /// The manifest's ignore pattern does not compile.
    #[error("invalid ignore pattern: {0}")]
    IgnorePattern(#[from] regex::Error),
}

// =============================================================================
// Raw serde model
// =============================================================================

// The wire format favors pair-lists over objects so that idents and
// references can be null (both stand for the top-level package).

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    #[serde(default)]
    dependency_tree_roots: Vec<RawTreeRoot>,
    #[serde(default)]
    enable_top_level_fallback: bool,
    #[serde(default)]
    fallback_exclusion_list: Vec<(Option<String>, Vec<String>)>,
    #[serde(default)]
    fallback_pool: Vec<(Option<String>, RawDependencyTarget)>,
    #[serde(default)]
    ignore_pattern_data: Option<String>,
    package_registry_data: Vec<(Option<String>, Vec<(Option<String>, RawPackageInfo)>)>,
}

#[derive(Deserialize)]
struct RawTreeRoot {
    name: String,
    reference: String,
}

/// A dependency value: a plain reference, an `[alias-target, reference]`
/// pair, or null for an unfulfilled peer dependency.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDependencyTarget {
    Reference(String),
    Alias(String, String),
    Missing,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPackageInfo {
    package_location: String,
    #[serde(default)]
    package_dependencies: Vec<(String, RawDependencyTarget)>,
    #[serde(default)]
    link_type: String,
    #[serde(default)]
    discard_from_lookup: bool,
}

// =============================================================================
// Loading
// =============================================================================

/// Load and parse the manifest stored in `dir_path`.
///
/// Prefers `.pnp.data.json` when present, otherwise extracts the payload
/// inlined into `.pnp.cjs`.
pub fn load_manifest_from_dir(dir_path: &str) -> Result<Manifest, ManifestError> {
    let data_path = join_paths(&[dir_path, DATA_FILE_NAME]);
    if fs::metadata(&data_path).is_ok() {
        let payload = fs::read_to_string(&data_path)?;
        return parse_manifest(dir_path, &payload);
    }

    let script_path = join_paths(&[dir_path, MANIFEST_FILE_NAME]);
    let script = fs::read_to_string(&script_path)?;
    let payload = extract_inline_payload(&script).ok_or(ManifestError::MissingPayload)?;
    parse_manifest(dir_path, &payload)
}

/// Parse a manifest JSON payload rooted at `dir_path`.
pub fn parse_manifest(dir_path: &str, payload: &str) -> Result<Manifest, ManifestError> {
    let raw: RawManifest = serde_json::from_str(payload)?;

    let ignore_pattern = raw
        .ignore_pattern_data
        .as_deref()
        .filter(|pattern| !pattern.is_empty())
        .map(regex::Regex::new)
        .transpose()?;

    let mut package_registry: rustc_hash::FxHashMap<
        String,
        rustc_hash::FxHashMap<String, PackageInfo>,
    > = rustc_hash::FxHashMap::default();
    let mut package_trie = TrieNode::default();

    for (ident, by_reference) in raw.package_registry_data {
        let ident = ident.unwrap_or_default();
        let references = package_registry.entry(ident.clone()).or_default();
        for (reference, info) in by_reference {
            let reference = reference.unwrap_or_default();
            let info = convert_package_info(info);
            if !info.discard_from_lookup {
                package_trie.insert(
                    &info.package_location,
                    Locator::new(ident.clone(), reference.clone()),
                );
            }
            references.insert(reference, info);
        }
    }

    Ok(Manifest {
        dir_path: clean_path(dir_path),
        dependency_tree_roots: raw
            .dependency_tree_roots
            .into_iter()
            .map(|root| Locator::new(root.name, root.reference))
            .collect(),
        package_registry,
        package_trie,
        fallback_pool: raw
            .fallback_pool
            .into_iter()
            .map(|(ident, target)| {
                let reference = match target {
                    RawDependencyTarget::Reference(reference) => reference,
                    RawDependencyTarget::Alias(_, reference) => reference,
                    RawDependencyTarget::Missing => String::new(),
                };
                (ident.unwrap_or_default(), reference)
            })
            .collect(),
        fallback_exclusion_map: raw
            .fallback_exclusion_list
            .into_iter()
            .map(|(ident, references)| (ident.unwrap_or_default(), references))
            .collect(),
        enable_top_level_fallback: raw.enable_top_level_fallback,
        ignore_pattern,
    })
}

fn convert_package_info(raw: RawPackageInfo) -> PackageInfo {
    PackageInfo {
        package_location: raw.package_location,
        package_dependencies: raw
            .package_dependencies
            .into_iter()
            .map(|(ident, target)| match target {
                RawDependencyTarget::Reference(reference) => PackageDependency {
                    ident,
                    reference,
                    alias_name: String::new(),
                },
                RawDependencyTarget::Alias(alias_name, reference) => PackageDependency {
                    ident,
                    reference,
                    alias_name,
                },
                RawDependencyTarget::Missing => PackageDependency {
                    ident,
                    reference: String::new(),
                    alias_name: String::new(),
                },
            })
            .collect(),
        link_type: raw.link_type,
        discard_from_lookup: raw.discard_from_lookup,
    }
}

/// Extract the single-quoted JSON payload assigned to `RAW_RUNTIME_STATE`,
/// undoing the `\'` and `\\` escaping applied when it was inlined.
fn extract_inline_payload(script: &str) -> Option<String> {
    let marker = script.find(INLINE_STATE_MARKER)?;
    let rest = &script[marker + INLINE_STATE_MARKER.len()..];
    let open = rest.find('\'')?;
    let mut payload = String::new();
    let mut chars = rest[open + 1..].chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => return Some(payload),
            '\\' => match chars.next()? {
                escaped @ ('\'' | '\\') => payload.push(escaped),
                other => {
                    payload.push('\\');
                    payload.push(other);
                }
            },
            other => payload.push(other),
        }
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
