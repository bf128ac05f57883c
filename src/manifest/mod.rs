//! In-memory model of a Plug'n'Play installation manifest.
//!
//! The manifest describes every installed package, its location, and the
//! exact resolution edges between packages. It is produced once by
//! [`parse`], never mutated afterwards, and shared freely across threads.
//!
//! ```text
//! Manifest
//! ├── dir_path              // directory containing .pnp.cjs
//! ├── package_registry      // ident -> reference -> PackageInfo
//! ├── package_trie          // path segments -> owning package
//! ├── fallback_pool / exclusions
//! └── ignore_pattern
//! ```
//!
//! The trie references registry entries by locator, not by owning pointer;
//! the registry owns the `PackageInfo` bodies.

use regex::Regex;
use rustc_hash::FxHashMap;

mod parse;

pub use parse::{load_manifest_from_dir, parse_manifest, ManifestError, MANIFEST_FILE_NAME};

// =============================================================================
// Value types
// =============================================================================

/// Primary key for a package: its real name plus the opaque reference
/// (usually a version or protocol URL) distinguishing multiple installs.
///
/// The empty name/reference pair denotes the top-level application package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Locator {
    /// Package name, e.g. `left` or `@scope/pkg`. Empty for the top level.
    pub name: String,
    /// Opaque reference. Empty for the top level.
    pub reference: String,
}

impl Locator {
    /// Build a locator from name and reference.
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
        }
    }

    /// The top-level application package.
    pub fn top_level() -> Self {
        Self::default()
    }
}

/// One outgoing dependency edge of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDependency {
    /// The name the depending package uses to refer to the dependency.
    pub ident: String,
    /// Target reference; empty means an unfulfilled peer dependency.
    pub reference: String,
    /// The dependency's real name when the edge aliases it under a
    /// different ident; empty for plain edges.
    pub alias_name: String,
}

impl PackageDependency {
    /// Whether this edge aliases the dependency under a different ident.
    pub fn is_alias(&self) -> bool {
        !self.alias_name.is_empty()
    }

    /// The locator this edge resolves to.
    pub fn target_locator(&self) -> Locator {
        if self.is_alias() {
            Locator::new(self.alias_name.clone(), self.reference.clone())
        } else {
            Locator::new(self.ident.clone(), self.reference.clone())
        }
    }
}

/// One installed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Directory of the package, relative to the manifest directory
    /// (e.g. `./.yarn/cache/left-1.0.zip/node_modules/left/`).
    pub package_location: String,
    /// Outgoing dependency edges, in manifest order.
    pub package_dependencies: Vec<PackageDependency>,
    /// Install link type, passed through opaquely.
    pub link_type: String,
    /// When set, the package's files never claim locator ownership; the
    /// package stays resolvable through the registry.
    pub discard_from_lookup: bool,
}

// =============================================================================
// Path-segment trie
// =============================================================================

/// Trie over manifest-relative path segments; each node optionally carries
/// the locator of the package rooted at that path.
#[derive(Debug, Default)]
pub(crate) struct TrieNode {
    pub(crate) package: Option<Locator>,
    pub(crate) children: FxHashMap<String, TrieNode>,
}

impl TrieNode {
    /// Insert a package at its location's segments. The leading `./`
    /// segment of manifest-relative locations is kept as a literal `.`
    /// segment, matching the lookup normalization.
    pub(crate) fn insert(&mut self, location: &str, locator: Locator) {
        let mut node = self;
        for segment in location.trim_end_matches('/').split('/') {
            if segment.is_empty() {
                continue;
            }
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.package = Some(locator);
    }

    /// Longest-prefix descent: follow matching children as far as possible
    /// and return the locator of the deepest visited node that carries one.
    pub(crate) fn lookup<'a, I>(&self, segments: I) -> Option<&Locator>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut node = self;
        let mut found = self.package.as_ref();
        for segment in segments {
            match node.children.get(segment) {
                Some(child) => {
                    node = child;
                    if child.package.is_some() {
                        found = child.package.as_ref();
                    }
                }
                None => break,
            }
        }
        found
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// Parsed, immutable manifest data.
#[derive(Debug)]
pub struct Manifest {
    pub(crate) dir_path: String,
    pub(crate) dependency_tree_roots: Vec<Locator>,
    pub(crate) package_registry: FxHashMap<String, FxHashMap<String, PackageInfo>>,
    pub(crate) package_trie: TrieNode,
    pub(crate) fallback_pool: Vec<(String, String)>,
    pub(crate) fallback_exclusion_map: FxHashMap<String, Vec<String>>,
    pub(crate) enable_top_level_fallback: bool,
    pub(crate) ignore_pattern: Option<Regex>,
}

impl Manifest {
    /// Absolute directory containing the manifest file; package locations
    /// resolve relative to it.
    pub fn dir_path(&self) -> &str {
        &self.dir_path
    }

    /// The workspace roots declared by the installation.
    pub fn dependency_tree_roots(&self) -> &[Locator] {
        &self.dependency_tree_roots
    }

    /// Whether undeclared dependencies may fall back to the top level.
    pub fn enable_top_level_fallback(&self) -> bool {
        self.enable_top_level_fallback
    }

    /// Look up a package by locator.
    pub fn package(&self, locator: &Locator) -> Option<&PackageInfo> {
        self.package_registry
            .get(&locator.name)
            .and_then(|by_reference| by_reference.get(&locator.reference))
    }

    /// Whether fallback is forbidden for this locator.
    pub(crate) fn is_excluded_from_fallback(&self, locator: &Locator) -> bool {
        self.fallback_exclusion_map
            .get(&locator.name)
            .is_some_and(|references| references.contains(&locator.reference))
    }
}

// =============================================================================
// Tests
// =============================================================================
