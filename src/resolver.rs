//! Package resolution against a loaded manifest.
//!
//! [`PnpApi`] combines specifier parsing, locator lookup, and the package
//! registry to compute unqualified resolutions: given a bare specifier and
//! the file requiring it, it returns the absolute path of the target
//! package plus the requested subpath. Qualification (extension probing,
//! `package.json` interpretation) is the caller's business.
//!
//! Failures come in two flavors and are kept apart deliberately:
//! [`Resolution::Skip`] tells the caller to fall through to its other
//! resolution strategies, while [`ResolveError`] carries a user-facing
//! diagnostic that ends the lookup.

use std::fs;

use thiserror::Error;

use crate::manifest::{
    load_manifest_from_dir, Locator, Manifest, ManifestError, PackageDependency, PackageInfo,
    MANIFEST_FILE_NAME,
};
use crate::path::{clean_path, join_paths, parent_path, relative_path};

// =============================================================================
// Results and errors
// =============================================================================

/// Outcome of a successful resolution call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The specifier resolved to this unqualified absolute path.
    Resolved(String),
    /// The specifier is not ours to resolve; the caller should fall
    /// through to its other strategies.
    Skip,
}

/// A malformed bare specifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecifierError {
    /// The specifier is the empty string.
    #[error("empty specifier")]
    Empty,
    /// A scoped specifier without the mandatory `/`.
    #[error("invalid specifier: {specifier}")]
    Invalid {
        /// The offending specifier.
        specifier: String,
    },
}

/// Failure to map a file path to its owning package.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocatorError {
    /// The path cannot be expressed relative to the manifest directory.
    #[error("{path} cannot be made relative to the manifest directory")]
    PathNotRelative {
        /// The offending path.
        path: String,
    },
    /// No package owns the path.
    #[error("no package found for path {path}")]
    NoPackageFound {
        /// The path, relative to the manifest directory.
        path: String,
    },
}

/// A user-facing resolution diagnostic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The requesting package does not declare the dependency.
    #[error("{}", undeclared_dependency_message(.parent_name, .ident, .parent_path))]
    UndeclaredDependency {
        /// Name of the requesting package; empty for the application.
        parent_name: String,
        /// The ident that was requested.
        ident: String,
        /// Path of the requesting file.
        parent_path: String,
    },
    /// The dependency is a peer that no ancestor fulfilled.
    #[error("{}", unfulfilled_peer_dependency_message(.parent_name, .ident, .parent_path))]
    UnfulfilledPeerDependency {
        /// Name of the requesting package; empty for the application.
        parent_name: String,
        /// The ident that was requested.
        ident: String,
        /// Path of the requesting file.
        parent_path: String,
    },
}

fn undeclared_dependency_message(parent_name: &str, ident: &str, parent_path: &str) -> String {
    let lead = if parent_name.is_empty() {
        format!("Your application tried to access {ident}")
    } else {
        format!("{parent_name} tried to access {ident}")
    };
    format!(
        "{lead}, but it isn't declared in your dependencies; \
         this makes the require call ambiguous and unsound.\n\n\
         Required package: {ident}\nRequired by: {parent_path}"
    )
}

fn unfulfilled_peer_dependency_message(parent_name: &str, ident: &str, parent_path: &str) -> String {
    if parent_name.is_empty() {
        format!(
            "Your application tried to access {ident} (a peer dependency); \
             this isn't allowed as there is no ancestor to satisfy the requirement. \
             Use a devDependency if needed.\n\n\
             Required package: {ident}\nRequired by: {parent_path}"
        )
    } else {
        format!(
            "{parent_name} tried to access {ident} (a peer dependency) \
             but it isn't provided by its ancestors/your application; \
             this makes the require call ambiguous and unsound.\n\n\
             Required package: {ident}\nRequired by: {parent_path}"
        )
    }
}

// =============================================================================
// Specifier parsing
// =============================================================================

/// Split a bare specifier into `(ident, subpath)`.
///
/// Scoped specifiers keep the scope in the ident; the subpath keeps its
/// leading `/` and may be empty. Concatenating the parts gives back the
/// input.
///
/// # Example
///
/// ```
/// use pnp_vfs::parse_bare_identifier;
///
/// assert_eq!(
///     parse_bare_identifier("@scope/pkg/deep/file.js").unwrap(),
///     ("@scope/pkg".to_string(), "/deep/file.js".to_string())
/// );
/// assert_eq!(
///     parse_bare_identifier("foo").unwrap(),
///     ("foo".to_string(), String::new())
/// );
/// ```
pub fn parse_bare_identifier(specifier: &str) -> Result<(String, String), SpecifierError> {
    if specifier.is_empty() {
        return Err(SpecifierError::Empty);
    }

    let ident_end = if specifier.starts_with('@') {
        let Some(first_slash) = specifier.find('/') else {
            return Err(SpecifierError::Invalid {
                specifier: specifier.to_string(),
            });
        };
        match specifier[first_slash + 1..].find('/') {
            Some(second_slash) => first_slash + 1 + second_slash,
            None => specifier.len(),
        }
    } else {
        specifier.find('/').unwrap_or(specifier.len())
    };

    Ok((
        specifier[..ident_end].to_string(),
        specifier[ident_end..].to_string(),
    ))
}

// =============================================================================
// PnpApi
// =============================================================================

/// Resolution API over one loaded manifest.
///
/// A `PnpApi` always carries a manifest; construction fails instead of
/// producing an instance that cannot resolve.
pub struct PnpApi {
    url: String,
    manifest: Manifest,
}

impl PnpApi {
    /// Wrap an already-parsed manifest. `url` records the path the
    /// manifest was discovered for.
    pub fn new(url: impl Into<String>, manifest: Manifest) -> Self {
        Self {
            url: url.into(),
            manifest,
        }
    }

    /// Search `file_path` and its ancestors for a manifest file and load
    /// the first hit. The root directory itself is not probed.
    pub fn find_closest(file_path: &str) -> Result<Self, ManifestError> {
        let mut directory = clean_path(file_path);
        loop {
            let candidate = join_paths(&[&directory, MANIFEST_FILE_NAME]);
            if fs::metadata(&candidate).is_ok() {
                let manifest = load_manifest_from_dir(&directory)?;
                return Ok(Self::new(file_path, manifest));
            }
            let parent = parent_path(&directory);
            if parent == "/" || parent == directory {
                return Err(ManifestError::NotFound);
            }
            directory = parent;
        }
    }

    /// The path this API was discovered for.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The loaded manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Look up a package that the manifest is known to contain.
    ///
    /// # Panics
    ///
    /// Panics when the locator has no registry entry; a dependency edge
    /// pointing at a missing package means the manifest is inconsistent.
    pub fn get_package(&self, locator: &Locator) -> &PackageInfo {
        self.manifest.package(locator).unwrap_or_else(|| {
            panic!(
                "{} should have an entry in the package registry",
                locator.name
            )
        })
    }

    /// Map a file path to the locator of the package owning it.
    ///
    /// `Ok(None)` means the path matches the manifest's ignore pattern and
    /// is deliberately not owned by any package.
    pub fn find_locator(&self, parent_path: &str) -> Result<Option<Locator>, LocatorError> {
        let Some(relative) = relative_path(&self.manifest.dir_path, parent_path) else {
            return Err(LocatorError::PathNotRelative {
                path: parent_path.to_string(),
            });
        };

        if let Some(pattern) = &self.manifest.ignore_pattern {
            if pattern.is_match(&relative) {
                return Ok(None);
            }
        }

        // Paths outside the manifest root keep their `..` segments; they
        // only match if some package is itself located outside the root.
        let relative_with_dot = if relative.starts_with("../") {
            relative.clone()
        } else {
            format!("./{relative}")
        };

        match self
            .manifest
            .package_trie
            .lookup(relative_with_dot.split('/'))
        {
            Some(locator) => Ok(Some(locator.clone())),
            None => Err(LocatorError::NoPackageFound { path: relative }),
        }
    }

    /// Consult the top-level package's dependencies, then the fallback
    /// pool, for an ident the requester did not declare.
    pub fn resolve_via_fallback(&self, ident: &str) -> Option<PackageDependency> {
        let top_level = self.get_package(&Locator::top_level());
        if let Some(dependency) = top_level
            .package_dependencies
            .iter()
            .find(|dependency| dependency.ident == ident)
        {
            return Some(dependency.clone());
        }

        self.manifest
            .fallback_pool
            .iter()
            .find(|(name, _)| name == ident)
            .map(|(name, reference)| PackageDependency {
                ident: name.clone(),
                reference: reference.clone(),
                alias_name: String::new(),
            })
    }

    /// Resolve a bare specifier from the file at `parent_path` to an
    /// unqualified absolute path.
    pub fn resolve_to_unqualified(
        &self,
        specifier: &str,
        parent_path: &str,
    ) -> Result<Resolution, ResolveError> {
        let Ok((ident, module_path)) = parse_bare_identifier(specifier) else {
            return Ok(Resolution::Skip);
        };

        let parent_locator = match self.find_locator(parent_path) {
            Ok(Some(locator)) => locator,
            _ => return Ok(Resolution::Skip),
        };

        let parent_package = self.get_package(&parent_locator);
        let mut edge = parent_package
            .package_dependencies
            .iter()
            .find(|dependency| dependency.ident == ident)
            .cloned();

        if edge.is_none()
            && self.manifest.enable_top_level_fallback
            && !self.manifest.is_excluded_from_fallback(&parent_locator)
        {
            edge = self.resolve_via_fallback(&ident);
        }

        let Some(edge) = edge else {
            return Err(ResolveError::UndeclaredDependency {
                parent_name: parent_locator.name,
                ident,
                parent_path: parent_path.to_string(),
            });
        };

        if !edge.is_alias() && edge.reference.is_empty() {
            return Err(ResolveError::UnfulfilledPeerDependency {
                parent_name: parent_locator.name,
                ident,
                parent_path: parent_path.to_string(),
            });
        }

        let dependency = self.get_package(&edge.target_locator());
        Ok(Resolution::Resolved(join_paths(&[
            &self.manifest.dir_path,
            &dependency.package_location,
            &module_path,
        ])))
    }

    /// Type-root directories contributed by the `@types/*` dependencies of
    /// the package owning `current_directory`.
    pub fn pnp_type_roots(&self, current_directory: &str) -> Vec<String> {
        let current_directory = clean_path(current_directory);
        let Ok(Some(locator)) = self.find_locator(&current_directory) else {
            return Vec::new();
        };

        let mut type_roots = Vec::new();
        for dependency in &self.get_package(&locator).package_dependencies {
            if dependency.ident.starts_with("@types/") && !dependency.reference.is_empty() {
                let info = self.get_package(&Locator::new(
                    dependency.ident.clone(),
                    dependency.reference.clone(),
                ));
                type_roots.push(parent_path(&join_paths(&[
                    &self.manifest.dir_path,
                    &info.package_location,
                ])));
            }
        }
        type_roots
    }

    /// Whether two paths live in different packages of this installation.
    pub fn is_in_pnp_module(&self, from: &str, to: &str) -> bool {
        let from = match self.find_locator(from) {
            Ok(Some(locator)) => locator,
            _ => return false,
        };
        let to = match self.find_locator(to) {
            Ok(Some(locator)) => locator,
            _ => return false,
        };
        from.name != to.name
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifest;

    fn sample_api(enable_top_level_fallback: bool) -> PnpApi {
        let payload = format!(
            r#"{{
                "enableTopLevelFallback": {enable_top_level_fallback},
                "ignorePatternData": "^ignored(/|$)",
                "fallbackExclusionList": [["excluded", ["1.0"]]],
                "fallbackPool": [["poolonly", "6.0"], ["left", "9.9"]],
                "packageRegistryData": [
                    [null, [[null, {{
                        "packageLocation": "./",
                        "packageDependencies": [["left", "1.0"], ["pooled", "3.0"]],
                        "linkType": "SOFT"
                    }}]]],
                    ["left", [["1.0", {{
                        "packageLocation": "./node_modules/left/",
                        "packageDependencies": [
                            ["right", "2.0"],
                            ["peer", null],
                            ["renamed", ["actual", "4.0"]],
                            ["@types/node", "20.1"]
                        ],
                        "linkType": "HARD"
                    }}]]],
                    ["excluded", [["1.0", {{
                        "packageLocation": "./node_modules/excluded/",
                        "packageDependencies": [],
                        "linkType": "HARD"
                    }}]]],
                    ["right", [["2.0", {{
                        "packageLocation": "./.yarn/cache/right-2.0/",
                        "packageDependencies": [],
                        "linkType": "HARD"
                    }}]]],
                    ["actual", [["4.0", {{
                        "packageLocation": "./.yarn/cache/actual-4.0/",
                        "packageDependencies": [],
                        "linkType": "HARD"
                    }}]]],
                    ["pooled", [["3.0", {{
                        "packageLocation": "./.yarn/cache/pooled-3.0/",
                        "packageDependencies": [],
                        "linkType": "HARD"
                    }}]]],
                    ["poolonly", [["6.0", {{
                        "packageLocation": "./.yarn/cache/poolonly-6.0/",
                        "packageDependencies": [],
                        "linkType": "HARD"
                    }}]]],
                    ["@types/node", [["20.1", {{
                        "packageLocation": "./.yarn/cache/types-node-20.1/node_modules/@types/node/",
                        "packageDependencies": [],
                        "linkType": "HARD"
                    }}]]]
                ]
            }}"#
        );
        PnpApi::new("/dir", parse_manifest("/dir", &payload).unwrap())
    }

    #[test]
    fn test_parse_bare_identifier_edges() {
        assert_eq!(parse_bare_identifier(""), Err(SpecifierError::Empty));
        assert_eq!(
            parse_bare_identifier("@scope"),
            Err(SpecifierError::Invalid {
                specifier: "@scope".to_string()
            })
        );
        assert_eq!(
            parse_bare_identifier("@scope/name").unwrap(),
            ("@scope/name".to_string(), String::new())
        );
        assert_eq!(
            parse_bare_identifier("@scope/name/x/y").unwrap(),
            ("@scope/name".to_string(), "/x/y".to_string())
        );
        assert_eq!(
            parse_bare_identifier("foo/bar").unwrap(),
            ("foo".to_string(), "/bar".to_string())
        );
    }

    #[test]
    fn test_parse_bare_identifier_inverts_concatenation() {
        let pairs = [
            ("foo", ""),
            ("foo", "/bar"),
            ("foo", "/bar/baz.js"),
            ("@scope/name", ""),
            ("@scope/name", "/deep/file.js"),
        ];
        for (ident, subpath) in pairs {
            let spec = format!("{ident}{subpath}");
            assert_eq!(
                parse_bare_identifier(&spec).unwrap(),
                (ident.to_string(), subpath.to_string()),
                "{spec}"
            );
        }
    }

    #[test]
    fn test_transitive_resolution() {
        let api = sample_api(false);
        let resolution = api
            .resolve_to_unqualified("right/index.js", "/dir/node_modules/left/src/a.js")
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved("/dir/.yarn/cache/right-2.0/index.js".to_string())
        );
    }

    #[test]
    fn test_top_level_resolution() {
        let api = sample_api(false);
        let resolution = api.resolve_to_unqualified("left", "/dir/src/main.ts").unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved("/dir/node_modules/left".to_string())
        );
    }

    #[test]
    fn test_alias_edge_resolves_to_real_package() {
        let api = sample_api(false);
        let resolution = api
            .resolve_to_unqualified("renamed/lib.js", "/dir/node_modules/left/index.js")
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved("/dir/.yarn/cache/actual-4.0/lib.js".to_string())
        );
    }

    #[test]
    fn test_undeclared_dependency_diagnostic() {
        let api = sample_api(false);
        let err = api
            .resolve_to_unqualified("unknown", "/dir/node_modules/left/src/a.js")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("left tried to access unknown"), "{message}");
        assert!(message.contains("Required by: /dir/node_modules/left/src/a.js"));
    }

    #[test]
    fn test_undeclared_from_application_phrasing() {
        let api = sample_api(false);
        let err = api
            .resolve_to_unqualified("unknown", "/dir/src/main.ts")
            .unwrap_err();
        assert!(err.to_string().starts_with("Your application tried to access unknown"));
    }

    #[test]
    fn test_unfulfilled_peer_dependency_diagnostic() {
        let api = sample_api(false);
        let err = api
            .resolve_to_unqualified("peer", "/dir/node_modules/left/src/a.js")
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnfulfilledPeerDependency { .. }));
        assert!(err.to_string().contains("(a peer dependency)"));
    }

    #[test]
    fn test_fallback_pool() {
        let api = sample_api(true);
        // `pooled` is undeclared by left but declared at the top level.
        let resolution = api
            .resolve_to_unqualified("pooled", "/dir/node_modules/left/index.js")
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved("/dir/.yarn/cache/pooled-3.0".to_string())
        );

        // `poolonly` only exists in the fallback pool.
        let resolution = api
            .resolve_to_unqualified("poolonly", "/dir/node_modules/left/index.js")
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved("/dir/.yarn/cache/poolonly-6.0".to_string())
        );

        // Top-level dependencies win over fallback pool entries: `left` is
        // pooled at 9.9 but declared at the top level as 1.0.
        let resolution = api
            .resolve_to_unqualified("left", "/dir/.yarn/cache/right-2.0/index.js")
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved("/dir/node_modules/left".to_string())
        );
    }

    #[test]
    fn test_fallback_disabled_or_excluded() {
        // Disabled: undeclared stays undeclared.
        let api = sample_api(false);
        assert!(api
            .resolve_to_unqualified("pooled", "/dir/node_modules/left/index.js")
            .is_err());

        // Excluded packages never fall back.
        let api = sample_api(true);
        let err = api
            .resolve_to_unqualified("pooled", "/dir/node_modules/excluded/index.js")
            .unwrap_err();
        assert!(matches!(err, ResolveError::UndeclaredDependency { .. }));
    }

    #[test]
    fn test_skip_outcomes() {
        let api = sample_api(false);
        // Malformed specifier.
        assert_eq!(
            api.resolve_to_unqualified("@scope", "/dir/src/main.ts").unwrap(),
            Resolution::Skip
        );
        // Parent outside the manifest directory.
        assert_eq!(
            api.resolve_to_unqualified("left", "/elsewhere/a.js").unwrap(),
            Resolution::Skip
        );
        // Parent matching the ignore pattern.
        assert_eq!(
            api.resolve_to_unqualified("left", "/dir/ignored/a.js").unwrap(),
            Resolution::Skip
        );
    }

    #[test]
    fn test_find_locator() {
        let api = sample_api(false);
        assert_eq!(
            api.find_locator("/dir/node_modules/left/src/a.js").unwrap(),
            Some(Locator::new("left", "1.0"))
        );
        assert_eq!(
            api.find_locator("/dir/src/main.ts").unwrap(),
            Some(Locator::top_level())
        );
        assert_eq!(api.find_locator("/dir/ignored/x.js").unwrap(), None);
        assert!(matches!(
            api.find_locator("/elsewhere/a.js"),
            Err(LocatorError::NoPackageFound { .. })
        ));
    }

    #[test]
    fn test_pnp_type_roots() {
        let api = sample_api(false);
        assert_eq!(
            api.pnp_type_roots("/dir/node_modules/left"),
            vec!["/dir/.yarn/cache/types-node-20.1/node_modules/@types".to_string()]
        );
        assert!(api.pnp_type_roots("/elsewhere").is_empty());
    }

    #[test]
    fn test_is_in_pnp_module() {
        let api = sample_api(false);
        assert!(api.is_in_pnp_module(
            "/dir/src/main.ts",
            "/dir/node_modules/left/index.js"
        ));
        assert!(!api.is_in_pnp_module(
            "/dir/node_modules/left/a.js",
            "/dir/node_modules/left/b.js"
        ));
        assert!(!api.is_in_pnp_module("/dir/src/main.ts", "/elsewhere/x.js"));
    }

    #[test]
    #[should_panic(expected = "should have an entry in the package registry")]
    fn test_missing_registry_entry_panics() {
        let api = sample_api(false);
        api.get_package(&Locator::new("ghost", "0.0"));
    }
}
