//! # pnp-vfs
//!
//! Yarn Plug'n'Play package resolution and a zip-backed virtual filesystem
//! for type-aware build tools.
//!
//! Plug'n'Play installations keep packages inside zip archives described by
//! a single `.pnp.cjs` manifest instead of materializing a `node_modules`
//! tree. Tooling that wants to type-check such a project needs two things,
//! and this crate provides both:
//!
//! - **Resolution**: map a bare specifier (`foo`, `@scope/bar/sub`) and the
//!   file requiring it to the absolute path of the target package, honoring
//!   dependency edges, aliases, peer dependencies, and fallback.
//! - **Filesystem**: read files addressed as `/…/pkg.zip/lib/index.js` or
//!   through `/__virtual__/<hash>/<n>/` prefixes as if they sat on disk,
//!   with a bounded cache of open archive readers.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pnp_vfs::{get_pnp_api, FileSystem, OsFileSystem, PnpFs, Resolution};
//!
//! // Resolution: discover the manifest once, then resolve specifiers.
//! let api = get_pnp_api("/project/src/main.ts").expect("PnP project");
//! match api.resolve_to_unqualified("lodash/merge", "/project/src/main.ts") {
//!     Ok(Resolution::Resolved(path)) => println!("-> {path}"),
//!     Ok(Resolution::Skip) => { /* fall through to other strategies */ }
//!     Err(diagnostic) => eprintln!("{diagnostic}"),
//! }
//!
//! // Filesystem: layer archive + virtual handling over the disk.
//! let fs = PnpFs::new(Arc::new(OsFileSystem::new()));
//! let source = fs.read_file("/project/.yarn/cache/lodash.zip/lib/merge.js");
//! ```
//!
//! ## Layering
//!
//! The resolver and the filesystem are independent: the type-checker asks
//! the resolver where a specifier lives, and separately issues file
//! operations through [`PnpFs`], which routes each path to the disk or to
//! an in-archive view. Both sides share the same path conventions:
//! forward slashes, absolute, case-sensitive.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod manifest;
pub mod path;
pub mod resolver;
pub mod vfs;
pub mod vpath;

// =============================================================================
// Prelude - import commonly used items with a single `use`
// =============================================================================

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
///
/// ```ignore
/// use pnp_vfs::prelude::*;
/// ```
pub mod prelude {
    // Resolution
    pub use crate::{
        clear_pnp_cache, get_pnp_api, parse_bare_identifier, Locator, PnpApi, Resolution,
        ResolveError,
    };

    // Filesystem
    pub use crate::{FileSystem, OsFileSystem, PnpFs};

    // Virtual paths
    pub use crate::{is_pnp_virtual_path, make_virtual_path, resolve_virtual};
}

// =============================================================================
// Resolution
// =============================================================================

pub use api::{append_pnp_type_roots, clear_pnp_cache, get_pnp_api, is_in_pnp_module};
pub use manifest::{
    load_manifest_from_dir, parse_manifest, Locator, Manifest, ManifestError, PackageDependency,
    PackageInfo, MANIFEST_FILE_NAME,
};
pub use resolver::{
    parse_bare_identifier, LocatorError, PnpApi, Resolution, ResolveError, SpecifierError,
};

// =============================================================================
// Filesystem
// =============================================================================

pub use vfs::{
    ArchiveReader, ArchiveReaderCache, DirEntry, Entries, FileStat, FileSystem, OsFileSystem,
    PnpFs, WalkDirVisitor, ZipView,
};

// =============================================================================
// Paths
// =============================================================================

pub use path::{is_virtual_path, is_zip_path, split_zip_path};
pub use vpath::{is_pnp_virtual_path, make_virtual_path, resolve_virtual, VirtualResolution};
