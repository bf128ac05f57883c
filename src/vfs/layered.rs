//! Layered filesystem: virtual-path rewriting plus zip archive routing.
//!
//! Every operation follows one dispatch template:
//!
//! ```text
//! input path
//!   │ resolve_virtual             // strip /__virtual__/<hash>/<n>/ wrapping
//!   ├─ ends with .zip             // existence probes go to the underlying
//!   │                             // FS as FILE probes (archives are files
//!   │                             // with directory-like semantics)
//!   ├─ contains .zip/ + readable  // in-archive view via the reader cache
//!   └─ otherwise                  // underlying FS, byte-identical path
//! ```
//!
//! Operations that return paths re-prepend the archive path to each entry
//! and re-tag the result with [`make_virtual_path`], so callers see paths
//! stable under virtual wrapping.

use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use super::cache::{ArchiveReaderCache, DEFAULT_MAX_OPEN_READERS};
use super::zip::ZipView;
use super::{Entries, FileStat, FileSystem, WalkDirVisitor};
use crate::path::{is_zip_path, join_paths, split_zip_path};
use crate::vpath::{make_virtual_path, resolve_virtual, VirtualResolution};

/// Filesystem layer that exposes zip archives as directories and resolves
/// virtual paths, delegating everything else to the underlying filesystem.
pub struct PnpFs {
    fs: Arc<dyn FileSystem>,
    readers: ArchiveReaderCache,
}

enum Target {
    /// Delegate to the underlying filesystem with this path.
    Underlying(String),
    /// Dispatch against an in-archive view.
    Archive {
        view: ZipView,
        internal: String,
        archive_path: String,
    },
}

impl PnpFs {
    /// Layer over an underlying filesystem with the default reader bound.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with_max_open_readers(fs, DEFAULT_MAX_OPEN_READERS)
    }

    /// Layer over an underlying filesystem with an explicit reader bound.
    pub fn with_max_open_readers(fs: Arc<dyn FileSystem>, max_open_readers: usize) -> Self {
        Self {
            fs,
            readers: ArchiveReaderCache::new(max_open_readers),
        }
    }

    /// Close all cached archive readers. Call when the dependency
    /// installation is invalidated.
    pub fn clear_archive_cache(&self) {
        self.readers.clear();
    }

    /// Pick the filesystem a real (virtual-stripped) path dispatches to.
    ///
    /// A path that looks archive-backed but whose archive is absent or
    /// unreadable falls back to the underlying filesystem untouched.
    fn target(&self, path: &str) -> Target {
        if !is_zip_path(path) {
            return Target::Underlying(path.to_string());
        }

        let (archive_path, internal) = split_zip_path(path);
        let Some(stat) = self.fs.stat(&archive_path) else {
            return Target::Underlying(path.to_string());
        };
        let Some(reader) = self.readers.get(&archive_path, stat.mtime) else {
            return Target::Underlying(path.to_string());
        };

        Target::Archive {
            view: ZipView::new(reader, self.fs.use_case_sensitive_file_names()),
            internal,
            archive_path,
        }
    }

    /// Re-tag a path produced by a dispatched operation: re-prepend the
    /// archive path, then restore the virtual wrapping.
    fn retag(&self, resolved: &VirtualResolution, archive_path: &str, path: &str) -> String {
        make_virtual_path(&resolved.base, &resolved.hash, &join_paths(&[archive_path, path]))
    }
}

impl FileSystem for PnpFs {
    fn use_case_sensitive_file_names(&self) -> bool {
        // The dependency manifest's path model is case-sensitive regardless
        // of the underlying filesystem.
        true
    }

    fn file_exists(&self, path: &str) -> bool {
        let real = resolve_virtual(path).real;
        if real.ends_with(".zip") {
            return self.fs.file_exists(&real);
        }
        match self.target(&real) {
            Target::Underlying(path) => self.fs.file_exists(&path),
            Target::Archive { view, internal, .. } => view.file_exists(&internal),
        }
    }

    fn directory_exists(&self, path: &str) -> bool {
        let real = resolve_virtual(path).real;
        if real.ends_with(".zip") {
            return self.fs.file_exists(&real);
        }
        match self.target(&real) {
            Target::Underlying(path) => self.fs.directory_exists(&path),
            Target::Archive { view, internal, .. } => view.directory_exists(&internal),
        }
    }

    fn read_file(&self, path: &str) -> Option<String> {
        let real = resolve_virtual(path).real;
        match self.target(&real) {
            Target::Underlying(path) => self.fs.read_file(&path),
            Target::Archive { view, internal, .. } => view.read_file(&internal),
        }
    }

    fn write_file(&self, path: &str, data: &str, write_byte_order_mark: bool) -> io::Result<()> {
        let real = resolve_virtual(path).real;
        match self.target(&real) {
            Target::Underlying(path) => self.fs.write_file(&path, data, write_byte_order_mark),
            Target::Archive { view, internal, .. } => {
                view.write_file(&internal, data, write_byte_order_mark)
            }
        }
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let real = resolve_virtual(path).real;
        match self.target(&real) {
            Target::Underlying(path) => self.fs.remove(&path),
            Target::Archive { view, internal, .. } => view.remove(&internal),
        }
    }

    fn stat(&self, path: &str) -> Option<FileStat> {
        let real = resolve_virtual(path).real;
        match self.target(&real) {
            Target::Underlying(path) => self.fs.stat(&path),
            Target::Archive { view, internal, .. } => view.stat(&internal),
        }
    }

    fn realpath(&self, path: &str) -> String {
        let resolved = resolve_virtual(path);
        match self.target(&resolved.real) {
            Target::Underlying(path) => self.retag(&resolved, "", &self.fs.realpath(&path)),
            Target::Archive {
                view,
                internal,
                archive_path,
            } => {
                let inner = view.realpath(&internal);
                self.retag(&resolved, &archive_path, &inner)
            }
        }
    }

    fn get_accessible_entries(&self, path: &str) -> Entries {
        let resolved = resolve_virtual(path);
        let (entries, archive_path) = match self.target(&resolved.real) {
            Target::Underlying(path) => (self.fs.get_accessible_entries(&path), String::new()),
            Target::Archive {
                view,
                internal,
                archive_path,
            } => (view.get_accessible_entries(&internal), archive_path),
        };
        Entries {
            directories: entries
                .directories
                .iter()
                .map(|dir| self.retag(&resolved, &archive_path, dir))
                .collect(),
            files: entries
                .files
                .iter()
                .map(|file| self.retag(&resolved, &archive_path, file))
                .collect(),
        }
    }

    fn walk_dir(&self, root: &str, visit: &mut WalkDirVisitor<'_>) -> io::Result<()> {
        let resolved = resolve_virtual(root);
        match self.target(&resolved.real) {
            Target::Underlying(path) => self.fs.walk_dir(&path, &mut |path, entry, err| {
                visit(&self.retag(&resolved, "", path), entry, err)
            }),
            Target::Archive {
                view,
                internal,
                archive_path,
            } => view.walk_dir(&internal, &mut |path, entry, err| {
                visit(&self.retag(&resolved, &archive_path, path), entry, err)
            }),
        }
    }

    fn chtimes(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> io::Result<()> {
        let real = resolve_virtual(path).real;
        match self.target(&real) {
            Target::Underlying(path) => self.fs.chtimes(&path, atime, mtime),
            Target::Archive { view, internal, .. } => view.chtimes(&internal, atime, mtime),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
