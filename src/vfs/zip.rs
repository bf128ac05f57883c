//! Zip archive reader and the read-only filesystem view inside one archive.

use std::fs::File;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use zip::ZipArchive;

use super::{DirEntry, Entries, FileStat, FileSystem, WalkDirVisitor};
use crate::path::{clean_path, parent_path};

// =============================================================================
// ArchiveReader
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct ZipEntryMeta {
    index: usize,
    size: u64,
}

/// An open zip archive with a pre-built entry index.
///
/// The central directory is parsed once at open time into path lookup
/// tables, so existence probes and listings never touch the archive again;
/// only content reads do, serialized through an internal lock. Readers are
/// shared behind `Arc` by the [`super::ArchiveReaderCache`] and close when
/// the last reference drops.
pub struct ArchiveReader {
    archive: Mutex<ZipArchive<File>>,
    files: FxHashMap<String, ZipEntryMeta>,
    dirs: FxHashSet<String>,
    mtime: SystemTime,
}

impl ArchiveReader {
    /// Open an archive and index its entries.
    ///
    /// Entry names are normalized to rooted forward-slash paths; parent
    /// directories are synthesized for every entry.
    pub fn open(archive_path: &str) -> io::Result<Self> {
        let file = File::open(archive_path)?;
        let mtime = file
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut archive = ZipArchive::new(file).map_err(io::Error::other)?;

        let mut files = FxHashMap::default();
        let mut dirs = FxHashSet::default();
        dirs.insert("/".to_string());

        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(io::Error::other)?;
            let name = entry.name().trim_matches('/');
            if name.is_empty() {
                continue;
            }
            let rooted = format!("/{name}");
            if entry.is_dir() {
                dirs.insert(rooted.clone());
            } else {
                files.insert(
                    rooted.clone(),
                    ZipEntryMeta {
                        index,
                        size: entry.size(),
                    },
                );
            }
            let mut parent = parent_path(&rooted);
            while parent != "/" && dirs.insert(parent.clone()) {
                parent = parent_path(&parent);
            }
        }

        Ok(Self {
            archive: Mutex::new(archive),
            files,
            dirs,
            mtime,
        })
    }

    /// Read the raw bytes of an in-archive file.
    pub fn read(&self, internal_path: &str) -> Option<Vec<u8>> {
        let meta = *self.files.get(internal_path)?;
        let mut archive = self.archive.lock();
        let mut entry = archive.by_index(meta.index).ok()?;
        let mut contents = Vec::with_capacity(meta.size as usize);
        entry.read_to_end(&mut contents).ok()?;
        Some(contents)
    }

    fn entry_stat(&self, internal_path: &str) -> Option<FileStat> {
        if let Some(meta) = self.files.get(internal_path) {
            return Some(FileStat {
                mtime: self.mtime,
                size: meta.size,
                is_dir: false,
            });
        }
        if self.dirs.contains(internal_path) {
            return Some(FileStat {
                mtime: self.mtime,
                size: 0,
                is_dir: true,
            });
        }
        None
    }

    fn children(&self, dir: &str) -> (Vec<String>, Vec<String>) {
        let mut directories: Vec<String> = self
            .dirs
            .iter()
            .filter(|path| path.as_str() != dir && parent_path(path) == dir)
            .map(|path| base_name(path))
            .collect();
        let mut files: Vec<String> = self
            .files
            .keys()
            .filter(|path| parent_path(path) == dir)
            .map(|path| base_name(path))
            .collect();
        directories.sort();
        files.sort();
        (directories, files)
    }
}

fn base_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn read_only_error() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "zip archives are read-only")
}

// =============================================================================
// ZipView
// =============================================================================

/// Filesystem view over one archive, scoped to a single operation.
///
/// Paths are interpreted relative to the archive root (`/src/index.ts`).
/// Mutating operations fail: archives are read-only.
pub struct ZipView {
    reader: Arc<ArchiveReader>,
    case_sensitive: bool,
}

impl ZipView {
    /// Wrap a shared reader, reporting the given case sensitivity.
    pub fn new(reader: Arc<ArchiveReader>, case_sensitive: bool) -> Self {
        Self {
            reader,
            case_sensitive,
        }
    }

    fn walk(&self, dir: &str, visit: &mut WalkDirVisitor<'_>) -> io::Result<()> {
        let entry = DirEntry {
            name: base_name(dir),
            is_dir: true,
        };
        visit(dir, &entry, None)?;

        let (directories, files) = self.reader.children(dir);
        let prefix = if dir == "/" { String::new() } else { dir.to_string() };
        for name in directories {
            self.walk(&format!("{prefix}/{name}"), visit)?;
        }
        for name in files {
            let path = format!("{prefix}/{name}");
            visit(&path, &DirEntry { name, is_dir: false }, None)?;
        }
        Ok(())
    }
}

impl FileSystem for ZipView {
    fn use_case_sensitive_file_names(&self) -> bool {
        self.case_sensitive
    }

    fn file_exists(&self, path: &str) -> bool {
        self.reader.files.contains_key(&clean_path(path))
    }

    fn directory_exists(&self, path: &str) -> bool {
        self.reader.dirs.contains(&clean_path(path))
    }

    fn read_file(&self, path: &str) -> Option<String> {
        let bytes = self.reader.read(&clean_path(path))?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn write_file(&self, _path: &str, _data: &str, _write_byte_order_mark: bool) -> io::Result<()> {
        Err(read_only_error())
    }

    fn remove(&self, _path: &str) -> io::Result<()> {
        Err(read_only_error())
    }

    fn stat(&self, path: &str) -> Option<FileStat> {
        self.reader.entry_stat(&clean_path(path))
    }

    fn realpath(&self, path: &str) -> String {
        clean_path(path)
    }

    fn get_accessible_entries(&self, path: &str) -> Entries {
        let dir = clean_path(path);
        if !self.reader.dirs.contains(&dir) {
            return Entries::default();
        }
        let (directories, files) = self.reader.children(&dir);
        Entries { directories, files }
    }

    fn walk_dir(&self, root: &str, visit: &mut WalkDirVisitor<'_>) -> io::Result<()> {
        let root = clean_path(root);
        if !self.reader.dirs.contains(&root) {
            return Ok(());
        }
        self.walk(&root, visit)
    }

    fn chtimes(&self, _path: &str, _atime: SystemTime, _mtime: SystemTime) -> io::Result<()> {
        Err(read_only_error())
    }
}

// =============================================================================
// Tests
// =============================================================================
