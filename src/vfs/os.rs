//! Plain-disk filesystem backed by `std::fs`.

use std::fs;
use std::io;
use std::time::SystemTime;

use super::{DirEntry, Entries, FileStat, FileSystem, WalkDirVisitor};

/// Filesystem that forwards every operation to the OS.
#[derive(Debug, Clone)]
pub struct OsFileSystem {
    case_sensitive: bool,
}

impl OsFileSystem {
    /// Create a disk filesystem with platform-default case sensitivity.
    pub fn new() -> Self {
        Self {
            case_sensitive: !cfg!(any(windows, target_os = "macos")),
        }
    }

    /// Override the reported case sensitivity.
    pub fn with_case_sensitivity(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }

    fn walk(&self, dir: &str, visit: &mut WalkDirVisitor<'_>) -> io::Result<()> {
        let entry = DirEntry {
            name: base_name(dir),
            is_dir: true,
        };
        let read = match fs::read_dir(dir) {
            Ok(read) => {
                visit(dir, &entry, None)?;
                read
            }
            Err(err) => {
                return visit(dir, &entry, Some(&err));
            }
        };

        let mut children: Vec<(String, bool)> = read
            .filter_map(|child| child.ok())
            .filter_map(|child| {
                let name = child.file_name().into_string().ok()?;
                let is_dir = child.metadata().map(|m| m.is_dir()).unwrap_or(false);
                Some((name, is_dir))
            })
            .collect();
        children.sort();

        for (name, is_dir) in children {
            let child_path = format!("{}/{}", dir.trim_end_matches('/'), name);
            if is_dir {
                self.walk(&child_path, visit)?;
            } else {
                visit(&child_path, &DirEntry { name, is_dir: false }, None)?;
            }
        }
        Ok(())
    }
}

impl Default for OsFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn base_name(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

impl FileSystem for OsFileSystem {
    fn use_case_sensitive_file_names(&self) -> bool {
        self.case_sensitive
    }

    fn file_exists(&self, path: &str) -> bool {
        fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
    }

    fn directory_exists(&self, path: &str) -> bool {
        fs::metadata(path).map(|meta| meta.is_dir()).unwrap_or(false)
    }

    fn read_file(&self, path: &str) -> Option<String> {
        let bytes = fs::read(path).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn write_file(&self, path: &str, data: &str, write_byte_order_mark: bool) -> io::Result<()> {
        if write_byte_order_mark {
            let mut contents = String::with_capacity(data.len() + 3);
            contents.push('\u{FEFF}');
            contents.push_str(data);
            fs::write(path, contents)
        } else {
            fs::write(path, data)
        }
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let meta = fs::metadata(path)?;
        if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn stat(&self, path: &str) -> Option<FileStat> {
        let meta = fs::metadata(path).ok()?;
        Some(FileStat {
            mtime: meta.modified().ok()?,
            size: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    fn realpath(&self, path: &str) -> String {
        fs::canonicalize(path)
            .ok()
            .and_then(|resolved| resolved.to_str().map(str::to_string))
            .unwrap_or_else(|| path.to_string())
    }

    fn get_accessible_entries(&self, path: &str) -> Entries {
        let Ok(read) = fs::read_dir(path) else {
            return Entries::default();
        };
        let mut entries = Entries::default();
        for child in read.filter_map(|child| child.ok()) {
            let Ok(name) = child.file_name().into_string() else {
                continue;
            };
            // Follow symlinks when classifying, skip entries that fail to stat.
            match fs::metadata(child.path()) {
                Ok(meta) if meta.is_dir() => entries.directories.push(name),
                Ok(_) => entries.files.push(name),
                Err(_) => {}
            }
        }
        entries.directories.sort();
        entries.files.sort();
        entries
    }

    fn walk_dir(&self, root: &str, visit: &mut WalkDirVisitor<'_>) -> io::Result<()> {
        self.walk(root, visit)
    }

    fn chtimes(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> io::Result<()> {
        let file = fs::File::options().write(true).open(path)?;
        let times = fs::FileTimes::new().set_accessed(atime).set_modified(mtime);
        file.set_times(times)
    }
}

// =============================================================================
// Tests
// =============================================================================
