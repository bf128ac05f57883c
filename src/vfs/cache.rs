//! Bounded pool of open archive readers.
//!
//! Parsing a zip central directory is expensive relative to the many
//! per-file probes a type-checker issues, so open readers are kept around
//! and keyed by archive path plus modification time; any change to the
//! archive installs a fresh reader on the next access.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::zip::ArchiveReader;

/// Default bound on simultaneously open readers.
pub(crate) const DEFAULT_MAX_OPEN_READERS: usize = 80;

struct CachedArchiveReader {
    reader: Arc<ArchiveReader>,
    last_used: Instant,
    archive_mtime: SystemTime,
}

/// Bounded LRU of open [`ArchiveReader`]s keyed by archive path.
///
/// All lookups, inserts, and evictions serialize on one lock; readers are
/// handed out as `Arc` clones and used outside the lock. At capacity the
/// entry with the smallest `last_used` is dropped before inserting; an
/// evicted reader closes once its last in-flight user finishes.
pub struct ArchiveReaderCache {
    max_open_readers: usize,
    readers: Mutex<FxHashMap<String, CachedArchiveReader>>,
}

impl ArchiveReaderCache {
    /// Create a cache holding at most `max_open_readers` readers.
    pub fn new(max_open_readers: usize) -> Self {
        Self {
            max_open_readers,
            readers: Mutex::new(FxHashMap::default()),
        }
    }

    /// Get the reader for an archive, reusing a cached one when its
    /// recorded mtime matches `archive_mtime`.
    ///
    /// Opens (and caches) a new reader otherwise; `None` when the archive
    /// cannot be opened. The caller stats the archive and passes the
    /// observed mtime, keeping filesystem access out of the lock's concern.
    pub fn get(&self, archive_path: &str, archive_mtime: SystemTime) -> Option<Arc<ArchiveReader>> {
        let mut readers = self.readers.lock();

        if let Some(cached) = readers.get_mut(archive_path) {
            if cached.archive_mtime == archive_mtime {
                cached.last_used = Instant::now();
                return Some(cached.reader.clone());
            }
        }

        let reader = Arc::new(ArchiveReader::open(archive_path).ok()?);
        if readers.len() >= self.max_open_readers {
            evict_oldest(&mut readers);
        }
        readers.insert(
            archive_path.to_string(),
            CachedArchiveReader {
                reader: reader.clone(),
                last_used: Instant::now(),
                archive_mtime,
            },
        );
        Some(reader)
    }

    /// Drop every cached reader.
    pub fn clear(&self) {
        self.readers.lock().clear();
    }

    /// Number of currently open readers.
    pub fn open_reader_count(&self) -> usize {
        self.readers.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, archive_path: &str) -> bool {
        self.readers.lock().contains_key(archive_path)
    }
}

fn evict_oldest(readers: &mut FxHashMap<String, CachedArchiveReader>) {
    let oldest = readers
        .iter()
        .min_by_key(|(_, cached)| cached.last_used)
        .map(|(path, _)| path.clone());
    if let Some(path) = oldest {
        readers.remove(&path);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_zip(dir: &TempDir, name: &str, contents: &str) -> String {
        let zip_path = dir.path().join(name);
        let mut writer = zip::ZipWriter::new(File::create(&zip_path).unwrap());
        writer
            .start_file("data.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
        writer.finish().unwrap();
        zip_path.to_str().unwrap().to_string()
    }

    fn mtime(seconds: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(seconds)
    }

    #[test]
    fn test_reuses_reader_for_matching_mtime() {
        let dir = TempDir::new().unwrap();
        let cache = ArchiveReaderCache::new(4);
        let path = write_zip(&dir, "a.zip", "one");

        let first = cache.get(&path, mtime(1)).unwrap();
        let second = cache.get(&path, mtime(1)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.open_reader_count(), 1);
    }

    #[test]
    fn test_mtime_change_installs_fresh_reader() {
        let dir = TempDir::new().unwrap();
        let cache = ArchiveReaderCache::new(4);
        let path = write_zip(&dir, "a.zip", "one");

        let stale = cache.get(&path, mtime(1)).unwrap();
        let fresh = cache.get(&path, mtime(2)).unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert_eq!(cache.open_reader_count(), 1);
    }

    #[test]
    fn test_capacity_bound_evicts_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let cache = ArchiveReaderCache::new(2);
        let a = write_zip(&dir, "a.zip", "a");
        let b = write_zip(&dir, "b.zip", "b");
        let c = write_zip(&dir, "c.zip", "c");

        cache.get(&a, mtime(1)).unwrap();
        cache.get(&b, mtime(1)).unwrap();
        // Touch `a` so `b` becomes the least recently used entry.
        cache.get(&a, mtime(1)).unwrap();
        cache.get(&c, mtime(1)).unwrap();

        assert_eq!(cache.open_reader_count(), 2);
        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[test]
    fn test_open_failure_returns_none() {
        let dir = TempDir::new().unwrap();
        let cache = ArchiveReaderCache::new(2);
        let bogus = dir.path().join("fake.zip");
        std::fs::write(&bogus, "not a zip").unwrap();

        assert!(cache.get(bogus.to_str().unwrap(), mtime(1)).is_none());
        assert_eq!(cache.open_reader_count(), 0);
    }

    #[test]
    fn test_clear_empties_pool() {
        let dir = TempDir::new().unwrap();
        let cache = ArchiveReaderCache::new(2);
        let a = write_zip(&dir, "a.zip", "a");
        cache.get(&a, mtime(1)).unwrap();
        cache.clear();
        assert_eq!(cache.open_reader_count(), 0);
    }
}
