//! Single-entry memo of the most recently decoded save.
//!
//! The entry is keyed by canonical path, modification time and size, so a
//! save touched by the game is decoded again on the next load. Files are read
//! and decoded outside the lock; the lock only covers lookup and replacement.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tracing::debug;

use crate::container::{self, BlockFormat};
use crate::lossless::{sanitize_utf8, Document};
use crate::store::StoreError;

/// Modification time and size of a file, used to notice changes on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: Option<SystemTime>,
    pub size: u64,
}

impl FileStamp {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(FileStamp {
            modified: meta.modified().ok(),
            size: meta.len(),
        })
    }
}

/// A decoded save as held by the cache
#[derive(Debug)]
pub struct CachedSave {
    pub path: PathBuf,
    pub stamp: FileStamp,

    /// Raw container bytes as read from disk
    pub bytes: Vec<u8>,

    /// Decompressed JSON text
    pub payload: Vec<u8>,

    pub format: BlockFormat,
    pub parsed: serde_json::Value,
    pub lossless: Document,
}

impl CachedSave {
    fn decode(path: PathBuf, stamp: FileStamp, bytes: Vec<u8>) -> Result<Self, StoreError> {
        let decoded = container::decode(&bytes)?;
        let lossless = Document::parse(&sanitize_utf8(&decoded.payload))?;
        let parsed = lossless.to_value();
        Ok(CachedSave {
            path,
            stamp,
            bytes,
            payload: decoded.payload,
            format: decoded.format,
            parsed,
            lossless,
        })
    }
}

#[derive(Debug, Default)]
pub struct SaveCache {
    entry: Mutex<Option<Arc<CachedSave>>>,
}

impl SaveCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<CachedSave>>> {
        self.entry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, path: &Path, stamp: FileStamp) -> Option<Arc<CachedSave>> {
        self.slot()
            .as_ref()
            .filter(|entry| entry.path == path && entry.stamp == stamp)
            .cloned()
    }

    /// Decode `path`, or return the cached entry if the file is unchanged
    pub fn load(&self, path: &Path) -> Result<Arc<CachedSave>, StoreError> {
        let path = fs::canonicalize(path)?;
        let stamp = FileStamp::of(&path)?;

        if let Some(entry) = self.lookup(&path, stamp) {
            debug!(path = %path.display(), "save cache hit");
            return Ok(entry);
        }

        let bytes = fs::read(&path)?;
        let entry = Arc::new(CachedSave::decode(path, stamp, bytes)?);

        // Only remember the result if nothing wrote the file while we read it
        if FileStamp::of(&entry.path)? == stamp {
            *self.slot() = Some(Arc::clone(&entry));
            debug!(path = %entry.path.display(), "save cached");
        }
        Ok(entry)
    }

    /// Independent copies of both trees plus the stamp they were read at
    pub fn load_with_lossless(
        &self,
        path: &Path,
    ) -> Result<(Document, serde_json::Value, FileStamp), StoreError> {
        let entry = self.load(path)?;
        Ok((entry.lossless.clone(), entry.parsed.clone(), entry.stamp))
    }

    /// Stamp of the cached entry, if `path` is the one cached
    pub fn stamp_of(&self, path: &Path) -> Option<FileStamp> {
        let path = fs::canonicalize(path).ok()?;
        self.slot()
            .as_ref()
            .filter(|entry| entry.path == path)
            .map(|entry| entry.stamp)
    }

    pub fn clear(&self) {
        *self.slot() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::encode_with_format;
    use crate::lossless::{JsonPath, Value};

    fn write_save(path: &Path, json: &str) {
        let bytes = encode_with_format(b"", &BlockFormat::default(), json.as_bytes()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_load_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        write_save(&save, r#"{"a":1}"#);

        let cache = SaveCache::new();
        let first = cache.load(&save).unwrap();
        let second = cache.load(&save).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.payload, br#"{"a":1}"#);
        assert_eq!(first.parsed["a"], 1);
        assert_eq!(cache.stamp_of(&save), Some(first.stamp));
    }

    #[test]
    fn test_changed_file_is_decoded_again() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        write_save(&save, r#"{"a":1}"#);

        let cache = SaveCache::new();
        let first = cache.load(&save).unwrap();
        write_save(&save, r#"{"a":1,"b":2}"#);
        let second = cache.load(&save).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.parsed["b"], 2);
    }

    #[test]
    fn test_lossless_copies_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        write_save(&save, r#"{"units":5}"#);

        let cache = SaveCache::new();
        let (mut mine, _, _) = cache.load_with_lossless(&save).unwrap();
        let (theirs, _, _) = cache.load_with_lossless(&save).unwrap();

        let units: JsonPath = "units".parse().unwrap();
        assert!(mine.set_value_at_path(&units, Value::Int(99)));
        assert_eq!(theirs.get(&units), Some(&Value::Int(5)));
        assert_eq!(cache.load(&save).unwrap().lossless.get(&units), Some(&Value::Int(5)));
    }

    #[test]
    fn test_clear_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        write_save(&save, "{}");

        let cache = SaveCache::new();
        cache.load(&save).unwrap();
        cache.clear();
        assert_eq!(cache.stamp_of(&save), None);

        let garbage = dir.path().join("save2.hg");
        fs::write(&garbage, b"not a save").unwrap();
        assert!(matches!(cache.load(&garbage), Err(StoreError::Container(_))));
        assert!(matches!(
            cache.load(&dir.path().join("missing.hg")),
            Err(StoreError::Io(_))
        ));
    }
}
