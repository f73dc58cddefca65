//! Reading and writing saves on disk.
//!
//! [`decode_save_bytes`] and [`encode_save`] are the plain file-level
//! operations. [`SaveStore`] ties them to a [`SaveCache`] and a [`KeyMapper`]
//! and adds the bookkeeping an editor needs around a write: a per-path lock, a
//! check that nobody else changed the file since it was loaded, a backup, and
//! a refreshed manifest fingerprint.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backup::{self, BackupError};
use crate::cache::{FileStamp, SaveCache};
use crate::container::{self, ContainerError};
use crate::lossless::{Document, JsonPath, ParseError, Value};
use crate::manifest::{self, ManifestError};
use crate::mapping::{KeyMapper, MappingError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("Invalid save JSON: {0}")]
    Parse(#[from] ParseError),

    #[error("Failed to serialize save JSON: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("Backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("{} changed on disk since it was loaded", path.display())]
    Conflict { path: PathBuf },

    #[error("Path not found: {0}")]
    PathNotFound(String),
}

/// Replace `path` with `bytes` via a temporary file in the same directory
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a save and return its JSON text
pub fn decode_save_bytes(path: &Path) -> Result<Vec<u8>, StoreError> {
    let bytes = fs::read(path)?;
    Ok(container::decode(&bytes)?.payload)
}

/// Replace the JSON inside the save at `path`, keeping its header and chunk
/// layout. Returns the container bytes that were written.
pub fn encode_save(path: &Path, json: &[u8]) -> Result<Vec<u8>, StoreError> {
    Document::parse(json)?;

    let original = fs::read(path)?;
    let encoded = container::encode(&original, json)?;
    write_atomic(path, &encoded)?;

    debug!(path = %path.display(), bytes = encoded.len(), "save written");
    Ok(encoded)
}

/// What [`SaveStore::persist`] does besides writing the save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOptions {
    pub backup: bool,
    pub update_manifest: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        PersistOptions {
            backup: true,
            update_manifest: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestUpdate {
    Updated(PathBuf),
    Skipped,
    NotFound,

    /// The save was written but its manifest could not be refreshed
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub backup_created: bool,
    pub manifest: ManifestUpdate,

    /// Stamp of the file just written, for the next optimistic check
    pub stamp: FileStamp,
}

/// Editing context: decode cache, key aliases and per-path write locks
#[derive(Debug, Default)]
pub struct SaveStore {
    cache: SaveCache,
    mapper: KeyMapper,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SaveStore {
    pub fn new(mapper: KeyMapper) -> Self {
        SaveStore {
            cache: SaveCache::new(),
            mapper,
            locks: Mutex::default(),
        }
    }

    pub fn cache(&self) -> &SaveCache {
        &self.cache
    }

    pub fn mapper(&self) -> &KeyMapper {
        &self.mapper
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Drop the map entry for `path` once no other writer holds or waits on it
    fn release_path_lock(&self, path: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
    }

    /// Decode `path` into an editable document and the stamp it was read at
    pub fn load(&self, path: &Path) -> Result<(Document, FileStamp), StoreError> {
        let (document, _, stamp) = self.cache.load_with_lossless(path)?;
        Ok((document, stamp))
    }

    /// Look up `path` in either key spelling
    pub fn get<'a>(&self, doc: &'a Document, path: &JsonPath) -> Result<&'a Value, StoreError> {
        self.mapper
            .get_with_remap(doc, path)
            .ok_or_else(|| StoreError::PathNotFound(path.to_string()))
    }

    /// Set `path` in either key spelling
    pub fn set(&self, doc: &mut Document, path: &JsonPath, value: Value) -> Result<(), StoreError> {
        if self.mapper.set_with_remap(doc, path, value) {
            Ok(())
        } else {
            Err(StoreError::PathNotFound(path.to_string()))
        }
    }

    /// Write `doc` back to `path`.
    ///
    /// With `expected` set, the write is refused with [`StoreError::Conflict`]
    /// if the file no longer has that stamp. Writers to the same path are
    /// serialized. A manifest that can't be refreshed is reported, not fatal.
    pub fn persist(
        &self,
        path: &Path,
        doc: &Document,
        expected: Option<FileStamp>,
        options: PersistOptions,
    ) -> Result<PersistReport, StoreError> {
        let path = fs::canonicalize(path)?;
        let lock = self.path_lock(&path);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.persist_locked(path.clone(), doc, expected, options)
        };
        self.release_path_lock(&path, lock);
        result
    }

    fn persist_locked(
        &self,
        path: PathBuf,
        doc: &Document,
        expected: Option<FileStamp>,
        options: PersistOptions,
    ) -> Result<PersistReport, StoreError> {
        if let Some(expected) = expected {
            if FileStamp::of(&path)? != expected {
                warn!(path = %path.display(), "save changed on disk, refusing to overwrite");
                return Err(StoreError::Conflict { path });
            }
        }

        let backup_created = options.backup && backup::smart_backup(&path)?;

        let json = doc.to_json(false)?;
        let written = encode_save(&path, &json)?;

        if options.backup {
            let (_, metadata_path) = backup::backup_paths(&path);
            backup::update_after_edit(&path, &metadata_path)?;
        }

        let manifest = if options.update_manifest {
            refresh_manifest(&path, &written)
        } else {
            ManifestUpdate::Skipped
        };

        let stamp = FileStamp::of(&path)?;
        self.cache.clear();

        info!(path = %path.display(), backup_created, ?manifest, "save persisted");
        Ok(PersistReport {
            backup_created,
            manifest,
            stamp,
        })
    }
}

fn refresh_manifest(save_path: &Path, save_bytes: &[u8]) -> ManifestUpdate {
    let target = manifest::manifest_path_for(save_path).zip(manifest::slot_index_for(save_path));
    let Some((manifest_path, slot)) = target.filter(|(p, _)| p.exists()) else {
        return ManifestUpdate::NotFound;
    };

    match manifest::write_manifest(&manifest_path, slot, save_bytes) {
        Ok(()) => ManifestUpdate::Updated(manifest_path),
        Err(e) => {
            warn!(manifest = %manifest_path.display(), error = %e, "failed to update manifest");
            ManifestUpdate::Failed(e.to_string())
        }
    }
}
