//! One-time backups of a save before it is first rewritten.
//!
//! Next to `save.hg` we keep `save.hg.bak` and a small JSON ledger,
//! `save.hg.bak.json`, recording the hash of the backed-up file and the hash
//! of our most recent write. A new backup is only taken when the file on disk
//! matches neither, i.e. the game or the user replaced it since we last
//! looked. The manifest sidecar, when present, is copied alongside.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::manifest::manifest_path_for;
use crate::store::write_atomic;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backup ledger is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Hashes tracked for a save's backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// SHA-256 of the save as it was backed up
    pub original_hash: String,

    /// SHA-256 of the save after our last write
    pub last_edit_hash: String,

    /// SHA-256 of the manifest sidecar as it was backed up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_hash: Option<String>,
}

impl BackupMetadata {
    pub fn new(hash: String) -> Self {
        BackupMetadata {
            original_hash: hash.clone(),
            last_edit_hash: hash,
            manifest_hash: None,
        }
    }

    fn matches(&self, hash: &str) -> bool {
        self.original_hash == hash || self.last_edit_hash == hash
    }
}

/// SHA-256 of a file as lowercase hex
pub fn hash_file(path: &Path) -> Result<String, BackupError> {
    let data = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&data)))
}

/// Backup file and ledger paths (`save.hg` -> `save.hg.bak`, `save.hg.bak.json`)
pub fn backup_paths(save_path: &Path) -> (PathBuf, PathBuf) {
    (
        append_extension(save_path, "bak"),
        append_extension(save_path, "bak.json"),
    )
}

fn append_extension(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

pub fn read_metadata(metadata_path: &Path) -> Result<Option<BackupMetadata>, BackupError> {
    if !metadata_path.exists() {
        return Ok(None);
    }
    let data = fs::read(metadata_path)?;
    Ok(Some(serde_json::from_slice(&data)?))
}

pub fn write_metadata(metadata_path: &Path, metadata: &BackupMetadata) -> Result<(), BackupError> {
    let json = serde_json::to_vec_pretty(metadata)?;
    write_atomic(metadata_path, &json)?;
    Ok(())
}

/// Whether the save on disk needs a fresh backup.
///
/// True when no backup exists yet, or when the save matches neither hash in
/// the ledger. A backup without a ledger is never overwritten.
pub fn should_create_backup(
    save_path: &Path,
    backup_path: &Path,
    metadata_path: &Path,
) -> Result<bool, BackupError> {
    if !backup_path.exists() {
        return Ok(true);
    }

    let Some(metadata) = read_metadata(metadata_path)? else {
        debug!(backup = %backup_path.display(), "backup has no ledger, leaving it alone");
        return Ok(false);
    };

    let current = hash_file(save_path)?;
    Ok(!metadata.matches(&current))
}

/// Copy the save (and its manifest, if any) and start a new ledger
pub fn create_backup(
    save_path: &Path,
    backup_path: &Path,
    metadata_path: &Path,
) -> Result<(), BackupError> {
    fs::copy(save_path, backup_path)?;
    let mut metadata = BackupMetadata::new(hash_file(save_path)?);

    if let Some(manifest) = manifest_path_for(save_path).filter(|p| p.exists()) {
        fs::copy(&manifest, append_extension(&manifest, "bak"))?;
        metadata.manifest_hash = Some(hash_file(&manifest)?);
    }

    write_metadata(metadata_path, &metadata)?;
    info!(save = %save_path.display(), backup = %backup_path.display(), "created backup");
    Ok(())
}

/// Record the hash of a save we just wrote
pub fn update_after_edit(save_path: &Path, metadata_path: &Path) -> Result<(), BackupError> {
    let current = hash_file(save_path)?;
    let mut metadata =
        read_metadata(metadata_path)?.unwrap_or_else(|| BackupMetadata::new(current.clone()));
    metadata.last_edit_hash = current;
    write_metadata(metadata_path, &metadata)
}

/// Back up `save_path` if needed. Returns true when a new backup was taken.
pub fn smart_backup(save_path: &Path) -> Result<bool, BackupError> {
    let (backup_path, metadata_path) = backup_paths(save_path);

    if should_create_backup(save_path, &backup_path, &metadata_path)? {
        create_backup(save_path, &backup_path, &metadata_path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("save.hg");
        fs::write(&path, b"abc").unwrap();

        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_backup_paths() {
        let (backup, metadata) = backup_paths(Path::new("/saves/save3.hg"));
        assert_eq!(backup, PathBuf::from("/saves/save3.hg.bak"));
        assert_eq!(metadata, PathBuf::from("/saves/save3.hg.bak.json"));
    }

    #[test]
    fn test_backup_once_per_original() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        fs::write(&save, b"original").unwrap();

        assert!(smart_backup(&save).unwrap());
        assert!(!smart_backup(&save).unwrap());

        // Our own edit is tracked and does not trigger a new backup
        fs::write(&save, b"edited").unwrap();
        let (backup, metadata) = backup_paths(&save);
        update_after_edit(&save, &metadata).unwrap();
        assert!(!smart_backup(&save).unwrap());
        assert_eq!(fs::read(&backup).unwrap(), b"original");

        // A file replaced behind our back gets backed up again
        fs::write(&save, b"replaced by the game").unwrap();
        assert!(smart_backup(&save).unwrap());
        assert_eq!(fs::read(&backup).unwrap(), b"replaced by the game");
    }

    #[test]
    fn test_backup_without_ledger_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        let (backup, metadata) = backup_paths(&save);
        fs::write(&save, b"current").unwrap();
        fs::write(&backup, b"hand made").unwrap();

        assert!(!should_create_backup(&save, &backup, &metadata).unwrap());
    }

    #[test]
    fn test_manifest_backed_up_alongside() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save2.hg");
        let manifest = dir.path().join("mf_save2.hg");
        fs::write(&save, b"save").unwrap();
        fs::write(&manifest, b"manifest").unwrap();

        assert!(smart_backup(&save).unwrap());
        assert_eq!(fs::read(dir.path().join("mf_save2.hg.bak")).unwrap(), b"manifest");

        let (_, metadata) = backup_paths(&save);
        let ledger = read_metadata(&metadata).unwrap().unwrap();
        assert_eq!(ledger.manifest_hash, Some(hash_file(&manifest).unwrap()));
    }
}
