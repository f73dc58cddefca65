//! Manifest sidecar command handlers

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use hgsave::{ManifestRecord, ManifestValidation};

/// Sidecar path and slot index for a save, with an optional slot override
pub fn manifest_target(input: &Path, slot: Option<u32>) -> Result<(PathBuf, u32)> {
    let path = hgsave::manifest_path_for(input).with_context(|| {
        format!(
            "{} is not named like a save slot (save.hg, save2.hg, ...)",
            input.display()
        )
    })?;

    let slot = match slot {
        Some(s) => s,
        None => hgsave::slot_index_for(input)
            .with_context(|| format!("Could not derive slot index from {}", input.display()))?,
    };

    Ok((path, slot))
}

/// One-line summary of a validation result
pub fn describe(status: &ManifestValidation) -> String {
    match status {
        ManifestValidation::Match => "fingerprint matches".to_string(),
        ManifestValidation::Mismatch { .. } => "fingerprint MISMATCH".to_string(),
        ManifestValidation::Unavailable(reason) => format!("unreadable ({})", reason),
    }
}

fn print_record(path: &Path, slot: u32, record: &ManifestRecord) {
    println!("Manifest: {}", path.display());
    println!("Slot: {}", slot);
    println!("Version: 0x{:08X}", record.version);
    println!("SHA-256: {}", hex::encode(record.sha256));
    println!("SpookyHash: {}", hex::encode(record.spooky_hash));
    println!("Last save time: {}", record.last_save_time);
    match &record.location_name {
        Some(name) => println!(
            "Location: {} (score {}, offset {})",
            name.text, name.score, name.offset
        ),
        None => println!("Location: unknown"),
    }
}

/// Handle `manifest show` command
pub fn show(input: &Path, slot: Option<u32>) -> Result<()> {
    let (path, slot) = manifest_target(input, slot)?;
    let record = hgsave::read_manifest(&path, slot)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    print_record(&path, slot, &record);
    Ok(())
}

/// Handle `manifest update` command
pub fn update(input: &Path, slot: Option<u32>) -> Result<()> {
    let (path, slot) = manifest_target(input, slot)?;
    let save = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;

    hgsave::write_manifest(&path, slot, &save)
        .with_context(|| format!("Failed to update manifest {}", path.display()))?;

    println!("Updated {}", path.display());
    Ok(())
}

/// Handle `manifest validate` command
pub fn validate(input: &Path, slot: Option<u32>) -> Result<()> {
    let (path, slot) = manifest_target(input, slot)?;
    let save = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let status = hgsave::log_manifest_validation(&path, slot, &save);
    println!("{}: {}", path.display(), describe(&status));

    match status {
        ManifestValidation::Match => Ok(()),
        ManifestValidation::Mismatch { stored, computed } => bail!(
            "Manifest is stale: stored SHA-256 {}, save has {}",
            hex::encode(stored.sha256),
            hex::encode(computed.sha256)
        ),
        ManifestValidation::Unavailable(reason) => bail!("No valid manifest: {}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgsave::manifest::{derive_key, MANIFEST_MAGIC};
    use hgsave::xxtea;

    fn write_manifest_file(path: &Path, slot: u32) {
        let mut words = vec![0u32; 120];
        words[0] = MANIFEST_MAGIC;
        xxtea::encrypt(&mut words, &derive_key(slot));
        fs::write(path, xxtea::bytes_from_words(&words)).unwrap();
    }

    #[test]
    fn test_manifest_target() {
        let (path, slot) = manifest_target(Path::new("/saves/save3.hg"), None).unwrap();
        assert_eq!(path, PathBuf::from("/saves/mf_save3.hg"));
        assert_eq!(slot, 2);

        let (_, slot) = manifest_target(Path::new("/saves/save.hg"), Some(7)).unwrap();
        assert_eq!(slot, 7);

        assert!(manifest_target(Path::new("/saves/notes.txt"), None).is_err());
    }

    #[test]
    fn test_update_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        fs::write(&save, b"pretend container bytes").unwrap();
        write_manifest_file(&dir.path().join("mf_save.hg"), 0);

        assert!(validate(&save, None).is_err());
        update(&save, None).unwrap();
        validate(&save, None).unwrap();
        show(&save, None).unwrap();

        // Wrong slot key fails to decrypt
        assert!(show(&save, Some(4)).is_err());
    }
}
