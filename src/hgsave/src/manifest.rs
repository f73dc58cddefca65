//! Encrypted manifest sidecar (`mf_save*.hg`).
//!
//! Each save slot has a small XXTEA-encrypted sidecar. After decryption the
//! first words are laid out as:
//!
//! | words  | contents                                  |
//! |--------|-------------------------------------------|
//! | 0      | magic `0xEEEEEEBE`                        |
//! | 2..6   | SpookyHash fingerprint (16 bytes)         |
//! | 6..14  | SHA-256 of the save container (32 bytes)  |
//! | 14..16 | last save timestamp (u64)                 |
//!
//! A human-readable location name lives somewhere further in and is found
//! heuristically.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::spooky::Spooky;
use crate::xxtea::{self, Key};

/// Word 0 of every decrypted manifest
pub const MANIFEST_MAGIC: u32 = 0xEEEE_EEBE;

/// Smallest sidecar the game writes
pub const MIN_MANIFEST_LEN: usize = 432;

/// Seeds for the chained SpookyHash fingerprint
pub const SPOOKY_SEED1: u64 = 0x0155_AF93_AC30_4200;
pub const SPOOKY_SEED2: u64 = 0x8AC7_2304_89E7_FFFF;

const KEY_SEED: &[u8; 16] = b"NAESEVADNAYRTNRG";

const SPOOKY_WORDS: Range<usize> = 2..6;
const SHA_WORDS: Range<usize> = 6..14;
const TIME_WORDS: Range<usize> = 14..16;

// Location name heuristic. The window is empirical; recalibrate against new
// samples by adjusting these.
pub const LOCATION_SCAN_START: usize = 480;
pub const LOCATION_SCAN_END: usize = 880;
pub const LOCATION_MIN_LEN: usize = 3;
pub const LOCATION_LEN_CAP: usize = 64;
pub const LEADING_UPPER_BONUS: u32 = 8;
pub const LEADING_ALNUM_BONUS: u32 = 4;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest is {0} bytes, expected at least {MIN_MANIFEST_LEN}")]
    TooShort(usize),

    #[error("Manifest size {0} is not a multiple of 4 bytes")]
    Misaligned(usize),

    #[error("Manifest magic mismatch for slot {slot}: found 0x{found:08X}")]
    BadMagic { slot: u32, found: u32 },
}

/// Best-effort display string recovered from the manifest body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationName {
    pub text: String,

    /// Heuristic score; higher is more likely to be the real name
    pub score: u32,

    /// Byte offset of the run inside the decrypted manifest
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub version: u32,
    pub sha256: [u8; 32],
    pub spooky_hash: [u8; 16],
    pub location_name: Option<LocationName>,
    pub last_save_time: u64,
}

impl ManifestRecord {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            sha256: self.sha256,
            spooky_hash: self.spooky_hash,
        }
    }
}

/// SHA-256 of a save container plus the SpookyHash chained over it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub sha256: [u8; 32],
    pub spooky_hash: [u8; 16],
}

impl Fingerprint {
    /// Fingerprint the raw container bytes of a save.
    ///
    /// The hash is seeded with the fixed constants, fed the SHA-256 digest,
    /// then fed the save bytes with state carried over.
    pub fn of_save(save_bytes: &[u8]) -> Self {
        let sha256: [u8; 32] = Sha256::digest(save_bytes).into();
        let mut spooky = Spooky::new(SPOOKY_SEED1, SPOOKY_SEED2);
        spooky.update(&sha256).update(save_bytes);
        Fingerprint {
            sha256,
            spooky_hash: spooky.to_bytes(),
        }
    }
}

/// Derive the XXTEA key for a save slot
pub fn derive_key(slot: u32) -> Key {
    let mix = (slot.wrapping_add(2) ^ 0x1422_CB8C)
        .rotate_left(13)
        .wrapping_mul(5)
        .wrapping_add(0xE654_6B64);

    let mut key = xxtea::key_from_bytes(KEY_SEED);
    key[0] = mix;
    key
}

fn decrypt_words(bytes: &[u8], slot: u32) -> Result<Vec<u32>, ManifestError> {
    if bytes.len() < MIN_MANIFEST_LEN {
        return Err(ManifestError::TooShort(bytes.len()));
    }
    if bytes.len() % 4 != 0 {
        return Err(ManifestError::Misaligned(bytes.len()));
    }

    let mut words = xxtea::words_from_bytes(bytes);
    xxtea::decrypt(&mut words, &derive_key(slot));

    if words[0] != MANIFEST_MAGIC {
        return Err(ManifestError::BadMagic {
            slot,
            found: words[0],
        });
    }
    Ok(words)
}

fn copy_words_out<const N: usize>(words: &[u32], range: Range<usize>) -> [u8; N] {
    let mut out = [0u8; N];
    for (chunk, word) in out.chunks_exact_mut(4).zip(&words[range]) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

fn copy_words_in(words: &mut [u32], range: Range<usize>, bytes: &[u8]) {
    for (word, chunk) in words[range].iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

fn score_run(run: &[u8]) -> u32 {
    let len = run.len().min(LOCATION_LEN_CAP) as u32;
    let first = run[0];
    let bonus = if first.is_ascii_uppercase() {
        LEADING_UPPER_BONUS
    } else if first.is_ascii_alphanumeric() {
        LEADING_ALNUM_BONUS
    } else {
        0
    };
    len + bonus
}

/// Find the best-scoring printable ASCII run inside the location window
pub fn extract_location_name(plain: &[u8]) -> Option<LocationName> {
    let end = LOCATION_SCAN_END.min(plain.len());
    if LOCATION_SCAN_START >= end {
        return None;
    }
    let window = &plain[LOCATION_SCAN_START..end];

    let mut best: Option<LocationName> = None;
    let mut start = 0;
    while start < window.len() {
        if !is_printable(window[start]) {
            start += 1;
            continue;
        }
        let len = window[start..]
            .iter()
            .take_while(|&&b| is_printable(b))
            .count();
        let run = &window[start..start + len];
        let trimmed = run.trim_ascii();

        if trimmed.len() >= LOCATION_MIN_LEN {
            let score = score_run(trimmed);
            if best.as_ref().is_none_or(|b| score > b.score) {
                let lead = run.len() - run.trim_ascii_start().len();
                best = Some(LocationName {
                    text: String::from_utf8_lossy(trimmed).into_owned(),
                    score,
                    offset: LOCATION_SCAN_START + start + lead,
                });
            }
        }
        start += len;
    }
    best
}

fn is_printable(b: u8) -> bool {
    (0x20..=0x7E).contains(&b)
}

/// Decode manifest bytes for a slot
pub fn read_manifest_bytes(bytes: &[u8], slot: u32) -> Result<ManifestRecord, ManifestError> {
    let words = decrypt_words(bytes, slot)?;
    let plain = xxtea::bytes_from_words(&words);

    let time = &words[TIME_WORDS];
    let last_save_time = u64::from(time[0]) | (u64::from(time[1]) << 32);

    Ok(ManifestRecord {
        version: words[0],
        sha256: copy_words_out(&words, SHA_WORDS),
        spooky_hash: copy_words_out(&words, SPOOKY_WORDS),
        location_name: extract_location_name(&plain),
        last_save_time,
    })
}

/// Read and decrypt the manifest at `path`
pub fn read_manifest(path: &Path, slot: u32) -> Result<ManifestRecord, ManifestError> {
    let bytes = fs::read(path)?;
    read_manifest_bytes(&bytes, slot)
}

/// Re-fingerprint `save_bytes` into existing manifest bytes
pub fn update_manifest_bytes(
    bytes: &[u8],
    slot: u32,
    save_bytes: &[u8],
) -> Result<Vec<u8>, ManifestError> {
    let mut words = decrypt_words(bytes, slot)?;
    let fingerprint = Fingerprint::of_save(save_bytes);

    copy_words_in(&mut words, SPOOKY_WORDS, &fingerprint.spooky_hash);
    copy_words_in(&mut words, SHA_WORDS, &fingerprint.sha256);

    xxtea::encrypt(&mut words, &derive_key(slot));
    Ok(xxtea::bytes_from_words(&words))
}

/// Recompute the manifest fingerprint for `save_bytes` and overwrite the file
pub fn write_manifest(path: &Path, slot: u32, save_bytes: &[u8]) -> Result<(), ManifestError> {
    let bytes = fs::read(path)?;
    let updated = update_manifest_bytes(&bytes, slot, save_bytes)?;
    crate::store::write_atomic(path, &updated)?;
    debug!(path = %path.display(), slot, "manifest fingerprint updated");
    Ok(())
}

/// Outcome of comparing a manifest against a save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestValidation {
    Match,
    Mismatch {
        stored: Fingerprint,
        computed: Fingerprint,
    },
    Unavailable(String),
}

/// Log whether the manifest at `path` matches `save_bytes`. Never fails.
pub fn log_manifest_validation(path: &Path, slot: u32, save_bytes: &[u8]) -> ManifestValidation {
    let record = match read_manifest(path, slot) {
        Ok(record) => record,
        Err(e) => {
            warn!(path = %path.display(), slot, error = %e, "manifest unavailable");
            return ManifestValidation::Unavailable(e.to_string());
        }
    };

    let stored = record.fingerprint();
    let computed = Fingerprint::of_save(save_bytes);
    if stored == computed {
        debug!(path = %path.display(), slot, "manifest fingerprint matches");
        ManifestValidation::Match
    } else {
        warn!(
            path = %path.display(),
            slot,
            stored_sha = %hex::encode(stored.sha256),
            computed_sha = %hex::encode(computed.sha256),
            stored_spooky = %hex::encode(stored.spooky_hash),
            computed_spooky = %hex::encode(computed.spooky_hash),
            "manifest fingerprint mismatch"
        );
        ManifestValidation::Mismatch { stored, computed }
    }
}

fn save_number(save_path: &Path) -> Option<u32> {
    let name = save_path.file_name()?.to_str()?;
    let digits = name.strip_prefix("save")?.strip_suffix(".hg")?;
    if digits.is_empty() {
        return Some(1);
    }
    digits.parse().ok().filter(|&n| n >= 2)
}

/// Sidecar path for a save (`save3.hg` -> `mf_save3.hg`)
pub fn manifest_path_for(save_path: &Path) -> Option<PathBuf> {
    save_number(save_path)?;
    let name = save_path.file_name()?.to_str()?;
    Some(save_path.with_file_name(format!("mf_{}", name)))
}

/// Slot index for a save (`save.hg` is 0, `saveN.hg` is N-1)
pub fn slot_index_for(save_path: &Path) -> Option<u32> {
    save_number(save_path).map(|n| n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_manifest(len: usize, location: Option<(usize, &str)>) -> Vec<u32> {
        let mut bytes = vec![0u8; len];
        bytes[..4].copy_from_slice(&MANIFEST_MAGIC.to_le_bytes());
        bytes[56..64].copy_from_slice(&1_700_000_000u64.to_le_bytes());
        if let Some((offset, text)) = location {
            bytes[offset..offset + text.len()].copy_from_slice(text.as_bytes());
        }
        xxtea::words_from_bytes(&bytes)
    }

    fn encrypted(mut words: Vec<u32>, slot: u32) -> Vec<u8> {
        xxtea::encrypt(&mut words, &derive_key(slot));
        xxtea::bytes_from_words(&words)
    }

    #[test]
    fn test_derive_key_depends_on_slot() {
        let k0 = derive_key(0);
        let k1 = derive_key(1);
        assert_ne!(k0[0], k1[0]);
        assert_eq!(k0[1..], k1[1..]);
        assert_eq!(k0[1..], xxtea::key_from_bytes(KEY_SEED)[1..]);
    }

    #[test]
    fn test_read_manifest_fields() {
        let bytes = encrypted(plain_manifest(1024, Some((520, "Euclid Outpost"))), 3);
        let record = read_manifest_bytes(&bytes, 3).unwrap();

        assert_eq!(record.version, MANIFEST_MAGIC);
        assert_eq!(record.last_save_time, 1_700_000_000);
        let location = record.location_name.unwrap();
        assert_eq!(location.text, "Euclid Outpost");
        assert_eq!(location.offset, 520);
    }

    #[test]
    fn test_wrong_slot_is_bad_magic() {
        let bytes = encrypted(plain_manifest(MIN_MANIFEST_LEN, None), 0);
        assert!(matches!(
            read_manifest_bytes(&bytes, 1),
            Err(ManifestError::BadMagic { slot: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_short_and_misaligned() {
        assert!(matches!(
            read_manifest_bytes(&[0; 100], 0),
            Err(ManifestError::TooShort(100))
        ));
        assert!(matches!(
            read_manifest_bytes(&[0; 434], 0),
            Err(ManifestError::Misaligned(434))
        ));
    }

    #[test]
    fn test_minimum_manifest_has_no_location() {
        let bytes = encrypted(plain_manifest(MIN_MANIFEST_LEN, None), 0);
        let record = read_manifest_bytes(&bytes, 0).unwrap();
        assert!(record.location_name.is_none());
    }

    #[test]
    fn test_location_prefers_capitalized_run() {
        let mut plain = vec![0u8; 900];
        plain[490..498].copy_from_slice(b"zzzzzzzz");
        plain[600..609].copy_from_slice(b"Hub Alpha");
        let name = extract_location_name(&plain).unwrap();
        assert_eq!(name.text, "Hub Alpha");
        assert_eq!(name.score, 9 + LEADING_UPPER_BONUS);
    }

    #[test]
    fn test_location_ignores_short_runs() {
        let mut plain = vec![0u8; 900];
        plain[500..502].copy_from_slice(b"Ab");
        assert!(extract_location_name(&plain).is_none());
    }

    #[test]
    fn test_write_then_read_fingerprint() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("mf_save2.hg");
        fs::write(&path, encrypted(plain_manifest(MIN_MANIFEST_LEN, None), 1)).unwrap();

        let save_bytes = b"pretend container bytes".repeat(40);
        write_manifest(&path, 1, &save_bytes).unwrap();

        let record = read_manifest(&path, 1).unwrap();
        let expected = Fingerprint::of_save(&save_bytes);
        assert_eq!(record.fingerprint(), expected);
        assert_eq!(record.last_save_time, 1_700_000_000);
        assert_eq!(fs::metadata(&path).unwrap().len(), MIN_MANIFEST_LEN as u64);

        assert_eq!(
            log_manifest_validation(&path, 1, &save_bytes),
            ManifestValidation::Match
        );
        assert!(matches!(
            log_manifest_validation(&path, 1, b"other"),
            ManifestValidation::Mismatch { .. }
        ));
    }

    #[test]
    fn test_validation_of_missing_manifest() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = log_manifest_validation(&temp_dir.path().join("mf_save.hg"), 0, b"x");
        assert!(matches!(result, ManifestValidation::Unavailable(_)));
    }

    #[test]
    fn test_fingerprint_chains_sha_into_spooky() {
        let save = b"abc";
        let fp = Fingerprint::of_save(save);
        let (a, b) = crate::spooky::hash128(&fp.sha256, SPOOKY_SEED1, SPOOKY_SEED2);
        let (h1, h2) = crate::spooky::hash128(save, a, b);
        assert_eq!(&fp.spooky_hash[..8], &h1.to_le_bytes());
        assert_eq!(&fp.spooky_hash[8..], &h2.to_le_bytes());
    }

    #[test]
    fn test_sidecar_paths() {
        assert_eq!(
            manifest_path_for(Path::new("/saves/save.hg")),
            Some(PathBuf::from("/saves/mf_save.hg"))
        );
        assert_eq!(
            manifest_path_for(Path::new("/saves/save7.hg")),
            Some(PathBuf::from("/saves/mf_save7.hg"))
        );
        assert_eq!(manifest_path_for(Path::new("/saves/notes.txt")), None);

        assert_eq!(slot_index_for(Path::new("save.hg")), Some(0));
        assert_eq!(slot_index_for(Path::new("save2.hg")), Some(1));
        assert_eq!(slot_index_for(Path::new("save1.hg")), None);
    }
}
