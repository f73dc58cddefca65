//! # hgsave
//!
//! Save file codec and lossless editing library.
//!
//! This library provides functionality to:
//! - Unframe and re-frame the chunked LZ4 save container
//! - Read and refresh the encrypted manifest sidecar and its fingerprint
//! - Edit save JSON without changing the representation of untouched numbers
//! - Address fields by readable names through a short-key mapping
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use hgsave::{JsonPath, KeyMapper, PersistOptions, SaveStore, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mapper = KeyMapper::new();
//! mapper.load_mapping_file(Path::new("mapping.json"))?;
//! let store = SaveStore::new(mapper);
//!
//! let save = Path::new("save.hg");
//! let (mut doc, stamp) = store.load(save)?;
//!
//! let nanites: JsonPath = "PlayerStateData.Nanites".parse()?;
//! println!("Nanites: {}", store.get(&doc, &nanites)?.to_json_value());
//! store.set(&mut doc, &nanites, Value::Int(50_000))?;
//!
//! // Backs up the original, writes the save and refreshes mf_save.hg
//! store.persist(save, &doc, Some(stamp), PersistOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod cache;
pub mod container;
pub mod lossless;
pub mod manifest;
pub mod mapping;
pub mod spooky;
pub mod store;
pub mod xxtea;

// Re-export commonly used items
#[doc(inline)]
pub use backup::{smart_backup, update_after_edit, BackupError};
#[doc(inline)]
pub use cache::{CachedSave, FileStamp, SaveCache};
#[doc(inline)]
pub use container::{BlockFormat, ContainerError, DecodedContainer};
#[doc(inline)]
pub use lossless::{parse_raw_value, parse_value, Document, JsonPath, ParseError, Value};
#[doc(inline)]
pub use manifest::{
    log_manifest_validation, manifest_path_for, read_manifest, slot_index_for, write_manifest,
    Fingerprint, ManifestError, ManifestRecord, ManifestValidation,
};
#[doc(inline)]
pub use mapping::{KeyMapper, MappingError};
#[doc(inline)]
pub use store::{
    decode_save_bytes, encode_save, ManifestUpdate, PersistOptions, PersistReport, SaveStore,
    StoreError,
};
