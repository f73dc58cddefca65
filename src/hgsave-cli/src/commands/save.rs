//! Save file command handlers

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use hgsave::{
    container, Document, JsonPath, KeyMapper, ManifestUpdate, PersistOptions, PersistReport,
    SaveStore,
};

use crate::config::Config;

/// Build a key mapper from the given file, or the configured default.
///
/// Without either, keys are used exactly as spelled.
pub fn load_mapper(mapping: Option<&Path>) -> Result<KeyMapper> {
    let config;
    let path = match mapping {
        Some(p) => Some(p),
        None => {
            config = Config::load()?;
            config.mapping_path()
        }
    };

    let mapper = KeyMapper::new();
    if let Some(path) = path {
        let count = mapper
            .load_mapping_file(path)
            .with_context(|| format!("Failed to load key mapping {}", path.display()))?;
        tracing::debug!(count, mapping = %path.display(), "loaded key mapping");
    }
    Ok(mapper)
}

fn parse_path(path: &str) -> Result<JsonPath> {
    path.parse()
        .with_context(|| format!("Invalid path '{}'", path))
}

fn report_persist(report: &PersistReport) {
    if report.backup_created {
        eprintln!("Created backup");
    }
    match &report.manifest {
        ManifestUpdate::Updated(path) => eprintln!("Updated manifest {}", path.display()),
        ManifestUpdate::Failed(reason) => eprintln!("Warning: manifest not updated: {}", reason),
        ManifestUpdate::Skipped | ManifestUpdate::NotFound => {}
    }
}

/// Handle `decode` command
pub fn decode(input: &Path, output: Option<&Path>, pretty: bool) -> Result<()> {
    let payload = hgsave::decode_save_bytes(input)
        .with_context(|| format!("Failed to decode {}", input.display()))?;

    let json = if pretty {
        let doc = Document::parse(&hgsave::lossless::sanitize_utf8(&payload))
            .context("Failed to parse save JSON")?;
        doc.to_json(true)?
    } else {
        payload
    };

    crate::file_io::write_output(output, &json)
}

/// Handle `encode` command
pub fn encode(input: &Path, json: Option<&Path>, no_manifest: bool, no_backup: bool) -> Result<()> {
    let data = crate::file_io::read_input(json)?;
    let doc = Document::parse(&data).context("Failed to parse JSON input")?;

    let store = SaveStore::new(KeyMapper::new());
    let options = PersistOptions {
        backup: !no_backup,
        update_manifest: !no_manifest,
    };
    let report = store
        .persist(input, &doc, None, options)
        .with_context(|| format!("Failed to write {}", input.display()))?;

    report_persist(&report);
    Ok(())
}

/// Handle `get` command
pub fn get(input: &Path, path: &str, mapping: Option<&Path>) -> Result<()> {
    let store = SaveStore::new(load_mapper(mapping)?);
    let path = parse_path(path)?;

    let (doc, _) = store
        .load(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    let value = store.get(&doc, &path)?;

    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Handle `set` command
pub fn set(
    input: &Path,
    path: &str,
    value: &str,
    raw: bool,
    mapping: Option<&Path>,
    no_backup: bool,
) -> Result<()> {
    let store = SaveStore::new(load_mapper(mapping)?);
    let path = parse_path(path)?;

    let new_value = if raw {
        hgsave::parse_raw_value(value).context("Failed to parse raw JSON value")?
    } else {
        hgsave::parse_value(value)
    };

    let (mut doc, stamp) = store
        .load(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let old = store.get(&doc, &path).ok().map(|v| v.to_json_value());
    store.set(&mut doc, &path, new_value)?;

    let options = PersistOptions {
        backup: !no_backup,
        ..PersistOptions::default()
    };
    let report = store
        .persist(input, &doc, Some(stamp), options)
        .with_context(|| format!("Failed to write {}", input.display()))?;
    report_persist(&report);

    let new = store.get(&doc, &path)?.to_json_value();
    match old {
        Some(old) => println!("{}: {} -> {}", path, old, new),
        None => println!("{}: (new) {}", path, new),
    }
    Ok(())
}

/// Handle `info` command
pub fn info(input: &Path) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let decoded = container::decode(&bytes).context("Failed to decode save container")?;
    let format = decoded.format;

    println!("File: {}", input.display());
    println!("Size: {} bytes", bytes.len());
    println!("Header: {} bytes", decoded.header.len());
    println!("Chunks: {}", decoded.chunk_count);
    println!("Block size: 0x{:X}", format.block_size);
    println!("Padded to block: {}", format.pad_to_block);
    println!("Terminal chunk: {}", format.has_terminal_chunk);
    println!("Trailing NULs: {}", format.trailing_nulls);
    println!("JSON: {} bytes", decoded.payload.len());

    let manifest = hgsave::manifest_path_for(input).zip(hgsave::slot_index_for(input));
    match manifest {
        Some((path, slot)) if path.exists() => {
            let status = hgsave::log_manifest_validation(&path, slot, &bytes);
            println!(
                "Manifest: {} (slot {}): {}",
                path.display(),
                slot,
                super::manifest::describe(&status)
            );
        }
        _ => println!("Manifest: none"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgsave::container::{encode_with_format, BlockFormat};

    fn write_save(path: &Path, json: &str) {
        let bytes = encode_with_format(b"", &BlockFormat::default(), json.as_bytes()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn write_mapping(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("mapping.json");
        fs::write(&path, br#"{"6f=":"PlayerStateData","F?0":"Nanites"}"#).unwrap();
        path
    }

    #[test]
    fn test_decode_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        let out = dir.path().join("save.json");
        write_save(&save, r#"{"a":1.50}"#);

        decode(&save, Some(&out), false).unwrap();
        assert_eq!(fs::read(&out).unwrap(), br#"{"a":1.50}"#);

        decode(&save, Some(&out), true).unwrap();
        let pretty = fs::read_to_string(&out).unwrap();
        assert!(pretty.contains("\n"));
        assert!(pretty.contains("1.5"));
    }

    #[test]
    fn test_encode_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        let json = dir.path().join("edited.json");
        write_save(&save, r#"{"a":1}"#);
        fs::write(&json, br#"{"a":2}"#).unwrap();

        encode(&save, Some(&json), true, true).unwrap();
        assert_eq!(hgsave::decode_save_bytes(&save).unwrap(), br#"{"a":2}"#);
        assert!(!hgsave::backup::backup_paths(&save).0.exists());
    }

    #[test]
    fn test_set_with_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        let mapping = write_mapping(dir.path());
        write_save(&save, r#"{"6f=":{"F?0":10}}"#);

        set(&save, "PlayerStateData.Nanites", "12.0", false, Some(&mapping), false).unwrap();
        assert_eq!(
            hgsave::decode_save_bytes(&save).unwrap(),
            br#"{"6f=":{"F?0":12}}"#
        );
        assert!(hgsave::backup::backup_paths(&save).0.exists());

        get(&save, "PlayerStateData.Nanites", Some(&mapping)).unwrap();
        assert!(get(&save, "PlayerStateData.Missing", Some(&mapping)).is_err());
    }

    #[test]
    fn test_set_raw_value() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        let mapping = write_mapping(dir.path());
        write_save(&save, r#"{"list":[]}"#);

        set(&save, "list[0]", r#"{"id":"abc"}"#, true, Some(&mapping), true).unwrap();
        assert_eq!(
            hgsave::decode_save_bytes(&save).unwrap(),
            br#"{"list":[{"id":"abc"}]}"#
        );
    }

    #[test]
    fn test_info_on_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("save.hg");
        fs::write(&save, b"garbage").unwrap();
        assert!(info(&save).is_err());
    }
}
