//! JSON input and output for the decode/encode commands
//!
//! A missing path or `-` means stdin or stdout. Files are replaced atomically.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

fn file_path(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| p.as_os_str() != "-")
}

/// Read the JSON to encode from a file, or from stdin
pub fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match file_path(path) {
        Some(p) => fs::read(p).with_context(|| format!("Failed to read {}", p.display())),
        None => read_from(io::stdin().lock()).context("Failed to read from stdin"),
    }
}

/// Write decoded JSON to a file, or to stdout followed by a newline
pub fn write_output(path: Option<&Path>, json: &[u8]) -> Result<()> {
    match file_path(path) {
        Some(p) => hgsave::store::write_atomic(p, json)
            .with_context(|| format!("Failed to write {}", p.display())),
        None => write_to(io::stdout().lock(), json).context("Failed to write to stdout"),
    }
}

fn read_from(mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

fn write_to(mut writer: impl Write, json: &[u8]) -> io::Result<()> {
    writer.write_all(json)?;
    if !json.ends_with(b"\n") {
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dash_means_stdio() {
        assert!(file_path(None).is_none());
        assert!(file_path(Some(Path::new("-"))).is_none());
        assert_eq!(
            file_path(Some(Path::new("out.json"))),
            Some(Path::new("out.json"))
        );
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("save.json");

        write_output(Some(&path), br#"{"a":1}"#).unwrap();
        assert_eq!(read_input(Some(&path)).unwrap(), br#"{"a":1}"#);

        // Overwrites in place and leaves no temp files behind
        write_output(Some(&path), br#"{"a":2}"#).unwrap();
        assert_eq!(fs::read(&path).unwrap(), br#"{"a":2}"#);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_input_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = read_input(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_stdout_gets_single_newline() {
        let mut out = Vec::new();
        write_to(&mut out, br#"{"a":1}"#).unwrap();
        assert_eq!(out, b"{\"a\":1}\n");

        let mut out = Vec::new();
        write_to(&mut out, b"{\n}\n").unwrap();
        assert_eq!(out, b"{\n}\n");

        assert_eq!(read_from(&b"{}"[..]).unwrap(), b"{}");
    }
}
