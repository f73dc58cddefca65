//! Short/long key aliases.
//!
//! Saves serialize field names as terse three-character keys (`"6f="`,
//! `"wGS"`). A mapping resource translates them to readable names
//! (`"PlayerStateData"`, `"Units"`). Several short keys can share a long name,
//! so the reverse direction keeps every alias in load order and resolves ties
//! to the first one seen.
//!
//! The resource is either
//!
//! ```json
//! {"Mapping": [{"Key": "6f=", "Value": "PlayerStateData"}, ...]}
//! ```
//!
//! or a flat object of short to long pairs.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use thiserror::Error;
use tracing::debug;

use crate::lossless::{Document, JsonPath, Object, ParseError, Segment, Value};

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mapping is not valid JSON: {0}")]
    Parse(#[from] ParseError),

    #[error("Unrecognized mapping format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Default)]
struct Tables {
    forward: HashMap<String, String>,
    reverse: HashMap<String, Vec<String>>,
    loaded: bool,
}

impl Tables {
    fn add(&mut self, short: String, long: String) -> bool {
        if self.forward.contains_key(&short) {
            debug!(short = %short, "duplicate short key in mapping, keeping first");
            return false;
        }
        self.reverse
            .entry(long.clone())
            .or_default()
            .push(short.clone());
        self.forward.insert(short, long);
        true
    }
}

/// Registry of key aliases. Unloaded mappers treat every key as its own alias.
#[derive(Debug, Default)]
pub struct KeyMapper {
    tables: RwLock<Tables>,
}

/// Top-level object entries in file order, repeated keys included
struct Entries(Vec<(String, Value)>);

struct EntriesVisitor;

impl<'de> Visitor<'de> for EntriesVisitor {
    type Value = Entries;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Entries, A::Error> {
        let mut entries = Vec::new();
        while let Some(entry) = access.next_entry::<String, Value>()? {
            entries.push(entry);
        }
        Ok(Entries(entries))
    }
}

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Entries, D::Error> {
        deserializer.deserialize_map(EntriesVisitor)
    }
}

fn pairs_from(bytes: &[u8]) -> Result<Vec<(String, String)>, MappingError> {
    let document = Document::parse(bytes)?;
    let root = document.root();
    let object = root
        .as_object()
        .ok_or_else(|| MappingError::InvalidFormat(format!("expected object, got {}", root.kind())))?;

    if let Some(list) = object.get("Mapping") {
        let items = list.as_array().ok_or_else(|| {
            MappingError::InvalidFormat(format!("\"Mapping\" is {}, expected array", list.kind()))
        })?;
        let pairs = items
            .iter()
            .filter_map(|item| {
                let entry = item.as_object()?;
                let key = entry.get("Key")?.as_str()?;
                let value = entry.get("Value")?.as_str()?;
                Some((key.to_string(), value.to_string()))
            })
            .collect();
        return Ok(pairs);
    }

    // The parsed object keeps only the last of a repeated key, so read the
    // raw entries to let the first one win like the array form does
    let Entries(entries) =
        serde_json::from_slice(bytes).map_err(|e| MappingError::InvalidFormat(e.to_string()))?;
    Ok(entries
        .into_iter()
        .filter_map(|(k, v)| Some((k, v.as_str()?.to_string())))
        .collect())
}

impl KeyMapper {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the tables from a mapping resource. Returns the number of aliases.
    pub fn load_mapping(&self, bytes: &[u8]) -> Result<usize, MappingError> {
        let pairs = pairs_from(bytes)?;

        let mut tables = Tables::default();
        let mut count = 0;
        for (short, long) in pairs {
            if tables.add(short, long) {
                count += 1;
            }
        }
        tables.loaded = true;

        *self.write() = tables;
        debug!(count, "key mapping loaded");
        Ok(count)
    }

    pub fn load_mapping_file(&self, path: &Path) -> Result<usize, MappingError> {
        let bytes = fs::read(path)?;
        self.load_mapping(&bytes)
    }

    pub fn is_loaded(&self) -> bool {
        self.read().loaded
    }

    pub fn len(&self) -> usize {
        self.read().forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Long name for a short key, or the key itself
    pub fn map_key(&self, short: &str) -> String {
        self.read()
            .forward
            .get(short)
            .cloned()
            .unwrap_or_else(|| short.to_string())
    }

    /// Short key for a long name, or the name itself.
    ///
    /// When several short keys share the name, the first loaded wins.
    pub fn to_short(&self, long: &str) -> String {
        self.read()
            .reverse
            .get(long)
            .and_then(|aliases| aliases.first())
            .cloned()
            .unwrap_or_else(|| long.to_string())
    }

    /// Every short key that maps to `long`, in load order
    pub fn short_aliases(&self, long: &str) -> Vec<String> {
        self.read().reverse.get(long).cloned().unwrap_or_default()
    }

    pub fn remap_path_to_short(&self, path: &JsonPath) -> JsonPath {
        let tables = self.read();
        path.map_keys(|k| {
            tables
                .reverse
                .get(k)
                .and_then(|aliases| aliases.first())
                .cloned()
                .unwrap_or_else(|| k.to_string())
        })
    }

    pub fn remap_path_to_long(&self, path: &JsonPath) -> JsonPath {
        let tables = self.read();
        path.map_keys(|k| tables.forward.get(k).cloned().unwrap_or_else(|| k.to_string()))
    }

    /// Key of `object` that is spelled `name` in either form
    pub fn find_child<'a>(&self, object: &'a Object, name: &str) -> Option<&'a str> {
        if let Some(key) = object.keys().find(|k| *k == name) {
            return Some(key);
        }

        let tables = self.read();
        let aliases = tables.reverse.get(name);
        let long_name = tables.forward.get(name);
        object.keys().find(|k| {
            tables.forward.get(*k).is_some_and(|long| long == name)
                || aliases.is_some_and(|a| a.iter().any(|s| s == k))
                || long_name.is_some_and(|long| long == k)
        })
    }

    /// Follow `path` through `root`, matching each key in either spelling.
    ///
    /// Returns the path as actually spelled in the document.
    pub fn resolve_path(&self, root: &Value, path: &JsonPath) -> Option<JsonPath> {
        let mut resolved = JsonPath::new();
        let mut current = root;
        for segment in path.segments() {
            let actual = match segment {
                Segment::Key(name) => {
                    let object = current.as_object()?;
                    Segment::Key(self.find_child(object, name)?.to_string())
                }
                Segment::Index(i) => Segment::Index(*i),
            };
            current = current.child(&actual)?;
            resolved.push(actual);
        }
        Some(resolved)
    }

    /// Depth-first search for the first key spelled `name` in either form
    pub fn locate(&self, root: &Value, name: &str) -> Option<JsonPath> {
        let mut stack = vec![(root, JsonPath::new())];
        while let Some((value, path)) = stack.pop() {
            match value {
                Value::Object(object) => {
                    if let Some(key) = self.find_child(object, name) {
                        return Some(path.key(key));
                    }
                    let children: Vec<_> = object.iter().collect();
                    for (k, child) in children.into_iter().rev() {
                        stack.push((child, path.clone().key(k)));
                    }
                }
                Value::Array(items) => {
                    for (i, child) in items.iter().enumerate().rev() {
                        stack.push((child, path.clone().index(i)));
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Read `path`, trying the literal spelling, then short keys, then a child search
    pub fn get_with_remap<'a>(&self, doc: &'a Document, path: &JsonPath) -> Option<&'a Value> {
        doc.get(path)
            .or_else(|| doc.get(&self.remap_path_to_short(path)))
            .or_else(|| {
                let resolved = self.resolve_path(doc.root(), path)?;
                doc.get(&resolved)
            })
    }

    /// Write `path`, trying the literal spelling, then short keys, then a child search.
    ///
    /// Existing fields are matched in any spelling before anything is
    /// inserted, so a long-form key never lands next to its short twin. A new
    /// leaf takes the key style of the object it is added to.
    pub fn set_with_remap(&self, doc: &mut Document, path: &JsonPath, value: Value) -> bool {
        if doc.get(path).is_some() {
            return doc.set_value_at_path(path, value);
        }

        let short = self.remap_path_to_short(path);
        if short != *path && doc.get(&short).is_some() {
            debug!(path = %path, remapped = %short, "set via short-key path");
            return doc.set_value_at_path(&short, value);
        }

        if let Some(resolved) = self.resolve_path(doc.root(), path) {
            debug!(path = %path, resolved = %resolved, "set via child search");
            return doc.set_value_at_path(&resolved, value);
        }

        match self.resolve_path_for_insert(doc.root(), path) {
            Some(target) => doc.set_value_at_path(&target, value),
            None => doc.set_value_at_path(path, value),
        }
    }

    /// Resolve every parent segment of `path` and spell the missing leaf the
    /// way its siblings are spelled
    fn resolve_path_for_insert(&self, root: &Value, path: &JsonPath) -> Option<JsonPath> {
        let (last, parents) = path.segments().split_last()?;
        let mut resolved = self.resolve_path(root, &JsonPath::from(parents.to_vec()))?;

        let Segment::Key(name) = last else {
            resolved.push(last.clone());
            return Some(resolved);
        };

        let mut parent = root;
        for segment in resolved.segments() {
            parent = parent.child(segment)?;
        }
        let object = parent.as_object()?;

        let tables = self.read();
        let is_short = |k: &str| tables.forward.contains_key(k);
        let short_style = object.keys().any(is_short)
            || resolved
                .segments()
                .iter()
                .filter_map(Segment::as_key)
                .any(is_short);

        let leaf = match tables.reverse.get(name).and_then(|a| a.first()) {
            Some(short) if short_style => short.clone(),
            _ => name.clone(),
        };
        resolved.push(Segment::Key(leaf));
        Some(resolved)
    }
}
