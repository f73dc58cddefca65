//! Lossless JSON document.
//!
//! Saves mix 64-bit identifiers, seeds and floating point stats in one tree.
//! Round-tripping them through a single numeric type either truncates large
//! integers or turns `3` into `3.0`, which the game rejects for integer
//! fields. [`Value`] keeps integers and doubles apart exactly as they were
//! written, keeps object key order, and coerces edits into the category the
//! edited field already had.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};
use thiserror::Error;
use tracing::warn;

/// JSON parse failure with the byte offset where it was detected
#[derive(Debug, Clone, Error)]
#[error("JSON parse error at offset {offset} (line {line}, column {column}): {message}")]
pub struct ParseError {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    fn from_serde(err: &serde_json::Error, input: &[u8]) -> Self {
        ParseError {
            offset: offset_of(input, err.line(), err.column()),
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Convert serde_json's 1-based line/column into a byte offset
fn offset_of(input: &[u8], line: usize, column: usize) -> usize {
    let line_start = if line <= 1 {
        0
    } else {
        input
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == b'\n')
            .nth(line - 2)
            .map_or(input.len(), |(i, _)| i + 1)
    };
    (line_start + column.saturating_sub(1)).min(input.len())
}

/// Ordered object with unique keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Object {
    entries: Vec<(String, Value)>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: String, value: Value) -> Option<Value> {
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut object = Object::new();
        for (k, v) in iter {
            object.insert(k, v);
        }
        object
    }
}

/// JSON value that remembers how each number was written
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Double(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            Value::UInt(u) => i64::try_from(u).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Int(i) => u64::try_from(i).ok(),
            Value::UInt(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int(i) => Some(i as f64),
            Value::UInt(u) => Some(u as f64),
            Value::Double(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the variant, for messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int64",
            Value::UInt(_) => "uint64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Child addressed by a single path segment
    pub fn child(&self, segment: &Segment) -> Option<&Value> {
        match (self, segment) {
            (Value::Object(map), Segment::Key(key)) => map.get(key),
            (Value::Array(items), Segment::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    pub fn child_mut(&mut self, segment: &Segment) -> Option<&mut Value> {
        match (self, segment) {
            (Value::Object(map), Segment::Key(key)) => map.get_mut(key),
            (Value::Array(items), Segment::Index(i)) => items.get_mut(*i),
            _ => None,
        }
    }

    /// Re-express `new` in the numeric category of `self`.
    ///
    /// Non-numeric values on either side pass through unchanged. Doubles
    /// written onto integer fields truncate toward zero. Negative values
    /// can't live in an unsigned field and stay signed.
    pub fn coerce_like(&self, new: Value) -> Value {
        if !self.is_number() || !new.is_number() {
            return new;
        }
        match (self, new) {
            (Value::Int(_), Value::Int(i)) => Value::Int(i),
            (Value::Int(_), Value::UInt(u)) => {
                i64::try_from(u).map_or(Value::UInt(u), Value::Int)
            }
            (Value::Int(_), Value::Double(d)) => Value::Int(d as i64),

            (Value::UInt(_), Value::Int(i)) => u64::try_from(i).map_or(Value::Int(i), Value::UInt),
            (Value::UInt(_), Value::UInt(u)) => Value::UInt(u),
            (Value::UInt(_), Value::Double(d)) if d >= 0.0 => Value::UInt(d as u64),
            (Value::UInt(_), Value::Double(d)) => Value::Int(d as i64),

            (Value::Double(_), Value::Int(i)) => Value::Double(i as f64),
            (Value::Double(_), Value::UInt(u)) => Value::Double(u as f64),
            (Value::Double(_), Value::Double(d)) => Value::Double(d),

            (_, other) => other,
        }
    }

    /// Whether every double in this value is finite. JSON has no spelling
    /// for NaN or infinity.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Double(d) => d.is_finite(),
            Value::Array(items) => items.iter().all(Value::is_finite),
            Value::Object(map) => map.iter().all(|(_, v)| v.is_finite()),
            _ => true,
        }
    }

    /// Conventional tree for read-only consumers
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::UInt(u) => serde_json::Value::from(*u),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json_value).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json_value()))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(Value::UInt(u), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Double(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Double(d) if !d.is_finite() => Err(ser::Error::custom(format!(
                "{} cannot be written as JSON",
                d
            ))),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(object) => {
                let mut map = serializer.serialize_map(Some(object.len()))?;
                for (k, v) in object.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E>(self, i: i64) -> Result<Value, E> {
        Ok(Value::Int(i))
    }

    fn visit_u64<E>(self, u: u64) -> Result<Value, E> {
        Ok(Value::from(u))
    }

    fn visit_f64<E>(self, d: f64) -> Result<Value, E> {
        Ok(Value::Double(d))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::String(s.to_string()))
    }

    fn visit_string<E>(self, s: String) -> Result<Value, E> {
        Ok(Value::String(s))
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Deserialize::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut object = Object::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            object.insert(key, value);
        }
        Ok(Value::Object(object))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// One step in a [`JsonPath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(k) => Some(k),
            Segment::Index(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSyntaxError {
    #[error("Empty path segment in '{0}'")]
    EmptySegment(String),

    #[error("Invalid array index: {0}")]
    InvalidIndex(String),

    #[error("Unclosed '[' in '{0}'")]
    Unclosed(String),
}

/// Path into a document, written as `PlayerStateData.Units[2].Amount`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(Segment::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    /// Rewrite every key segment with `f`, leaving indices alone
    pub fn map_keys(&self, mut f: impl FnMut(&str) -> String) -> JsonPath {
        JsonPath {
            segments: self
                .segments
                .iter()
                .map(|s| match s {
                    Segment::Key(k) => Segment::Key(f(k)),
                    Segment::Index(i) => Segment::Index(*i),
                })
                .collect(),
        }
    }
}

impl From<Vec<Segment>> for JsonPath {
    fn from(segments: Vec<Segment>) -> Self {
        JsonPath { segments }
    }
}

impl FromStr for JsonPath {
    type Err = PathSyntaxError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        if path.is_empty() {
            return Ok(JsonPath { segments });
        }

        for part in path.split('.') {
            let (key, mut indices) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };

            if key.is_empty() && indices.is_empty() {
                return Err(PathSyntaxError::EmptySegment(path.to_string()));
            }
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }

            while let Some(rest) = indices.strip_prefix('[') {
                let close = rest
                    .find(']')
                    .ok_or_else(|| PathSyntaxError::Unclosed(part.to_string()))?;
                let index_str = &rest[..close];
                let index = index_str
                    .parse()
                    .map_err(|_| PathSyntaxError::InvalidIndex(index_str.to_string()))?;
                segments.push(Segment::Index(index));
                indices = &rest[close + 1..];
            }
            if !indices.is_empty() {
                return Err(PathSyntaxError::InvalidIndex(indices.to_string()));
            }
        }

        Ok(JsonPath { segments })
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(k) if i == 0 => write!(f, "{}", k)?,
                Segment::Key(k) => write!(f, ".{}", k)?,
                Segment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

/// Parsed save document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
}

impl Document {
    /// Parse JSON text, keeping every number's representation
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let root: Value =
            serde_json::from_slice(bytes).map_err(|e| ParseError::from_serde(&e, bytes))?;
        Ok(Document { root })
    }

    pub fn from_value(root: Value) -> Self {
        Document { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Serialize back to JSON text
    pub fn to_json(&self, pretty: bool) -> Result<Vec<u8>, serde_json::Error> {
        if pretty {
            serde_json::to_vec_pretty(&self.root)
        } else {
            serde_json::to_vec(&self.root)
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        self.root.to_json_value()
    }

    pub fn get(&self, path: &JsonPath) -> Option<&Value> {
        path.segments()
            .iter()
            .try_fold(&self.root, |current, segment| current.child(segment))
    }

    /// Set the value at `path`.
    ///
    /// Every segment but the last must already exist with a matching container
    /// kind. An existing numeric leaf keeps its category (see
    /// [`Value::coerce_like`]); a missing object key is inserted, and an array
    /// index equal to the length appends. Returns false and leaves the
    /// document untouched when the path can't be followed or `value` holds
    /// a NaN or infinite double.
    pub fn set_value_at_path(&mut self, path: &JsonPath, value: Value) -> bool {
        if !value.is_finite() {
            warn!(path = %path, "refusing to store a non-finite number");
            return false;
        }

        let Some((last, parents)) = path.segments().split_last() else {
            self.root = self.root.coerce_like(value);
            return true;
        };

        let mut current = &mut self.root;
        for segment in parents {
            current = match current.child_mut(segment) {
                Some(child) => child,
                None => return false,
            };
        }

        match (current, last) {
            (Value::Object(map), Segment::Key(key)) => {
                match map.get_mut(key) {
                    Some(existing) => {
                        let coerced = existing.coerce_like(value);
                        *existing = coerced;
                    }
                    None => {
                        map.insert(key.clone(), value);
                    }
                }
                true
            }
            (Value::Array(items), Segment::Index(i)) => {
                if let Some(existing) = items.get_mut(*i) {
                    let coerced = existing.coerce_like(value);
                    *existing = coerced;
                    true
                } else if *i == items.len() {
                    items.push(value);
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

/// Replace invalid UTF-8 so the payload can be parsed, logging where it was.
///
/// Valid input is returned borrowed and untouched.
pub fn sanitize_utf8(bytes: &[u8]) -> Cow<'_, [u8]> {
    match std::str::from_utf8(bytes) {
        Ok(_) => Cow::Borrowed(bytes),
        Err(e) => {
            warn!(
                offset = e.valid_up_to(),
                "save payload contains invalid UTF-8; replacing bad sequences"
            );
            Cow::Owned(String::from_utf8_lossy(bytes).into_owned().into_bytes())
        }
    }
}

/// Guess a value's type from user input (number, bool, null, or string)
pub fn parse_value(value_str: &str) -> Value {
    if let Ok(num) = value_str.parse::<i64>() {
        return Value::Int(num);
    }
    if let Ok(num) = value_str.parse::<u64>() {
        return Value::UInt(num);
    }
    if let Ok(num) = value_str.parse::<f64>() {
        if num.is_finite() {
            return Value::Double(num);
        }
    }

    if value_str.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if value_str.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if value_str == "null" {
        return Value::Null;
    }

    Value::String(value_str.to_string())
}

/// Parse a JSON fragment into a value
pub fn parse_raw_value(json: &str) -> Result<Value, ParseError> {
    Document::parse(json.as_bytes()).map(Document::into_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> JsonPath {
        p.parse().unwrap()
    }

    fn doc(json: &str) -> Document {
        Document::parse(json.as_bytes()).unwrap()
    }

    fn compact(doc: &Document) -> String {
        String::from_utf8(doc.to_json(false).unwrap()).unwrap()
    }

    #[test]
    fn test_number_categories_survive_roundtrip() {
        let json = r#"{"a":1,"b":-2,"c":18446744073709551615,"d":1.5,"e":3.0,"f":1e300}"#;
        let d = doc(json);
        let root = d.root().as_object().unwrap();

        assert_eq!(root.get("a"), Some(&Value::Int(1)));
        assert_eq!(root.get("b"), Some(&Value::Int(-2)));
        assert_eq!(root.get("c"), Some(&Value::UInt(u64::MAX)));
        assert_eq!(root.get("d"), Some(&Value::Double(1.5)));
        assert_eq!(root.get("e"), Some(&Value::Double(3.0)));

        assert_eq!(
            compact(&d),
            r#"{"a":1,"b":-2,"c":18446744073709551615,"d":1.5,"e":3.0,"f":1e300}"#
        );
    }

    #[test]
    fn test_key_order_preserved() {
        let d = doc(r#"{"zeta":1,"alpha":2,"mid":{"y":0,"b":1}}"#);
        assert_eq!(compact(&d), r#"{"zeta":1,"alpha":2,"mid":{"y":0,"b":1}}"#);
    }

    #[test]
    fn test_set_double_on_int_field_stays_int() {
        let mut d = doc(r#"{"X":7,"Y":2.5}"#);
        assert!(d.set_value_at_path(&path("X"), Value::Double(3.0)));
        assert!(d.set_value_at_path(&path("Y"), Value::Int(2)));
        assert_eq!(compact(&d), r#"{"X":3,"Y":2.0}"#);
    }

    #[test]
    fn test_set_keeps_uint_category() {
        let mut d = doc(r#"{"Seed":18446744073709551615}"#);
        assert!(d.set_value_at_path(&path("Seed"), Value::Int(5)));
        assert_eq!(d.get(&path("Seed")), Some(&Value::UInt(5)));

        assert!(d.set_value_at_path(&path("Seed"), Value::Int(-1)));
        assert_eq!(d.get(&path("Seed")), Some(&Value::Int(-1)));
    }

    #[test]
    fn test_set_non_numeric_replaces() {
        let mut d = doc(r#"{"Name":"old","Count":4}"#);
        assert!(d.set_value_at_path(&path("Name"), Value::from("new")));
        assert!(d.set_value_at_path(&path("Count"), Value::Null));
        assert_eq!(compact(&d), r#"{"Name":"new","Count":null}"#);
    }

    #[test]
    fn test_set_nested_and_array() {
        let mut d = doc(r#"{"Inv":{"Slots":[{"Amount":1},{"Amount":2}]}}"#);
        assert!(d.set_value_at_path(&path("Inv.Slots[1].Amount"), Value::Int(250)));
        assert_eq!(
            d.get(&path("Inv.Slots[1].Amount")),
            Some(&Value::Int(250))
        );

        // Appending at exactly the length is allowed
        assert!(d.set_value_at_path(&path("Inv.Slots[2]"), Value::Int(0)));
        assert!(!d.set_value_at_path(&path("Inv.Slots[9]"), Value::Int(0)));
    }

    #[test]
    fn test_set_inserts_missing_leaf() {
        let mut d = doc(r#"{"A":{}}"#);
        assert!(d.set_value_at_path(&path("A.New"), Value::Double(1.25)));
        assert_eq!(compact(&d), r#"{"A":{"New":1.25}}"#);
    }

    #[test]
    fn test_set_fails_without_mutation() {
        let mut d = doc(r#"{"A":{"B":[1,2]}}"#);
        let before = d.clone();

        assert!(!d.set_value_at_path(&path("Missing.B"), Value::Int(1)));
        assert!(!d.set_value_at_path(&path("A.B.C"), Value::Int(1)));
        assert!(!d.set_value_at_path(&path("A[0]"), Value::Int(1)));
        assert_eq!(d, before);
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        let mut d = doc(r#"{"x":1.5,"list":[]}"#);
        let before = d.clone();

        assert!(!d.set_value_at_path(&path("x"), Value::Double(f64::INFINITY)));
        assert!(!d.set_value_at_path(&path("x"), Value::Double(f64::NAN)));
        let nested = Value::Array(vec![Value::Int(1), Value::Double(f64::NEG_INFINITY)]);
        assert!(!d.set_value_at_path(&path("list[0]"), nested));
        assert_eq!(d, before);
        assert_eq!(d.to_json(false).unwrap(), br#"{"x":1.5,"list":[]}"#);

        // A tree built by hand still refuses to serialize rather than writing null
        let built = Document::from_value(Value::Double(f64::NAN));
        assert!(built.to_json(false).is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let original = doc(r#"{"A":1}"#);
        let mut copy = original.clone();
        copy.set_value_at_path(&path("A"), Value::Int(2));
        assert_eq!(original.get(&path("A")), Some(&Value::Int(1)));
        assert_eq!(copy.get(&path("A")), Some(&Value::Int(2)));
    }

    #[test]
    fn test_parse_error_offset() {
        let err = Document::parse(b"{\"a\":1,\n\"b\":}").unwrap_err();
        assert_eq!(err.line, 2);
        // Points at or just before the stray '}'
        assert!((11..=12).contains(&err.offset), "offset {}", err.offset);
    }

    #[test]
    fn test_pretty_output_parses_back() {
        let d = doc(r#"{"a":[1,2.5,"x"],"b":{"c":null}}"#);
        let pretty = d.to_json(true).unwrap();
        assert!(pretty.contains(&b'\n'));
        assert_eq!(Document::parse(&pretty).unwrap(), d);
    }

    #[test]
    fn test_to_value() {
        let d = doc(r#"{"a":1,"b":[true,2.5]}"#);
        assert_eq!(d.to_value(), serde_json::json!({"a": 1, "b": [true, 2.5]}));
    }

    #[test]
    fn test_path_syntax() {
        let p = path("A.B[0][3].C");
        assert_eq!(
            p.segments(),
            &[
                Segment::Key("A".into()),
                Segment::Key("B".into()),
                Segment::Index(0),
                Segment::Index(3),
                Segment::Key("C".into()),
            ]
        );
        assert_eq!(p.to_string(), "A.B[0][3].C");

        assert!("A..B".parse::<JsonPath>().is_err());
        assert!("A[x]".parse::<JsonPath>().is_err());
        assert!("A[1".parse::<JsonPath>().is_err());
        assert!("".parse::<JsonPath>().unwrap().is_empty());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("123"), Value::Int(123));
        assert_eq!(parse_value("18446744073709551615"), Value::UInt(u64::MAX));
        assert_eq!(parse_value("1.5"), Value::Double(1.5));
        assert_eq!(parse_value("TRUE"), Value::Bool(true));
        assert_eq!(parse_value("null"), Value::Null);
        assert_eq!(parse_value("hello"), Value::from("hello"));
        assert_eq!(parse_value("inf"), Value::from("inf"));
    }

    #[test]
    fn test_sanitize_utf8() {
        assert!(matches!(sanitize_utf8(b"{}"), Cow::Borrowed(_)));
        let fixed = sanitize_utf8(b"{\"a\":\"\xFF\"}");
        assert!(std::str::from_utf8(&fixed).is_ok());
        assert!(Document::parse(&fixed).is_ok());
    }
}
