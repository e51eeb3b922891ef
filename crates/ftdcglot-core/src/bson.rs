//! Minimal BSON document reader.
//!
//! Only what FTDC needs: ordered field iteration, the scalar kinds that show up
//! in server telemetry, and enough knowledge of every other element kind to
//! step over it. Field order is preserved because the delta stream of a
//! metric chunk is laid out in exactly the reference document's field order.

use std::fmt;

use chrono::DateTime;
use serde_json::{Map, Number};

// Element type tags (bsonspec.org).
const TAG_DOUBLE: u8 = 0x01;
const TAG_STRING: u8 = 0x02;
const TAG_DOCUMENT: u8 = 0x03;
const TAG_ARRAY: u8 = 0x04;
const TAG_BINARY: u8 = 0x05;
const TAG_UNDEFINED: u8 = 0x06;
const TAG_OBJECT_ID: u8 = 0x07;
const TAG_BOOLEAN: u8 = 0x08;
const TAG_DATETIME: u8 = 0x09;
const TAG_NULL: u8 = 0x0A;
const TAG_REGEX: u8 = 0x0B;
const TAG_DB_POINTER: u8 = 0x0C;
const TAG_JAVASCRIPT: u8 = 0x0D;
const TAG_SYMBOL: u8 = 0x0E;
const TAG_JAVASCRIPT_SCOPE: u8 = 0x0F;
const TAG_INT32: u8 = 0x10;
const TAG_TIMESTAMP: u8 = 0x11;
const TAG_INT64: u8 = 0x12;
const TAG_DECIMAL128: u8 = 0x13;
const TAG_MIN_KEY: u8 = 0xFF;
const TAG_MAX_KEY: u8 = 0x7F;

/// Smallest possible document: 4-byte length + terminating NUL.
pub const MIN_DOCUMENT_LEN: usize = 5;

/// Failure to parse a BSON slice. `pos` is relative to the slice start.
#[derive(Debug, Clone, PartialEq)]
pub struct BsonError {
    pub pos: usize,
    pub reason: String,
}

impl fmt::Display for BsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.reason, self.pos)
    }
}

impl std::error::Error for BsonError {}

/// Element kinds that are parsed only so they can be skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Undefined,
    Regex,
    DbPointer,
    JavaScript,
    Symbol,
    JavaScriptWithScope,
    MinKey,
    MaxKey,
}

/// One BSON value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Double(f64),
    String(String),
    Document(Document),
    Array(Vec<Value>),
    Binary { subtype: u8, bytes: Vec<u8> },
    ObjectId([u8; 12]),
    Boolean(bool),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    Null,
    Int32(i32),
    /// Replication timestamp: seconds + ordinal within the second.
    Timestamp { t: u32, i: u32 },
    Int64(i64),
    Decimal128([u8; 16]),
    Other(ElementKind),
}

impl Value {
    /// Short type name, used when reporting skipped leaves.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Document(_) => "document",
            Value::Array(_) => "array",
            Value::Binary { .. } => "binary",
            Value::ObjectId(_) => "objectId",
            Value::Boolean(_) => "bool",
            Value::DateTime(_) => "date",
            Value::Null => "null",
            Value::Int32(_) => "int",
            Value::Timestamp { .. } => "timestamp",
            Value::Int64(_) => "long",
            Value::Decimal128(_) => "decimal",
            Value::Other(ElementKind::Undefined) => "undefined",
            Value::Other(ElementKind::Regex) => "regex",
            Value::Other(ElementKind::DbPointer) => "dbPointer",
            Value::Other(ElementKind::JavaScript) => "javascript",
            Value::Other(ElementKind::Symbol) => "symbol",
            Value::Other(ElementKind::JavaScriptWithScope) => "javascriptWithScope",
            Value::Other(ElementKind::MinKey) => "minKey",
            Value::Other(ElementKind::MaxKey) => "maxKey",
        }
    }

    /// Integer view of numeric values (int32, int64, double truncated).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value as JSON (extended-JSON-ish for non-JSON kinds).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Double(v) => Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Document(d) => d.to_json(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Binary { subtype, bytes } => serde_json::json!({
                "$binary": { "subType": subtype, "length": bytes.len() }
            }),
            Value::ObjectId(oid) => serde_json::json!({ "$oid": hex(oid) }),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::DateTime(ms) => match DateTime::from_timestamp_millis(*ms) {
                Some(dt) => serde_json::Value::String(dt.to_rfc3339()),
                None => serde_json::Value::from(*ms),
            },
            Value::Null | Value::Other(_) => serde_json::Value::Null,
            Value::Int32(v) => serde_json::Value::from(*v),
            Value::Timestamp { t, i } => serde_json::json!({ "$timestamp": { "t": t, "i": i } }),
            Value::Int64(v) => serde_json::Value::from(*v),
            Value::Decimal128(bytes) => serde_json::json!({ "$numberDecimal": hex(bytes) }),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// An ordered BSON document.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the document at the start of `buf`.
    ///
    /// The declared length must fit inside `buf`; trailing bytes after the
    /// document are ignored (see [`Document::declared_len`]).
    pub fn from_bytes(buf: &[u8]) -> Result<Self, BsonError> {
        let mut cursor = Cursor { buf, pos: 0 };
        cursor.read_document()
    }

    /// Reads the 4-byte little-endian length prefix of a document.
    pub fn declared_len(buf: &[u8]) -> Option<usize> {
        let prefix: [u8; 4] = buf.get(0..4)?.try_into().ok()?;
        let len = i32::from_le_bytes(prefix);
        usize::try_from(len).ok()
    }

    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.fields.push((key.into(), value));
    }

    /// Builder-style [`Document::push`].
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.push(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.get(key)? {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_document(&self, key: &str) -> Option<&Document> {
        match self.get(key)? {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn get_binary(&self, key: &str) -> Option<&[u8]> {
        match self.get(key)? {
            Value::Binary { bytes, .. } => Some(bytes),
            _ => None,
        }
    }

    /// Follows a `/`-separated path through nested documents.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('/');
        let mut value = self.get(parts.next()?)?;
        for part in parts {
            value = match value {
                Value::Document(d) => d.get(part)?,
                _ => return None,
            };
        }
        Some(value)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = Map::with_capacity(self.fields.len());
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.to_json());
        }
        serde_json::Value::Object(map)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn err(&self, reason: impl Into<String>) -> BsonError {
        BsonError {
            pos: self.pos,
            reason: reason.into(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BsonError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| self.err(format!("need {} bytes, {} left", n, self.remaining())))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn u8(&mut self) -> Result<u8, BsonError> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], BsonError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn i32(&mut self) -> Result<i32, BsonError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, BsonError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, BsonError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn len_prefix(&mut self) -> Result<usize, BsonError> {
        let len = self.i32()?;
        usize::try_from(len).map_err(|_| self.err(format!("negative length {}", len)))
    }

    fn cstring(&mut self) -> Result<String, BsonError> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.err("unterminated key"))?;
        let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(s)
    }

    fn string(&mut self) -> Result<String, BsonError> {
        let len = self.len_prefix()?;
        if len == 0 {
            return Err(self.err("zero-length string"));
        }
        let bytes = self.take(len)?;
        if bytes[len - 1] != 0 {
            return Err(self.err("string missing NUL terminator"));
        }
        Ok(String::from_utf8_lossy(&bytes[..len - 1]).into_owned())
    }

    fn read_document(&mut self) -> Result<Document, BsonError> {
        let start = self.pos;
        let len = self.len_prefix()?;
        if len < MIN_DOCUMENT_LEN {
            return Err(self.err(format!("document length {} below minimum", len)));
        }
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                self.err(format!(
                    "document length {} exceeds {} available bytes",
                    len,
                    self.buf.len() - start
                ))
            })?;
        if self.buf[end - 1] != 0 {
            return Err(self.err("document missing terminator"));
        }

        // Parse elements inside a sub-slice so no element can read past the
        // declared document end.
        let mut inner = Cursor {
            buf: &self.buf[..end - 1],
            pos: self.pos,
        };
        let mut doc = Document::new();
        while inner.pos < end - 1 {
            let tag = inner.u8()?;
            let key = inner.cstring()?;
            let value = inner.read_value(tag)?;
            doc.fields.push((key, value));
        }
        self.pos = end;
        Ok(doc)
    }

    fn read_value(&mut self, tag: u8) -> Result<Value, BsonError> {
        let value = match tag {
            TAG_DOUBLE => Value::Double(f64::from_le_bytes(self.array()?)),
            TAG_STRING => Value::String(self.string()?),
            TAG_DOCUMENT => Value::Document(self.read_document()?),
            TAG_ARRAY => {
                let doc = self.read_document()?;
                Value::Array(doc.fields.into_iter().map(|(_, v)| v).collect())
            }
            TAG_BINARY => {
                let len = self.len_prefix()?;
                let subtype = self.u8()?;
                Value::Binary {
                    subtype,
                    bytes: self.take(len)?.to_vec(),
                }
            }
            TAG_UNDEFINED => Value::Other(ElementKind::Undefined),
            TAG_OBJECT_ID => Value::ObjectId(self.array()?),
            TAG_BOOLEAN => Value::Boolean(self.u8()? != 0),
            TAG_DATETIME => Value::DateTime(self.i64()?),
            TAG_NULL => Value::Null,
            TAG_REGEX => {
                self.cstring()?;
                self.cstring()?;
                Value::Other(ElementKind::Regex)
            }
            TAG_DB_POINTER => {
                self.string()?;
                self.take(12)?;
                Value::Other(ElementKind::DbPointer)
            }
            TAG_JAVASCRIPT => {
                self.string()?;
                Value::Other(ElementKind::JavaScript)
            }
            TAG_SYMBOL => {
                self.string()?;
                Value::Other(ElementKind::Symbol)
            }
            TAG_JAVASCRIPT_SCOPE => {
                let total = self.len_prefix()?;
                if total < 4 {
                    return Err(self.err("code-with-scope length too small"));
                }
                self.take(total - 4)?;
                Value::Other(ElementKind::JavaScriptWithScope)
            }
            TAG_INT32 => Value::Int32(self.i32()?),
            TAG_TIMESTAMP => {
                // Low word is the increment, high word the seconds.
                let i = self.u32()?;
                let t = self.u32()?;
                Value::Timestamp { t, i }
            }
            TAG_INT64 => Value::Int64(self.i64()?),
            TAG_DECIMAL128 => Value::Decimal128(self.array()?),
            TAG_MIN_KEY => Value::Other(ElementKind::MinKey),
            TAG_MAX_KEY => Value::Other(ElementKind::MaxKey),
            other => {
                return Err(self.err(format!("unknown element type 0x{:02x}", other)));
            }
        };
        Ok(value)
    }
}
