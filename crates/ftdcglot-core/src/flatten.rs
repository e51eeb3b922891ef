//! Schema flattening: reference document → ordered scalar metric paths.
//!
//! The delta stream stores one column per numeric leaf, in depth-first field
//! order. The path list produced here is that column order and must never be
//! reordered afterwards.

use serde::Serialize;

use crate::bson::{Document, Value};

/// Separator between path segments, e.g. `serverStatus/mem/resident`.
pub const PATH_SEPARATOR: char = '/';

/// A leaf that carries no numeric series (string, object id, binary, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedLeaf {
    pub path: String,
    pub kind: &'static str,
}

/// Flattened view of a reference document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    /// Metric paths in delta-stream column order.
    pub paths: Vec<String>,
    /// Reference (sample #0) value of each path.
    pub values: Vec<u64>,
    /// Leaves that were dropped because they are not numeric.
    pub skipped: Vec<SkippedLeaf>,
}

impl Schema {
    /// Number of attributes discovered.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn push(&mut self, path: String, value: u64) {
        self.paths.push(path);
        self.values.push(value);
    }
}

/// Flattens `doc` depth-first in field order.
pub fn flatten(doc: &Document) -> Schema {
    let mut schema = Schema::default();
    walk_document(&mut schema, doc, "");
    schema
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        let mut path = String::with_capacity(parent.len() + 1 + name.len());
        path.push_str(parent);
        path.push(PATH_SEPARATOR);
        path.push_str(name);
        path
    }
}

fn walk_document(schema: &mut Schema, doc: &Document, parent: &str) {
    for (name, value) in doc.iter() {
        walk_value(schema, value, join(parent, name));
    }
}

fn walk_value(schema: &mut Schema, value: &Value, path: String) {
    match value {
        Value::Document(doc) => walk_document(schema, doc, &path),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk_value(schema, item, join(&path, &i.to_string()));
            }
        }
        Value::Boolean(b) => schema.push(path, u64::from(*b)),
        Value::Int32(v) => schema.push(path, i64::from(*v) as u64),
        Value::Int64(v) => schema.push(path, *v as u64),
        // FTDC stores doubles as their truncated 64-bit integer.
        Value::Double(v) => schema.push(path, *v as i64 as u64),
        Value::DateTime(ms) => schema.push(path, *ms as u64),
        Value::Timestamp { t, i } => {
            schema.push(join(&path, "t"), u64::from(*t));
            schema.push(join(&path, "i"), u64::from(*i));
        }
        other => schema.skipped.push(SkippedLeaf {
            path,
            kind: other.kind_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_first_field_order() {
        let doc = Document::new()
            .with("b", Value::Int32(2))
            .with(
                "a",
                Value::Document(
                    Document::new()
                        .with("z", Value::Int64(26))
                        .with("y", Value::Boolean(true)),
                ),
            )
            .with("c", Value::Boolean(false));

        let schema = flatten(&doc);
        assert_eq!(schema.paths, vec!["b", "a/z", "a/y", "c"]);
        assert_eq!(schema.values, vec![2, 26, 1, 0]);
        assert!(schema.skipped.is_empty());
    }

    #[test]
    fn test_string_field_is_skipped() {
        let doc = Document::new()
            .with("host", Value::String("db01".into()))
            .with("uptime", Value::Int64(3600));

        let schema = flatten(&doc);
        assert_eq!(schema.len(), 1);
        assert_eq!(schema.paths, vec!["uptime"]);
        assert_eq!(
            schema.skipped,
            vec![SkippedLeaf {
                path: "host".into(),
                kind: "string"
            }]
        );
    }

    #[test]
    fn test_timestamp_expands_to_two_paths() {
        let doc = Document::new().with(
            "repl",
            Value::Document(Document::new().with(
                "lastWrite",
                Value::Timestamp {
                    t: 1_600_000_000,
                    i: 3,
                },
            )),
        );

        let schema = flatten(&doc);
        assert_eq!(schema.paths, vec!["repl/lastWrite/t", "repl/lastWrite/i"]);
        assert_eq!(schema.values, vec![1_600_000_000, 3]);
    }

    #[test]
    fn test_array_elements_use_index_segments() {
        let doc = Document::new().with(
            "members",
            Value::Array(vec![
                Value::Document(Document::new().with("state", Value::Int32(1))),
                Value::Document(
                    Document::new()
                        .with("name", Value::String("node2".into()))
                        .with("state", Value::Int32(2)),
                ),
            ]),
        );

        let schema = flatten(&doc);
        assert_eq!(schema.paths, vec!["members/0/state", "members/1/state"]);
        assert_eq!(schema.skipped[0].path, "members/1/name");
    }

    #[test]
    fn test_dates_and_doubles_become_integers() {
        let doc = Document::new()
            .with("localTime", Value::DateTime(1_507_838_933_123))
            .with("uptime", Value::Double(86_400.9));

        let schema = flatten(&doc);
        assert_eq!(schema.values, vec![1_507_838_933_123, 86_400]);
    }

    #[test]
    fn test_negative_values_keep_bit_pattern() {
        let doc = Document::new().with("x", Value::Int32(-1));
        assert_eq!(flatten(&doc).values, vec![u64::MAX]);
    }

    #[test]
    fn test_object_id_and_null_skipped() {
        let doc = Document::new()
            .with("_id", Value::ObjectId([0; 12]))
            .with("n", Value::Null)
            .with("ok", Value::Double(1.0));

        let schema = flatten(&doc);
        assert_eq!(schema.paths, vec!["ok"]);
        let kinds: Vec<&str> = schema.skipped.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec!["objectId", "null"]);
    }
}
