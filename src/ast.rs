//! Core data structures for parsed console commands.
//!
//! A console line parses into a [`ShellCommand`]; the dispatcher turns
//! that into exactly one [`StoreOperation`]. Argument values live in
//! the [`Value`] model, a JSON superset with the two store-specific
//! scalar types (object identifiers and timestamps).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A validated 24-hex-digit document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap a 24-hex-digit string. Returns `None` for anything else.
    pub fn parse(hex: &str) -> Option<Self> {
        if is_hex24(hex) {
            Some(Self(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// The hex payload.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId(\"{}\")", self.0)
    }
}

/// True for exactly 24 hex digits.
pub fn is_hex24(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A generic document value.
///
/// Objects preserve insertion order, which is semantically significant
/// for sort specifications and aggregation stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    ObjectId(ObjectId),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    /// An empty document.
    pub fn empty_object() -> Self {
        Value::Object(Vec::new())
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Look up a top-level field of an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Numeric view, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer view, truncating the float representation.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|n| n as i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render as extended JSON: ObjectId as `{"$oid": …}`, Date as
    /// `{"$date": …}`, everything else structurally.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{Map, Number, json};
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                // Whole numbers render without a trailing ".0".
                if n.fract() == 0.0 && n.is_finite() && n.abs() < i64::MAX as f64 {
                    serde_json::Value::Number(Number::from(*n as i64))
                } else {
                    Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::ObjectId(oid) => json!({ "$oid": oid.as_str() }),
            Value::Date(dt) => {
                json!({ "$date": dt.to_rfc3339_opts(SecondsFormat::Millis, true) })
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }

    /// Build a value from plain or extended JSON (seed files, fixtures).
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                // Extended JSON scalars first.
                if map.len() == 1 {
                    if let Some(serde_json::Value::String(hex)) = map.get("$oid") {
                        if let Some(oid) = ObjectId::parse(hex) {
                            return Value::ObjectId(oid);
                        }
                    }
                    if let Some(serde_json::Value::String(ts)) = map.get("$date") {
                        if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
                            return Value::Date(dt.with_timezone(&Utc));
                        }
                    }
                }
                Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::ObjectId(oid) => write!(f, "{oid}"),
            Value::Date(dt) => write!(f, "Date(\"{}\")", dt.to_rfc3339()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// One fluent call appended after the primary method, e.g. `.limit(5)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainCall {
    pub method: String,
    pub args: Vec<Value>,
}

/// A fully parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellCommand {
    /// Target collection name (checked against the allow-list later).
    pub collection: String,
    /// Primary method name, matched case-sensitively.
    pub method: String,
    /// Parsed primary arguments.
    pub args: Vec<Value>,
    /// Chained calls in written order.
    pub chain: Vec<ChainCall>,
}

/// Sort direction for one key of a find sort specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// The closed set of operations the console can issue against a store.
///
/// Constructed once per request by the dispatcher, executed exactly
/// once, then discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOperation {
    Find {
        filter: Value,
        projection: Value,
        sort: Option<Value>,
        limit: Option<i64>,
        skip: Option<i64>,
    },
    FindOne {
        filter: Value,
    },
    InsertOne {
        doc: Value,
    },
    InsertMany {
        docs: Vec<Value>,
    },
    UpdateOne {
        filter: Value,
        update: Value,
    },
    UpdateMany {
        filter: Value,
        update: Value,
    },
    DeleteOne {
        filter: Value,
    },
    DeleteMany {
        filter: Value,
    },
    CountDocuments {
        filter: Value,
    },
    Aggregate {
        pipeline: Vec<Value>,
    },
    Distinct {
        field: String,
        filter: Value,
    },
}

impl StoreOperation {
    /// The console method name this operation answers to.
    pub fn method_name(&self) -> &'static str {
        match self {
            StoreOperation::Find { .. } => "find",
            StoreOperation::FindOne { .. } => "findOne",
            StoreOperation::InsertOne { .. } => "insertOne",
            StoreOperation::InsertMany { .. } => "insertMany",
            StoreOperation::UpdateOne { .. } => "updateOne",
            StoreOperation::UpdateMany { .. } => "updateMany",
            StoreOperation::DeleteOne { .. } => "deleteOne",
            StoreOperation::DeleteMany { .. } => "deleteMany",
            StoreOperation::CountDocuments { .. } => "countDocuments",
            StoreOperation::Aggregate { .. } => "aggregate",
            StoreOperation::Distinct { .. } => "distinct",
        }
    }

    /// Whether this operation writes to the store.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StoreOperation::InsertOne { .. }
                | StoreOperation::InsertMany { .. }
                | StoreOperation::UpdateOne { .. }
                | StoreOperation::UpdateMany { .. }
                | StoreOperation::DeleteOne { .. }
                | StoreOperation::DeleteMany { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_object_id_parse() {
        assert!(ObjectId::parse("507f1f77bcf86cd799439011").is_some());
        assert!(ObjectId::parse("507F1F77BCF86CD799439011").is_some());
        assert!(ObjectId::parse("507f1f77bcf86cd79943901").is_none()); // 23 chars
        assert!(ObjectId::parse("507f1f77bcf86cd79943901g").is_none()); // non-hex
    }

    #[test]
    fn test_object_preserves_insertion_order() {
        let v = Value::Object(vec![
            ("z".to_string(), Value::Number(1.0)),
            ("a".to_string(), Value::Number(2.0)),
        ]);
        let json = serde_json::to_string(&v.to_json()).unwrap();
        assert!(json.find("\"z\"").unwrap() < json.find("\"a\"").unwrap());

        // Multi-key sort specs depend on nested order surviving too.
        let spec = Value::Object(vec![(
            "sort".to_string(),
            Value::Object(vec![
                ("rating".to_string(), Value::Number(-1.0)),
                ("price".to_string(), Value::Number(1.0)),
            ]),
        )]);
        let json = serde_json::to_string(&spec.to_json()).unwrap();
        assert_eq!(json, r#"{"sort":{"rating":-1,"price":1}}"#);
    }

    #[test]
    fn test_extended_json_round_trip() {
        let oid = ObjectId::parse("507f1f77bcf86cd799439011").unwrap();
        let v = Value::Object(vec![
            ("_id".to_string(), Value::ObjectId(oid)),
            ("price".to_string(), Value::Number(49.99)),
        ]);
        let back = Value::from_json(&v.to_json());
        assert_eq!(v, back);
    }

    #[test]
    fn test_whole_numbers_render_without_fraction() {
        assert_eq!(Value::Number(5.0).to_json(), serde_json::json!(5));
        assert_eq!(Value::Number(5.5).to_json(), serde_json::json!(5.5));
    }
}
