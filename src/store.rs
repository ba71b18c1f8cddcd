//! Store collaborator seam and the in-memory backend.
//!
//! The console core never talks to a database directly: the dispatcher
//! produces a [`StoreOperation`](crate::ast::StoreOperation) and hands
//! it, by value, to whatever implements [`DocumentStore`]. The
//! [`MemoryStore`] here is a deliberately small backend so the REPL
//! works out of the box and the engine is testable end to end; a
//! production driver would live behind the same trait.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use crate::ast::{ObjectId, StoreOperation, Value};

/// Failures surfaced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store's own schema validation rejected the write. The
    /// engine re-maps this to the "Validation Error" message family so
    /// pre-check and store-enforced rejections read the same.
    #[error("the data violates the collection schema rules: {0}")]
    Schema(String),

    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// A document store able to execute one operation against a named
/// collection. Implementations report success as an operation-specific
/// JSON payload.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn execute(
        &self,
        collection: &str,
        op: StoreOperation,
    ) -> Result<serde_json::Value, StoreError>;
}

/// In-memory document store.
///
/// Filters support equality plus `$eq/$ne/$gt/$gte/$lt/$lte/$in/$nin/
/// $exists` with dotted field paths. Updates support `$set`, `$inc`,
/// `$unset` and whole-document replacement. Pipelines support
/// `$match/$sort/$limit/$skip/$count/$group`; anything else is a
/// backend error rather than a silent no-op.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    id_counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of one collection.
    pub fn seed(&self, collection: &str, docs: Vec<Value>) {
        self.collections
            .write()
            .expect("store lock poisoned")
            .insert(collection.to_string(), docs);
    }

    /// Build a store from a seed document: an object mapping collection
    /// names to arrays of (extended-JSON aware) documents.
    pub fn from_seed_json(seed: &serde_json::Value) -> Result<Self, StoreError> {
        let serde_json::Value::Object(map) = seed else {
            return Err(StoreError::Backend(
                "seed must be an object of collection arrays".to_string(),
            ));
        };
        let store = Self::new();
        for (name, docs) in map {
            let serde_json::Value::Array(items) = docs else {
                return Err(StoreError::Backend(format!(
                    "seed collection '{name}' must be an array"
                )));
            };
            store.seed(name, items.iter().map(Value::from_json).collect());
        }
        Ok(store)
    }

    /// Number of documents currently in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .expect("store lock poisoned")
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Mint a fresh id: seconds-since-epoch plus a process counter,
    /// formatted as 24 hex digits.
    fn next_object_id(&self) -> ObjectId {
        let secs = Utc::now().timestamp().max(0) as u32;
        let n = self.id_counter.fetch_add(1, AtomicOrdering::Relaxed);
        ObjectId::parse(&format!("{secs:08x}{n:016x}")).expect("generated id is 24 hex digits")
    }
}

impl DocumentStore for MemoryStore {
    async fn execute(
        &self,
        collection: &str,
        op: StoreOperation,
    ) -> Result<serde_json::Value, StoreError> {
        match op {
            StoreOperation::Find {
                filter,
                projection,
                sort,
                limit,
                skip,
            } => {
                let guard = self.collections.read().expect("store lock poisoned");
                let docs = guard.get(collection).map(Vec::as_slice).unwrap_or(&[]);
                let mut hits: Vec<Value> = docs
                    .iter()
                    .filter(|d| matches_filter(d, &filter))
                    .cloned()
                    .collect();
                if let Some(spec) = &sort {
                    sort_docs(&mut hits, spec);
                }
                let skip = skip.unwrap_or(0).max(0) as usize;
                let mut hits: Vec<Value> = hits.into_iter().skip(skip).collect();
                if let Some(n) = limit {
                    hits.truncate(n.max(0) as usize);
                }
                let projected: Vec<serde_json::Value> =
                    hits.iter().map(|d| project(d, &projection).to_json()).collect();
                Ok(serde_json::Value::Array(projected))
            }

            StoreOperation::FindOne { filter } => {
                let guard = self.collections.read().expect("store lock poisoned");
                let docs = guard.get(collection).map(Vec::as_slice).unwrap_or(&[]);
                Ok(docs
                    .iter()
                    .find(|d| matches_filter(d, &filter))
                    .map(Value::to_json)
                    .unwrap_or(serde_json::Value::Null))
            }

            StoreOperation::InsertOne { doc } => {
                let doc = self.with_id(doc);
                let id = doc.get("_id").cloned().unwrap_or(Value::Null);
                self.collections
                    .write()
                    .expect("store lock poisoned")
                    .entry(collection.to_string())
                    .or_default()
                    .push(doc.clone());
                Ok(json!({
                    "acknowledged": true,
                    "insertedId": id.to_json(),
                    "insertedDoc": doc.to_json(),
                }))
            }

            StoreOperation::InsertMany { docs } => {
                let docs: Vec<Value> = docs.into_iter().map(|d| self.with_id(d)).collect();
                let ids: Vec<serde_json::Value> = docs
                    .iter()
                    .map(|d| d.get("_id").cloned().unwrap_or(Value::Null).to_json())
                    .collect();
                let count = docs.len();
                self.collections
                    .write()
                    .expect("store lock poisoned")
                    .entry(collection.to_string())
                    .or_default()
                    .extend(docs);
                Ok(json!({
                    "acknowledged": true,
                    "insertedCount": count,
                    "insertedIds": ids,
                }))
            }

            StoreOperation::UpdateOne { filter, update } => {
                self.update_docs(collection, &filter, &update, true)
            }
            StoreOperation::UpdateMany { filter, update } => {
                self.update_docs(collection, &filter, &update, false)
            }

            StoreOperation::DeleteOne { filter } => self.delete_docs(collection, &filter, true),
            StoreOperation::DeleteMany { filter } => self.delete_docs(collection, &filter, false),

            StoreOperation::CountDocuments { filter } => {
                let guard = self.collections.read().expect("store lock poisoned");
                let docs = guard.get(collection).map(Vec::as_slice).unwrap_or(&[]);
                let n = docs.iter().filter(|d| matches_filter(d, &filter)).count();
                Ok(json!({ "count": n }))
            }

            StoreOperation::Aggregate { pipeline } => {
                let input = {
                    let guard = self.collections.read().expect("store lock poisoned");
                    guard.get(collection).cloned().unwrap_or_default()
                };
                let out = run_pipeline(input, &pipeline)?;
                Ok(serde_json::Value::Array(
                    out.iter().map(Value::to_json).collect(),
                ))
            }

            StoreOperation::Distinct { field, filter } => {
                let guard = self.collections.read().expect("store lock poisoned");
                let docs = guard.get(collection).map(Vec::as_slice).unwrap_or(&[]);
                let mut seen: Vec<Value> = Vec::new();
                for doc in docs.iter().filter(|d| matches_filter(d, &filter)) {
                    if let Some(v) = field_path(doc, &field) {
                        if !seen.contains(v) {
                            seen.push(v.clone());
                        }
                    }
                }
                Ok(serde_json::Value::Array(
                    seen.iter().map(Value::to_json).collect(),
                ))
            }
        }
    }
}

impl MemoryStore {
    /// Ensure a document carries an `_id`.
    fn with_id(&self, doc: Value) -> Value {
        let Value::Object(mut entries) = doc else {
            return doc;
        };
        if !entries.iter().any(|(k, _)| k == "_id") {
            entries.insert(
                0,
                ("_id".to_string(), Value::ObjectId(self.next_object_id())),
            );
        }
        Value::Object(entries)
    }

    fn update_docs(
        &self,
        collection: &str,
        filter: &Value,
        update: &Value,
        only_first: bool,
    ) -> Result<serde_json::Value, StoreError> {
        let mut guard = self.collections.write().expect("store lock poisoned");
        let docs = guard.entry(collection.to_string()).or_default();

        let mut matched = 0u64;
        let mut modified = 0u64;
        for doc in docs.iter_mut() {
            if !matches_filter(doc, filter) {
                continue;
            }
            matched += 1;
            if apply_update(doc, update)? {
                modified += 1;
            }
            if only_first {
                break;
            }
        }
        Ok(json!({
            "acknowledged": true,
            "matchedCount": matched,
            "modifiedCount": modified,
        }))
    }

    fn delete_docs(
        &self,
        collection: &str,
        filter: &Value,
        only_first: bool,
    ) -> Result<serde_json::Value, StoreError> {
        let mut guard = self.collections.write().expect("store lock poisoned");
        let docs = guard.entry(collection.to_string()).or_default();

        let before = docs.len();
        if only_first {
            if let Some(idx) = docs.iter().position(|d| matches_filter(d, filter)) {
                docs.remove(idx);
            }
        } else {
            docs.retain(|d| !matches_filter(d, filter));
        }
        let deleted = (before - docs.len()) as u64;
        Ok(json!({ "acknowledged": true, "deletedCount": deleted }))
    }
}

/// Look up a possibly-dotted field path in a document.
fn field_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Does `doc` satisfy `filter`? An empty or non-object filter matches
/// everything, like an empty find().
fn matches_filter(doc: &Value, filter: &Value) -> bool {
    let Value::Object(conditions) = filter else {
        return true;
    };
    conditions.iter().all(|(path, expected)| {
        let actual = field_path(doc, path);
        match expected {
            Value::Object(ops)
                if !ops.is_empty() && ops.iter().all(|(k, _)| k.starts_with('$')) =>
            {
                ops.iter().all(|(op, operand)| {
                    matches_operator(actual, op, operand)
                })
            }
            other => actual == Some(other),
        }
    })
}

fn matches_operator(actual: Option<&Value>, op: &str, operand: &Value) -> bool {
    let present = actual.unwrap_or(&Value::Null);
    match op {
        "$eq" => actual == Some(operand),
        "$ne" => actual != Some(operand),
        "$gt" => compare(present, operand).is_some_and(|o| o == std::cmp::Ordering::Greater),
        "$gte" => compare(present, operand).is_some_and(|o| o != std::cmp::Ordering::Less),
        "$lt" => compare(present, operand).is_some_and(|o| o == std::cmp::Ordering::Less),
        "$lte" => compare(present, operand).is_some_and(|o| o != std::cmp::Ordering::Greater),
        "$in" => matches!(operand, Value::Array(items) if items.iter().any(|i| Some(i) == actual)),
        "$nin" => {
            matches!(operand, Value::Array(items) if !items.iter().any(|i| Some(i) == actual))
        }
        "$exists" => {
            let want = matches!(operand, Value::Bool(true));
            actual.is_some() == want
        }
        // Unknown operators match nothing.
        _ => false,
    }
}

/// Order two values of the same kind; mixed kinds do not compare.
fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::ObjectId(x), Value::ObjectId(y)) => Some(x.as_str().cmp(y.as_str())),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Sort documents by a `{field: 1|-1, ...}` specification; keys apply
/// in insertion order.
fn sort_docs(docs: &mut [Value], spec: &Value) {
    let Value::Object(keys) = spec else {
        return;
    };
    docs.sort_by(|a, b| {
        for (path, dir) in keys {
            let descending = dir.as_f64().unwrap_or(1.0) < 0.0;
            let av = field_path(a, path).unwrap_or(&Value::Null);
            let bv = field_path(b, path).unwrap_or(&Value::Null);
            let ord = compare(av, bv).unwrap_or(std::cmp::Ordering::Equal);
            let ord = if descending { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// Apply a projection specification. An empty projection returns the
/// document unchanged; `{f: 1}` selects fields (keeping `_id` unless
/// excluded), `{f: 0}` drops fields.
fn project(doc: &Value, projection: &Value) -> Value {
    let (Value::Object(spec), Value::Object(entries)) = (projection, doc) else {
        return doc.clone();
    };
    if spec.is_empty() {
        return doc.clone();
    }
    let truthy = |v: &Value| !matches!(v, Value::Number(n) if *n == 0.0) && *v != Value::Bool(false);
    let inclusion = spec.iter().any(|(k, v)| k != "_id" && truthy(v));

    let keep = |key: &str| -> bool {
        match spec.iter().find(|(k, _)| k == key) {
            Some((_, v)) => truthy(v),
            None if inclusion => key == "_id",
            None => true,
        }
    };
    Value::Object(
        entries
            .iter()
            .filter(|(k, _)| keep(k))
            .cloned()
            .collect(),
    )
}

/// Apply an update document. Returns whether the document changed.
fn apply_update(doc: &mut Value, update: &Value) -> Result<bool, StoreError> {
    let Value::Object(update_entries) = update else {
        return Err(StoreError::Backend("update must be a document".to_string()));
    };
    let has_operators = update_entries.iter().any(|(k, _)| k.starts_with('$'));

    if !has_operators {
        // Whole-document replacement preserving _id.
        let id = doc.get("_id").cloned();
        let mut entries = update_entries.clone();
        if let Some(id) = id {
            if !entries.iter().any(|(k, _)| k == "_id") {
                entries.insert(0, ("_id".to_string(), id));
            }
        }
        let replacement = Value::Object(entries);
        let changed = *doc != replacement;
        *doc = replacement;
        return Ok(changed);
    }

    let before = doc.clone();
    for (op, payload) in update_entries {
        let Value::Object(fields) = payload else {
            return Err(StoreError::Backend(format!("{op} requires a document")));
        };
        match op.as_str() {
            "$set" => {
                for (k, v) in fields {
                    set_field(doc, k, v.clone());
                }
            }
            "$inc" => {
                for (k, v) in fields {
                    let delta = v.as_f64().unwrap_or(0.0);
                    let current = doc.get(k).and_then(Value::as_f64).unwrap_or(0.0);
                    set_field(doc, k, Value::Number(current + delta));
                }
            }
            "$unset" => {
                if let Value::Object(entries) = doc {
                    entries.retain(|(k, _)| !fields.iter().any(|(f, _)| f == k));
                }
            }
            other => {
                return Err(StoreError::Backend(format!(
                    "unsupported update operator: {other}"
                )));
            }
        }
    }
    Ok(*doc != before)
}

fn set_field(doc: &mut Value, key: &str, value: Value) {
    let Value::Object(entries) = doc else {
        return;
    };
    match entries.iter_mut().find(|(k, _)| k == key) {
        Some((_, slot)) => *slot = value,
        None => entries.push((key.to_string(), value)),
    }
}

/// Run an aggregation pipeline over the collection snapshot.
fn run_pipeline(mut docs: Vec<Value>, pipeline: &[Value]) -> Result<Vec<Value>, StoreError> {
    for stage in pipeline {
        let Value::Object(entries) = stage else {
            return Err(StoreError::Backend(
                "pipeline stages must be documents".to_string(),
            ));
        };
        let Some((name, spec)) = entries.first() else {
            continue;
        };
        docs = match name.as_str() {
            "$match" => docs
                .into_iter()
                .filter(|d| matches_filter(d, spec))
                .collect(),
            "$sort" => {
                sort_docs(&mut docs, spec);
                docs
            }
            "$limit" => {
                docs.truncate(spec.as_i64().unwrap_or(0).max(0) as usize);
                docs
            }
            "$skip" => docs
                .into_iter()
                .skip(spec.as_i64().unwrap_or(0).max(0) as usize)
                .collect(),
            "$count" => {
                let key = spec.as_str().unwrap_or("count").to_string();
                vec![Value::Object(vec![(key, Value::Number(docs.len() as f64))])]
            }
            "$group" => run_group(&docs, spec)?,
            other => {
                return Err(StoreError::Backend(format!(
                    "unsupported pipeline stage: {other}"
                )));
            }
        };
    }
    Ok(docs)
}

/// Evaluate a `$group` stage: groups keyed by the `_id` expression,
/// accumulators `$sum/$avg/$min/$max/$first`.
fn run_group(docs: &[Value], spec: &Value) -> Result<Vec<Value>, StoreError> {
    let Value::Object(spec_entries) = spec else {
        return Err(StoreError::Backend("$group requires a document".to_string()));
    };
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| StoreError::Backend("$group requires an _id expression".to_string()))?;

    // Group membership, preserving first-seen key order.
    let mut groups: Vec<(Value, Vec<&Value>)> = Vec::new();
    for doc in docs {
        let key = eval_expr(doc, id_expr);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(doc),
            None => groups.push((key, vec![doc])),
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut entries = vec![("_id".to_string(), key)];
        for (field, acc) in spec_entries.iter().filter(|(k, _)| k != "_id") {
            let Value::Object(acc_entries) = acc else {
                return Err(StoreError::Backend(format!(
                    "accumulator for '{field}' must be a document"
                )));
            };
            let Some((op, expr)) = acc_entries.first() else {
                continue;
            };
            let resolved: Vec<Value> = members.iter().map(|d| eval_expr(d, expr)).collect();
            let numbers: Vec<f64> = resolved.iter().filter_map(Value::as_f64).collect();
            let value = match op.as_str() {
                "$sum" => Value::Number(numbers.iter().sum()),
                "$avg" => {
                    if numbers.is_empty() {
                        Value::Null
                    } else {
                        Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
                    }
                }
                "$min" => resolved
                    .iter()
                    .cloned()
                    .reduce(|a, b| match compare(&a, &b) {
                        Some(std::cmp::Ordering::Greater) => b,
                        _ => a,
                    })
                    .unwrap_or(Value::Null),
                "$max" => resolved
                    .iter()
                    .cloned()
                    .reduce(|a, b| match compare(&a, &b) {
                        Some(std::cmp::Ordering::Less) => b,
                        _ => a,
                    })
                    .unwrap_or(Value::Null),
                "$first" => resolved.first().cloned().unwrap_or(Value::Null),
                other => {
                    return Err(StoreError::Backend(format!(
                        "unsupported accumulator: {other}"
                    )));
                }
            };
            entries.push((field.clone(), value));
        }
        out.push(Value::Object(entries));
    }
    Ok(out)
}

/// Evaluate a `$group` expression: `"$field"` reads a (dotted) field,
/// anything else is a literal.
fn eval_expr(doc: &Value, expr: &Value) -> Value {
    match expr {
        Value::String(s) => match s.strip_prefix('$') {
            Some(path) => field_path(doc, path).cloned().unwrap_or(Value::Null),
            None => expr.clone(),
        },
        other => other.clone(),
    }
}
