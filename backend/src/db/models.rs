//! Document-level types shared by every repository implementation.
//!
//! Documents are schemaless JSON objects. Typed shapes from [`crate::api`] are
//! converted with [`encode`] and [`Document::decode`]. Partial writes are
//! expressed as a [`DocumentUpdate`]: an ordered list of dotted field paths and
//! [`FieldValue`]s, including the store-native sentinels (delete a field,
//! atomic increment, server timestamp, array union) so callers never have to
//! read a document just to patch one key of it.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::repository::{ErrorContext, RepositoryError, RepositoryResult};

/// Raw payload of a stored document.
pub type DocumentData = Map<String, Value>;

/// A stored document together with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: DocumentData,
    pub version: u64,
}

impl Document {
    /// Deserialize the payload into a typed shape.
    pub fn decode<T: DeserializeOwned>(&self) -> RepositoryResult<T> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| {
            RepositoryError::serialization_with_context(
                e.to_string(),
                ErrorContext::new("decode").with_entity_id(&self.id),
            )
        })
    }

    /// Read a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// Serialize a typed shape into a document payload.
pub fn encode<T: Serialize>(value: &T) -> RepositoryResult<DocumentData> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(RepositoryError::validation(format!(
            "Documents must be JSON objects, got {}",
            other
        ))),
    }
}

/// Value written to a single field path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain value.
    Set(Value),
    /// Remove the field (and nothing else) from the document.
    Delete,
    /// Add to a numeric field, treating a missing field as 0.
    Increment(i64),
    /// Commit time of the write, as an RFC 3339 string.
    ServerTimestamp,
    /// Append the elements not already present in the array field.
    ArrayUnion(Vec<Value>),
}

/// Ordered list of field writes applied to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentUpdate {
    fields: Vec<(String, FieldValue)>,
}

impl DocumentUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((path.into(), FieldValue::Set(value.into())));
        self
    }

    pub fn delete(mut self, path: impl Into<String>) -> Self {
        self.fields.push((path.into(), FieldValue::Delete));
        self
    }

    pub fn increment(mut self, path: impl Into<String>, by: i64) -> Self {
        self.fields.push((path.into(), FieldValue::Increment(by)));
        self
    }

    pub fn server_timestamp(mut self, path: impl Into<String>) -> Self {
        self.fields.push((path.into(), FieldValue::ServerTimestamp));
        self
    }

    pub fn array_union(mut self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.fields.push((path.into(), FieldValue::ArrayUnion(values)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(path, value)| (path.as_str(), value))
    }

    /// Apply every field write to `data` in order.
    pub fn apply(&self, data: &mut DocumentData, now: DateTime<Utc>) -> RepositoryResult<()> {
        for (path, value) in &self.fields {
            let segments: Vec<&str> = path.split('.').collect();
            if segments.iter().any(|s| s.is_empty()) {
                return Err(RepositoryError::validation(format!(
                    "Invalid field path '{}'",
                    path
                )));
            }
            match value {
                FieldValue::Delete => delete_path(data, &segments),
                other => {
                    let current = lookup_path(data, &segments);
                    let resolved = resolve(other, current, now)?;
                    set_path(data, &segments, resolved);
                }
            }
        }
        Ok(())
    }
}

fn resolve(value: &FieldValue, current: Option<&Value>, now: DateTime<Utc>) -> RepositoryResult<Value> {
    Ok(match value {
        FieldValue::Set(v) => v.clone(),
        FieldValue::ServerTimestamp => Value::String(now.to_rfc3339()),
        FieldValue::Increment(by) => match current {
            None | Some(Value::Null) => Value::from(*by),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => Value::from(i + by),
                None => Value::from(n.as_f64().unwrap_or_default() + *by as f64),
            },
            Some(other) => {
                return Err(RepositoryError::validation(format!(
                    "Cannot increment non-numeric field holding {}",
                    other
                )))
            }
        },
        FieldValue::ArrayUnion(values) => {
            let mut array = match current {
                Some(Value::Array(existing)) => existing.clone(),
                _ => Vec::new(),
            };
            for v in values {
                if !array.contains(v) {
                    array.push(v.clone());
                }
            }
            Value::Array(array)
        }
        FieldValue::Delete => Value::Null,
    })
}

fn lookup_path<'a>(data: &'a DocumentData, segments: &[&str]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut value = data.get(*first)?;
    for segment in rest {
        value = value.as_object()?.get(*segment)?;
    }
    Some(value)
}

fn set_path(map: &mut DocumentData, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            map.insert(leaf.to_string(), value);
        }
        [head, rest @ ..] => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                set_path(child, rest, value);
            }
        }
    }
}

fn delete_path(map: &mut DocumentData, segments: &[&str]) {
    match segments {
        [] => {}
        [leaf] => {
            map.remove(*leaf);
        }
        [head, rest @ ..] => {
            if let Some(Value::Object(child)) = map.get_mut(*head) {
                delete_path(child, rest);
            }
        }
    }
}

/// Recursively merge `source` into `target`; nested objects are merged,
/// everything else is overwritten.
pub fn deep_merge(target: &mut DocumentData, source: DocumentData) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

// ==================== Queries ====================

/// Comparison operator of a query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    /// Field equals any element of the filter's array value.
    In,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Single-field predicate; a query matches documents satisfying all its filters.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn any_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::In, Value::Array(values))
    }

    /// Whether a document payload satisfies this filter.
    pub fn matches(&self, data: &DocumentData) -> bool {
        let segments: Vec<&str> = self.field.split('.').collect();
        let Some(actual) = lookup_path(data, &segments) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::In => match &self.value {
                Value::Array(candidates) => candidates.iter().any(|c| values_equal(actual, c)),
                _ => false,
            },
            FilterOp::Lt => compare(actual, &self.value).is_some_and(|o| o.is_lt()),
            FilterOp::Le => compare(actual, &self.value).is_some_and(|o| o.is_le()),
            FilterOp::Gt => compare(actual, &self.value).is_some_and(|o| o.is_gt()),
            FilterOp::Ge => compare(actual, &self.value).is_some_and(|o| o.is_ge()),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// ==================== Batched writes ====================

/// One write of a batch or transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchWrite {
    /// Replace the document, or deep-merge into it when `merge` is set.
    Set {
        collection: String,
        id: String,
        data: DocumentData,
        merge: bool,
    },
    /// Patch an existing document; fails if it does not exist.
    Update {
        collection: String,
        id: String,
        update: DocumentUpdate,
    },
    /// Patch a document, creating it when absent.
    Merge {
        collection: String,
        id: String,
        update: DocumentUpdate,
    },
    Delete { collection: String, id: String },
}

impl BatchWrite {
    pub fn set(collection: &str, id: impl Into<String>, data: DocumentData) -> Self {
        BatchWrite::Set {
            collection: collection.to_string(),
            id: id.into(),
            data,
            merge: false,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            BatchWrite::Set { collection, .. }
            | BatchWrite::Update { collection, .. }
            | BatchWrite::Merge { collection, .. }
            | BatchWrite::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BatchWrite::Set { id, .. }
            | BatchWrite::Update { id, .. }
            | BatchWrite::Merge { id, .. }
            | BatchWrite::Delete { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> DocumentData {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_nested_set_creates_intermediate_maps() {
        let mut data = DocumentData::new();
        DocumentUpdate::new()
            .set("values.BEA.min", "2023-04-01")
            .apply(&mut data, Utc::now())
            .unwrap();
        assert_eq!(Value::Object(data), json!({"values": {"BEA": {"min": "2023-04-01"}}}));
    }

    #[test]
    fn test_delete_removes_only_the_target_key() {
        let mut data = object(json!({"values": {"BEA": 1, "BLA": 2}, "year": 2023}));
        DocumentUpdate::new()
            .delete("values.BEA")
            .delete("values.missing.deeper")
            .apply(&mut data, Utc::now())
            .unwrap();
        assert_eq!(Value::Object(data), json!({"values": {"BLA": 2}, "year": 2023}));
    }

    #[test]
    fn test_increment_and_array_union() {
        let mut data = object(json!({"count": 2, "tags": ["a"]}));
        DocumentUpdate::new()
            .increment("count", 3)
            .increment("fresh", 1)
            .array_union("tags", vec![json!("a"), json!("b")])
            .apply(&mut data, Utc::now())
            .unwrap();
        assert_eq!(data["count"], 5);
        assert_eq!(data["fresh"], 1);
        assert_eq!(data["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_increment_rejects_strings() {
        let mut data = object(json!({"count": "two"}));
        let result = DocumentUpdate::new().increment("count", 1).apply(&mut data, Utc::now());
        assert!(matches!(result, Err(RepositoryError::ValidationError { .. })));
    }

    #[test]
    fn test_empty_path_segment_is_rejected() {
        let mut data = DocumentData::new();
        let result = DocumentUpdate::new().set("values..x", 1).apply(&mut data, Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn test_deep_merge() {
        let mut target = object(json!({"a": {"x": 1, "y": 2}, "b": 1}));
        deep_merge(&mut target, object(json!({"a": {"y": 3, "z": 4}, "c": 5})));
        assert_eq!(
            Value::Object(target),
            json!({"a": {"x": 1, "y": 3, "z": 4}, "b": 1, "c": 5})
        );
    }

    #[test]
    fn test_filters() {
        let data = object(json!({"year": 2023, "phenophase": "BEA", "meta": {"alt": 640.5}}));
        assert!(Filter::eq("year", 2023).matches(&data));
        assert!(!Filter::eq("year", 2022).matches(&data));
        assert!(Filter::any_of("phenophase", vec![json!("BLA"), json!("BEA")]).matches(&data));
        assert!(Filter::new("meta.alt", FilterOp::Ge, 640.5).matches(&data));
        assert!(!Filter::new("meta.alt", FilterOp::Lt, 500).matches(&data));
        assert!(!Filter::eq("missing", 1).matches(&data));
    }
}
