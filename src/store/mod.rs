//! Document persistence.
//!
//! Records are JSON objects grouped by collection. [`DocumentStore`] is the
//! backend seam (Postgres JSONB or in-memory); [`ResourceStore`] is the typed
//! facade handlers work with. The typed layer owns identity and timestamps:
//! `id` and `createdAt` are assigned once on create and never rewritten.
pub mod memory;
pub mod postgres;

use std::{cmp::Ordering, collections::BTreeMap, marker::PhantomData, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// `(collection, field)` pairs whose values must be unique within the collection.
pub const UNIQUE_FIELDS: &[(&str, &str)] = &[("principals", "username")];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("stored document is malformed: {0}")]
    Corrupt(String),
}

/// Exact-match conditions on top-level document fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(BTreeMap<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }

    /// JSON object form, used for JSONB containment.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub direction: Direction,
}

/// Ordered sort keys. Records equal on every key keep insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort(Vec<SortKey>);

impl Sort {
    pub fn by(field: &'static str, direction: Direction) -> Self {
        Sort(vec![SortKey { field, direction }])
    }

    pub fn then(mut self, field: &'static str, direction: Direction) -> Self {
        self.0.push(SortKey { field, direction });
        self
    }

    pub fn newest_first() -> Self {
        Sort::by(CREATED_AT_FIELD, Direction::Desc)
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    /// Compare two documents on these keys. Missing fields sort last in either direction.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.0 {
            let ordering = match (a.get(key.field), b.get(key.field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => {
                    let natural = compare_values(x, y);
                    match key.direction {
                        Direction::Asc => natural,
                        Direction::Desc => natural.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl Default for Sort {
    fn default() -> Self {
        Sort::newest_first()
    }
}

/// JSONB ordering: Object > Array > Boolean > Number > String > Null.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::String(_) => 1,
            Value::Number(_) => 2,
            Value::Bool(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Backend seam for document persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn insert(
        &self,
        collection: &str,
        id: Uuid,
        document: Document,
    ) -> Result<Document, StoreError>;

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &Sort,
    ) -> Result<Vec<Document>, StoreError>;

    /// Insert only while `collection` holds no documents. `None` if it already has one.
    async fn insert_if_empty(
        &self,
        collection: &str,
        id: Uuid,
        document: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Shallow merge of `patch` over the stored document. `None` if absent.
    async fn merge(
        &self,
        collection: &str,
        id: Uuid,
        patch: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Like `merge`, but only while the stored document still matches `expected`.
    /// `None` if absent or no longer matching.
    async fn merge_if(
        &self,
        collection: &str,
        id: Uuid,
        expected: &Filter,
        patch: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// `false` if nothing was deleted.
    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool, StoreError>;

    async fn count(&self, collection: &str) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<Duration, StoreError>;
}

/// A statically declared record type stored in one collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Human name used in messages ("Product not found").
    const NAME: &'static str;

    fn id(&self) -> Uuid;

    fn default_sort() -> Sort {
        Sort::newest_first()
    }
}

/// Typed access to one collection.
pub struct ResourceStore<T> {
    documents: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceStore<T> {
    fn clone(&self) -> Self {
        Self {
            documents: self.documents.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> ResourceStore<T> {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            documents,
            _record: PhantomData,
        }
    }

    /// Persist a new record, assigning `id`, `createdAt` and `updatedAt`.
    pub async fn create<D: Serialize>(&self, fields: &D) -> Result<T, StoreError> {
        let (id, document) = new_document(fields)?;
        let stored = self.documents.insert(T::COLLECTION, id, document).await?;
        from_document(stored)
    }

    /// `create`, but only if the collection is empty. `None` when a record already exists.
    pub async fn create_first<D: Serialize>(&self, fields: &D) -> Result<Option<T>, StoreError> {
        let (id, document) = new_document(fields)?;
        self.documents
            .insert_if_empty(T::COLLECTION, id, document)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn get(&self, id: Uuid) -> Result<T, StoreError> {
        self.documents
            .get(T::COLLECTION, id)
            .await?
            .ok_or(StoreError::NotFound(T::NAME))
            .and_then(from_document)
    }

    pub async fn list(&self, filter: &Filter, sort: &Sort) -> Result<Vec<T>, StoreError> {
        self.documents
            .find(T::COLLECTION, filter, sort)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Merge the fields present in `patch` over the stored record.
    pub async fn update<P: Serialize>(&self, id: Uuid, patch: &P) -> Result<T, StoreError> {
        let document = patch_document(patch)?;
        self.documents
            .merge(T::COLLECTION, id, document)
            .await?
            .ok_or(StoreError::NotFound(T::NAME))
            .and_then(from_document)
    }

    /// `update`, applied only while the stored record still matches `expected`.
    /// `Ok(None)` when it no longer does; `NotFound` when the record is gone.
    pub async fn update_if<P: Serialize>(
        &self,
        id: Uuid,
        expected: &Filter,
        patch: &P,
    ) -> Result<Option<T>, StoreError> {
        let document = patch_document(patch)?;
        match self
            .documents
            .merge_if(T::COLLECTION, id, expected, document)
            .await?
        {
            Some(stored) => from_document(stored).map(Some),
            None => self.get(id).await.map(|_| None),
        }
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        if self.documents.delete(T::COLLECTION, id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(T::NAME))
        }
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.documents.count(T::COLLECTION).await
    }
}

fn new_document<D: Serialize>(fields: &D) -> Result<(Uuid, Document), StoreError> {
    let mut document = to_document(fields)?;
    let id = Uuid::new_v4();
    let now = timestamp::now_string();
    document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    document.insert(CREATED_AT_FIELD.to_string(), Value::String(now.clone()));
    document.insert(UPDATED_AT_FIELD.to_string(), Value::String(now));
    Ok((id, document))
}

fn patch_document<P: Serialize>(patch: &P) -> Result<Document, StoreError> {
    let mut document = to_document(patch)?;
    document.remove(ID_FIELD);
    document.remove(CREATED_AT_FIELD);
    document.insert(
        UPDATED_AT_FIELD.to_string(),
        Value::String(timestamp::now_string()),
    );
    Ok(document)
}

fn to_document<S: Serialize>(value: &S) -> Result<Document, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Corrupt(format!(
            "expected an object, got {}",
            other
        ))),
        Err(e) => Err(StoreError::Corrupt(e.to_string())),
    }
}

fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(document)).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Record timestamps, always RFC 3339 UTC with microseconds so that string
/// order is chronological order.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn now_string() -> String {
        format(&Utc::now())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }

    /// Same format for nullable timestamps.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_str(&super::format(value)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<DateTime<Utc>>::deserialize(deserializer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn filter_matches_exact_values_only() {
        let filter = Filter::new().with("category", "windows");
        assert!(filter.matches(&doc(json!({"category": "windows", "title": "A"}))));
        assert!(!filter.matches(&doc(json!({"category": "doors"}))));
        assert!(!filter.matches(&doc(json!({"title": "no category"}))));
        assert!(Filter::new().matches(&doc(json!({}))));
    }

    #[test]
    fn filter_value_is_a_json_object() {
        let filter = Filter::new().with("isPublished", true).with("category", "news");
        assert_eq!(filter.to_value(), json!({"category": "news", "isPublished": true}));
    }

    #[test]
    fn sort_orders_by_each_key_in_turn() {
        let sort = Sort::by("order", Direction::Asc).then(CREATED_AT_FIELD, Direction::Desc);
        let first = doc(json!({"order": 0, "createdAt": "2024-01-02T00:00:00.000000Z"}));
        let second = doc(json!({"order": 0, "createdAt": "2024-01-01T00:00:00.000000Z"}));
        let third = doc(json!({"order": 5, "createdAt": "2024-01-03T00:00:00.000000Z"}));

        assert_eq!(sort.compare(&first, &second), Ordering::Less);
        assert_eq!(sort.compare(&second, &third), Ordering::Less);
        assert_eq!(sort.compare(&third, &first), Ordering::Greater);
    }

    #[test]
    fn missing_sort_fields_go_last() {
        let sort = Sort::by("order", Direction::Desc);
        let with = doc(json!({"order": 1}));
        let without = doc(json!({}));
        assert_eq!(sort.compare(&with, &without), Ordering::Less);
        assert_eq!(Sort::by("order", Direction::Asc).compare(&without, &with), Ordering::Greater);
    }

    #[test]
    fn timestamps_have_fixed_width() {
        let a = timestamp::format(&"2024-05-01T10:00:00Z".parse().unwrap());
        let b = timestamp::format(&"2024-05-01T10:00:00.5Z".parse().unwrap());
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }
}
