//! In-process document store. Backs development runs without `DATABASE_URL`
//! and the test suite.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Document, DocumentStore, Filter, Sort, StoreError, UNIQUE_FIELDS};

#[derive(Default)]
pub struct MemoryDocumentStore {
    // Vec order is insertion order, which breaks sort ties.
    collections: RwLock<HashMap<String, Vec<(Uuid, Document)>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Fails if `document` repeats another record's value for a unique field.
fn check_unique(
    collection: &str,
    records: &[(Uuid, Document)],
    id: Uuid,
    document: &Document,
) -> Result<(), StoreError> {
    for (unique_collection, field) in UNIQUE_FIELDS {
        if *unique_collection != collection {
            continue;
        }
        let Some(value) = document.get(*field) else {
            continue;
        };
        if records
            .iter()
            .any(|(existing, other)| *existing != id && other.get(*field) == Some(value))
        {
            return Err(StoreError::Conflict(
                "A record with that value already exists".to_string(),
            ));
        }
    }
    Ok(())
}

fn push_new(
    collection: &str,
    records: &mut Vec<(Uuid, Document)>,
    id: Uuid,
    document: Document,
) -> Result<Document, StoreError> {
    if records.iter().any(|(existing, _)| *existing == id) {
        return Err(StoreError::Conflict(format!("duplicate id {}", id)));
    }
    check_unique(collection, records, id, &document)?;
    records.push((id, document.clone()));
    Ok(document)
}

/// Merge `patch` into the record `id` when `expected` matches it.
fn merge_matching(
    collection: &str,
    records: &mut [(Uuid, Document)],
    id: Uuid,
    expected: &Filter,
    patch: Document,
) -> Result<Option<Document>, StoreError> {
    let Some(index) = records.iter().position(|(existing, _)| *existing == id) else {
        return Ok(None);
    };
    if !expected.matches(&records[index].1) {
        return Ok(None);
    }

    let mut merged = records[index].1.clone();
    for (field, value) in patch {
        merged.insert(field, value);
    }
    check_unique(collection, records, id, &merged)?;
    records[index].1 = merged.clone();
    Ok(Some(merged))
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(
        &self,
        collection: &str,
        id: Uuid,
        document: Document,
    ) -> Result<Document, StoreError> {
        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.to_string()).or_default();
        push_new(collection, records, id, document)
    }

    async fn insert_if_empty(
        &self,
        collection: &str,
        id: Uuid,
        document: Document,
    ) -> Result<Option<Document>, StoreError> {
        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.to_string()).or_default();
        if !records.is_empty() {
            return Ok(None);
        }
        push_new(collection, records, id, document).map(Some)
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|records| {
            records
                .iter()
                .find(|(existing, _)| *existing == id)
                .map(|(_, document)| document.clone())
        }))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &Sort,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let mut matched: Vec<Document> = collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|(_, document)| filter.matches(document))
                    .map(|(_, document)| document.clone())
                    .collect()
            })
            .unwrap_or_default();

        // Stable sort keeps insertion order for ties.
        matched.sort_by(|a, b| sort.compare(a, b));
        Ok(matched)
    }

    async fn merge(
        &self,
        collection: &str,
        id: Uuid,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.merge_if(collection, id, &Filter::new(), patch).await
    }

    async fn merge_if(
        &self,
        collection: &str,
        id: Uuid,
        expected: &Filter,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection) {
            Some(records) => merge_matching(collection, records, id, expected, patch),
            None => Ok(None),
        }
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|(existing, _)| *existing != id);
        Ok(records.len() != before)
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|records| records.len() as u64)
            .unwrap_or(0))
    }

    async fn health_check(&self) -> Result<Duration, StoreError> {
        Ok(Duration::ZERO)
    }
}
