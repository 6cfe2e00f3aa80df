//! Process-local document store.
//!
//! Used when no database URL is configured and by tests. Every operation runs
//! under one lock, so unique index checks and the write they guard are atomic.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domain::document::{Document, ID_FIELD, ObjectId, matches};
use crate::domain::ports::{DocumentStore, DocumentStoreError, IndexSpec, UpdateOutcome};

use super::pipeline;

#[derive(Debug, Default)]
struct CollectionState {
    documents: Vec<Document>,
    unique: BTreeSet<String>,
}

impl CollectionState {
    fn position(&self, query: &Document) -> Option<usize> {
        self.documents.iter().position(|document| matches(document, query))
    }

    /// Reject `candidate` if it collides with another document on a unique
    /// field. `replacing` names the slot the candidate will overwrite.
    fn check_unique(
        &self,
        collection: &str,
        candidate: &Document,
        replacing: Option<usize>,
    ) -> Result<(), DocumentStoreError> {
        let fields = std::iter::once(ID_FIELD).chain(self.unique.iter().map(String::as_str));
        for field in fields {
            let Some(value) = candidate.get(field).filter(|value| !value.is_null()) else {
                continue;
            };
            let collides = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != replacing)
                .any(|(_, existing)| existing.get(field) == Some(value));
            if collides {
                return Err(DocumentStoreError::duplicate_key(collection, field));
            }
        }
        Ok(())
    }
}

/// [`DocumentStore`] holding every collection in memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<HashMap<String, CollectionState>>,
}

impl InMemoryDocumentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, CollectionState>>, DocumentStoreError> {
        self.collections
            .lock()
            .map_err(|_| DocumentStoreError::query("in-memory store lock poisoned"))
    }
}

fn with_id(mut document: Document, id: ObjectId) -> Document {
    document.insert(ID_FIELD.to_owned(), Value::String(id.to_string()));
    document
}

fn merge(target: &mut Document, patch: &Document) {
    for (field, value) in patch {
        if field != ID_FIELD {
            target.insert(field.clone(), value.clone());
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        query: &Document,
    ) -> Result<Option<Document>, DocumentStoreError> {
        let collections = self.lock()?;
        Ok(collections.get(collection).and_then(|state| {
            state
                .documents
                .iter()
                .find(|document| matches(document, query))
                .cloned()
        }))
    }

    async fn find(
        &self,
        collection: &str,
        query: &Document,
        limit: usize,
    ) -> Result<Vec<Document>, DocumentStoreError> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map(|state| {
                state
                    .documents
                    .iter()
                    .filter(|document| matches(document, query))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(
        &self,
        collection: &str,
        document: Document,
    ) -> Result<ObjectId, DocumentStoreError> {
        let id = match document.get(ID_FIELD) {
            None | Some(Value::Null) => ObjectId::generate(),
            Some(_) => ObjectId::from_document(&document)
                .ok_or_else(|| DocumentStoreError::query("_id must be a UUID string"))?,
        };
        let document = with_id(document, id);
        let mut collections = self.lock()?;
        let state = collections.entry(collection.to_owned()).or_default();
        state.check_unique(collection, &document, None)?;
        state.documents.push(document);
        debug!(collection, %id, "inserted document");
        Ok(id)
    }

    async fn replace(
        &self,
        collection: &str,
        id: ObjectId,
        document: Document,
    ) -> Result<(), DocumentStoreError> {
        let document = with_id(document, id);
        let mut collections = self.lock()?;
        let state = collections.entry(collection.to_owned()).or_default();
        let position = state.position(&id.query());
        state.check_unique(collection, &document, position)?;
        match position.and_then(|position| state.documents.get_mut(position)) {
            Some(slot) => *slot = document,
            None => state.documents.push(document),
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, DocumentStoreError> {
        let mut collections = self.lock()?;
        let state = collections.entry(collection.to_owned()).or_default();
        if let Some(position) = state.position(query) {
            let mut merged = state.documents[position].clone();
            merge(&mut merged, patch);
            state.check_unique(collection, &merged, Some(position))?;
            state.documents[position] = merged;
            return Ok(UpdateOutcome {
                matched: 1,
                upserted: None,
            });
        }
        if !upsert {
            return Ok(UpdateOutcome::default());
        }
        let id = ObjectId::from_document(query).unwrap_or_else(ObjectId::generate);
        let mut created = query.clone();
        merge(&mut created, patch);
        let created = with_id(created, id);
        state.check_unique(collection, &created, None)?;
        state.documents.push(created);
        Ok(UpdateOutcome {
            matched: 0,
            upserted: Some(id),
        })
    }

    async fn remove(&self, collection: &str, query: &Document) -> Result<u64, DocumentStoreError> {
        let mut collections = self.lock()?;
        let Some(state) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = state.documents.len();
        state.documents.retain(|document| !matches(document, query));
        Ok(u64::try_from(before - state.documents.len()).unwrap_or(u64::MAX))
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<(), DocumentStoreError> {
        if !index.unique {
            return Ok(());
        }
        let mut collections = self.lock()?;
        let state = collections.entry(collection.to_owned()).or_default();
        let mut seen = BTreeSet::new();
        for document in &state.documents {
            if let Some(value) = document.get(&index.field).filter(|value| !value.is_null()) {
                if !seen.insert(value.to_string()) {
                    return Err(DocumentStoreError::duplicate_key(collection, index.field.as_str()));
                }
            }
        }
        state.unique.insert(index.field.clone());
        Ok(())
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, DocumentStoreError> {
        let documents = {
            let collections = self.lock()?;
            collections
                .get(collection)
                .map(|state| state.documents.clone())
                .unwrap_or_default()
        };
        pipeline::evaluate(documents, pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("fixture must be an object, got {other}"),
        }
    }

    #[fixture]
    fn store() -> InMemoryDocumentStore {
        InMemoryDocumentStore::new()
    }

    #[rstest]
    #[tokio::test]
    async fn unique_index_rejects_second_insert(store: InMemoryDocumentStore) {
        store
            .create_index("accounts", &IndexSpec::unique("email"))
            .await
            .expect("index");
        store
            .insert("accounts", doc(json!({"email": "a@x.com"})))
            .await
            .expect("first insert");

        let err = store
            .insert("accounts", doc(json!({"email": "a@x.com"})))
            .await
            .expect_err("duplicate");

        assert!(matches!(err, DocumentStoreError::DuplicateKey { ref field, .. } if field == "email"));
        let all = store.find("accounts", &Document::new(), 10).await.expect("find");
        assert_eq!(all.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn replace_drops_absent_fields_and_update_keeps_them(store: InMemoryDocumentStore) {
        let id = store
            .insert("accounts", doc(json!({"name": "A", "phone": "1"})))
            .await
            .expect("insert");

        let outcome = store
            .update("accounts", &id.query(), &doc(json!({"name": "B"})), false)
            .await
            .expect("update");
        assert_eq!(outcome.matched, 1);
        let merged = store.find_one("accounts", &id.query()).await.expect("find");
        assert_eq!(merged.and_then(|d| d.get("phone").cloned()), Some(json!("1")));

        store
            .replace("accounts", id, doc(json!({"name": "C"})))
            .await
            .expect("replace");
        let replaced = store
            .find_one("accounts", &id.query())
            .await
            .expect("find")
            .expect("present");
        assert_eq!(replaced, with_id(doc(json!({"name": "C"})), id));
    }

    #[rstest]
    #[tokio::test]
    async fn update_miss_without_upsert_matches_nothing(store: InMemoryDocumentStore) {
        let outcome = store
            .update("accounts", &ObjectId::generate().query(), &doc(json!({"a": 1})), false)
            .await
            .expect("update");
        assert_eq!(outcome, UpdateOutcome::default());
    }

    #[rstest]
    #[tokio::test]
    async fn upsert_creates_from_query_and_patch(store: InMemoryDocumentStore) {
        let outcome = store
            .update("accounts", &doc(json!({"email": "a@x.com"})), &doc(json!({"name": "A"})), true)
            .await
            .expect("upsert");
        let id = outcome.upserted.expect("created");

        let created = store
            .find_one("accounts", &id.query())
            .await
            .expect("find")
            .expect("present");
        assert_eq!(created.get("email"), Some(&json!("a@x.com")));
        assert_eq!(created.get("name"), Some(&json!("A")));
    }

    #[rstest]
    #[tokio::test]
    async fn update_onto_a_taken_unique_value_fails(store: InMemoryDocumentStore) {
        store
            .create_index("accounts", &IndexSpec::unique("email"))
            .await
            .expect("index");
        store
            .insert("accounts", doc(json!({"email": "a@x.com"})))
            .await
            .expect("insert a");
        let b = store
            .insert("accounts", doc(json!({"email": "b@x.com"})))
            .await
            .expect("insert b");

        let err = store
            .update("accounts", &b.query(), &doc(json!({"email": "a@x.com"})), false)
            .await
            .expect_err("collision");
        assert!(matches!(err, DocumentStoreError::DuplicateKey { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn remove_counts_deleted_documents(store: InMemoryDocumentStore) {
        for name in ["A", "A", "B"] {
            store
                .insert("people", doc(json!({"name": name})))
                .await
                .expect("insert");
        }

        let removed = store
            .remove("people", &doc(json!({"name": "A"})))
            .await
            .expect("remove");

        assert_eq!(removed, 2);
        assert_eq!(
            store.remove("missing", &Document::new()).await.expect("remove"),
            0
        );
    }

    #[rstest]
    #[tokio::test]
    async fn create_index_over_duplicates_fails(store: InMemoryDocumentStore) {
        for _ in 0..2 {
            store
                .insert("accounts", doc(json!({"email": "a@x.com"})))
                .await
                .expect("insert");
        }
        let err = store
            .create_index("accounts", &IndexSpec::unique("email"))
            .await
            .expect_err("existing duplicates");
        assert!(matches!(err, DocumentStoreError::DuplicateKey { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn aggregate_runs_over_the_collection(store: InMemoryDocumentStore) {
        for name in ["A", "B", "B"] {
            store
                .insert("people", doc(json!({"name": name})))
                .await
                .expect("insert");
        }

        let output = store
            .aggregate(
                "people",
                &[doc(json!({"$match": {"name": "B"}})), doc(json!({"$count": "n"}))],
            )
            .await
            .expect("aggregate");

        assert_eq!(output, vec![doc(json!({"n": 2}))]);
    }
}
