//! Driven port for the document database.
//!
//! Documents are addressed by collection name and an equality query. Adapters
//! must enforce unique indexes atomically: application code inserts first and
//! reacts to [`DocumentStoreError::DuplicateKey`] rather than checking ahead.

use async_trait::async_trait;

use crate::domain::document::{Document, ObjectId};

use super::define_port_error;

define_port_error! {
    /// Failures raised by document store adapters.
    pub enum DocumentStoreError {
        /// A unique index rejected the write.
        DuplicateKey { collection: String, field: String } =>
            "duplicate key in {collection} on field {field}",
        /// The store could not be reached.
        Connection { message: String } => "document store connection failed: {message}",
        /// The operation was rejected or failed while executing.
        Query { message: String } => "document store query failed: {message}",
    }
}

/// Index declaration on a single top-level field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Indexed field name.
    pub field: String,
    /// Whether duplicate values are rejected.
    pub unique: bool,
}

impl IndexSpec {
    /// Unique index on `field`.
    pub fn unique(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            unique: true,
        }
    }
}

/// Result of a merge update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    /// Number of documents matched by the query (zero or one).
    pub matched: u64,
    /// Identifier of the document created by an upsert.
    pub upserted: Option<ObjectId>,
}

/// Document database operations used by the persistence model layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching `query`.
    async fn find_one(
        &self,
        collection: &str,
        query: &Document,
    ) -> Result<Option<Document>, DocumentStoreError>;

    /// Up to `limit` documents matching `query`, in insertion order.
    async fn find(
        &self,
        collection: &str,
        query: &Document,
        limit: usize,
    ) -> Result<Vec<Document>, DocumentStoreError>;

    /// Insert a new document, assigning an identifier when `_id` is absent.
    async fn insert(
        &self,
        collection: &str,
        document: Document,
    ) -> Result<ObjectId, DocumentStoreError>;

    /// Replace the document with `id` wholesale, creating it when missing.
    async fn replace(
        &self,
        collection: &str,
        id: ObjectId,
        document: Document,
    ) -> Result<(), DocumentStoreError>;

    /// Merge `patch` into the first document matching `query`.
    ///
    /// Fields absent from `patch` are preserved. With `upsert`, a miss
    /// inserts the union of `query` and `patch`.
    async fn update(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, DocumentStoreError>;

    /// Delete every document matching `query`, returning how many went.
    async fn remove(&self, collection: &str, query: &Document) -> Result<u64, DocumentStoreError>;

    /// Create `index` if it does not already exist.
    async fn create_index(
        &self,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<(), DocumentStoreError>;

    /// Run an aggregation pipeline and return the raw output documents.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, DocumentStoreError>;
}
