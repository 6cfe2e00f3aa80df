//! Persistence model layer: typed entities over document collections.
//!
//! A [`Model`] declares its collection, its field table and its schema rules.
//! [`Collection`] binds a model type to a [`DocumentStore`] and provides the
//! read and write operations. The difference between [`Collection::save`]
//! (replace the whole document) and [`Collection::update`] (merge only the
//! given fields) is load-bearing; callers pick one deliberately.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::Error;
use super::document::{Document, ID_FIELD, ObjectId};
use super::ports::{DocumentStore, DocumentStoreError, IndexSpec};

/// Default number of documents materialised by [`Collection::find`].
pub const MAX_FIND_LIST_LEN: usize = 100;

/// Schema validation failure reported by [`Model::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Messages keyed by the offending field.
    Fields(BTreeMap<String, Vec<String>>),
    /// A failure that cannot be attributed to a single field.
    Model(String),
}

impl SchemaError {
    /// Single message against a single field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fields(BTreeMap::from([(field.into(), vec![message.into()])]))
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fields(fields) => {
                let names: Vec<&str> = fields.keys().map(String::as_str).collect();
                write!(f, "invalid fields: {}", names.join(", "))
            }
            Self::Model(message) => f.write_str(message),
        }
    }
}

/// Failures raised by [`Collection`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The document store rejected or failed the operation.
    #[error(transparent)]
    Store(#[from] DocumentStoreError),
    /// The entity could not be turned into a document.
    #[error("failed to encode {model}: {message}")]
    Encode {
        /// Model type name.
        model: &'static str,
        /// Serializer message.
        message: String,
    },
    /// A stored document could not be turned into the entity.
    #[error("failed to decode {model}: {message}")]
    Decode {
        /// Model type name.
        model: &'static str,
        /// Deserializer message.
        message: String,
    },
}

impl ModelError {
    /// Whether a unique index rejected the write.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Store(DocumentStoreError::DuplicateKey { .. }))
    }
}

impl From<ModelError> for Error {
    fn from(err: ModelError) -> Self {
        error!(error = %err, "persistence failure promoted to domain error");
        match err {
            ModelError::Store(DocumentStoreError::Connection { .. }) => {
                Error::service_unavailable("document store unavailable")
            }
            ModelError::Store(DocumentStoreError::DuplicateKey { field, .. }) => {
                Error::conflict(format!("{field} already exists"))
            }
            other => Error::internal(other.to_string()),
        }
    }
}

/// An entity stored as one document in a named collection.
pub trait Model: Serialize + DeserializeOwned + Send + Sync {
    /// Collection holding documents of this model.
    const COLLECTION: &'static str;
    /// Name used in log lines.
    const NAME: &'static str;
    /// Default page size for [`Collection::find`].
    const FIND_LIST_LEN: usize = MAX_FIND_LIST_LEN;

    /// Declared document fields, including [`ID_FIELD`].
    fn fields() -> &'static [&'static str];

    /// Indexes created by [`Collection::ensure_indexes`].
    fn indexes() -> Vec<IndexSpec> {
        Vec::new()
    }

    /// Store-assigned identifier, once persisted.
    fn id(&self) -> Option<ObjectId>;

    /// Record the identifier assigned by the store.
    fn set_id(&mut self, id: ObjectId);

    /// Schema rules that need no storage access.
    fn validate(&self) -> Result<(), SchemaError> {
        Ok(())
    }

    /// Hook applied to every query before it reaches the store.
    fn process_query(query: Document) -> Document {
        query
    }
}

/// Pending query against a model's collection, consumed by [`Collection::find`].
#[derive(Debug, Clone)]
pub struct Cursor<M> {
    query: Document,
    _model: PhantomData<fn() -> M>,
}

impl<M> Cursor<M> {
    /// The processed query this cursor will run.
    pub fn query(&self) -> &Document {
        &self.query
    }
}

/// Typed access to the collection backing model `M`.
pub struct Collection<M> {
    store: Arc<dyn DocumentStore>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for Collection<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _model: PhantomData,
        }
    }
}

impl<M: Model> Collection<M> {
    /// Bind model `M` to `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _model: PhantomData,
        }
    }

    /// Create the indexes the model declares.
    pub async fn ensure_indexes(&self) -> Result<(), ModelError> {
        for index in M::indexes() {
            self.store.create_index(M::COLLECTION, &index).await?;
        }
        Ok(())
    }

    /// First entity matching `query`, or `None` on a miss.
    pub async fn find_one(&self, query: Document) -> Result<Option<M>, ModelError> {
        let query = M::process_query(query);
        let found = self.store.find_one(M::COLLECTION, &query).await?;
        found
            .map(|document| make_model::<M>(document, "find_one"))
            .transpose()
    }

    /// Prepare a cursor over the documents matching `query`.
    pub fn get_cursor(&self, query: Document) -> Cursor<M> {
        Cursor {
            query: M::process_query(query),
            _model: PhantomData,
        }
    }

    /// Materialise up to `limit` entities from `cursor`.
    ///
    /// A missing or zero limit falls back to [`Model::FIND_LIST_LEN`].
    pub async fn find(&self, cursor: &Cursor<M>, limit: Option<usize>) -> Result<Vec<M>, ModelError> {
        let limit = limit.filter(|value| *value > 0).unwrap_or(M::FIND_LIST_LEN);
        let documents = self.store.find(M::COLLECTION, &cursor.query, limit).await?;
        documents
            .into_iter()
            .map(|document| make_model::<M>(document, "find"))
            .collect()
    }

    /// Insert `entity` as a new document and record its identifier.
    ///
    /// Fails with a duplicate-key store error when a unique index rejects it.
    pub async fn insert(&self, entity: &mut M) -> Result<ObjectId, ModelError> {
        let document = to_document(entity)?;
        let id = self.store.insert(M::COLLECTION, document).await?;
        entity.set_id(id);
        Ok(id)
    }

    /// Replace the stored document wholesale, or insert when unsaved.
    pub async fn save(&self, entity: &mut M) -> Result<ObjectId, ModelError> {
        let Some(id) = entity.id() else {
            return self.insert(entity).await;
        };
        let document = to_document(entity)?;
        self.store.replace(M::COLLECTION, id, document).await?;
        Ok(id)
    }

    /// Merge `partial` (or every field of `entity`) into the stored document.
    ///
    /// Fields outside the patch keep their stored values. An unsaved entity,
    /// or one whose document no longer exists, is saved instead. The patch is
    /// also applied to `entity` so it mirrors what was written.
    pub async fn update(&self, entity: &mut M, partial: Option<Document>) -> Result<ObjectId, ModelError> {
        if let Some(patch) = &partial {
            apply_patch(entity, patch)?;
        }
        let Some(id) = entity.id() else {
            return self.save(entity).await;
        };
        let mut patch = match partial {
            Some(patch) => patch,
            None => to_document(entity)?,
        };
        patch.remove(ID_FIELD);

        let outcome = self
            .store
            .update(M::COLLECTION, &id.query(), &patch, false)
            .await?;
        debug!(model = M::NAME, %id, matched = outcome.matched, "update result");
        if outcome.matched == 0 {
            return self.save(entity).await;
        }
        Ok(id)
    }

    /// Delete the stored document for `entity`; unsaved entities are a no-op.
    pub async fn remove(&self, entity: &M) -> Result<u64, ModelError> {
        match entity.id() {
            Some(id) => self.remove_entries(id.query()).await,
            None => Ok(0),
        }
    }

    /// Delete every document matching `query`.
    pub async fn remove_entries(&self, query: Document) -> Result<u64, ModelError> {
        let query = M::process_query(query);
        Ok(self.store.remove(M::COLLECTION, &query).await?)
    }

    /// Run `pipeline` and return the raw documents it yields.
    pub async fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<Document>, ModelError> {
        Ok(self.store.aggregate(M::COLLECTION, pipeline).await?)
    }
}

/// Serialise `entity`, dropping a null identifier.
pub fn to_document<M: Model>(entity: &M) -> Result<Document, ModelError> {
    let encode = |message: String| ModelError::Encode {
        model: M::NAME,
        message,
    };
    match serde_json::to_value(entity).map_err(|err| encode(err.to_string()))? {
        Value::Object(mut document) => {
            if document.get(ID_FIELD).is_some_and(Value::is_null) {
                document.remove(ID_FIELD);
            }
            Ok(document)
        }
        other => Err(encode(format!("expected an object, got {other}"))),
    }
}

/// Build an entity from a stored document.
///
/// Fields the model does not declare are dropped with a single warning per
/// document; they never fail the read.
pub fn make_model<M: Model>(mut document: Document, method: &str) -> Result<M, ModelError> {
    let declared = M::fields();
    let unexpected: Vec<String> = document
        .keys()
        .filter(|key| !declared.contains(&key.as_str()))
        .cloned()
        .collect();
    if !unexpected.is_empty() {
        warn!(
            model = M::NAME,
            method,
            fields = ?unexpected,
            "stored document has unhandled fields"
        );
        for key in &unexpected {
            document.remove(key);
        }
    }
    serde_json::from_value(Value::Object(document)).map_err(|err| ModelError::Decode {
        model: M::NAME,
        message: err.to_string(),
    })
}

fn apply_patch<M: Model>(entity: &mut M, patch: &Document) -> Result<(), ModelError> {
    let mut document = to_document(entity)?;
    for (field, value) in patch {
        if field != ID_FIELD {
            document.insert(field.clone(), value.clone());
        }
    }
    *entity = serde_json::from_value(Value::Object(document)).map_err(|err| ModelError::Decode {
        model: M::NAME,
        message: err.to_string(),
    })?;
    Ok(())
}
