//! Server-side session records.
//!
//! The session cookie carries only an opaque session id. The principal it
//! stands for lives in the `sessions` collection, so deleting the record
//! ends the session for every copy of the cookie.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::Error;
use super::document::{Document, ObjectId};
use super::model::{Collection, Model};
use super::ports::{DocumentStore, IndexSpec};
use super::user::Principal;

/// Lifetime of a session record unless configured otherwise.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 30;

const FIELDS: &[&str] = &["_id", "sid", "principal", "created_at"];

/// Opaque key naming one server-side session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh random id.
    pub fn generate() -> Self {
        Self(format!("{:032x}", rand::thread_rng().r#gen::<u128>()))
    }

    /// Wrap an id read back from a cookie.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    fn query(&self) -> Document {
        let mut query = Document::new();
        query.insert("sid".to_owned(), Value::String(self.0.clone()));
        query
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One signed-in session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    sid: SessionId,
    principal: Principal,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl SessionRecord {
    fn new(sid: SessionId, principal: Principal) -> Self {
        Self {
            id: None,
            sid,
            principal,
            created_at: Utc::now(),
        }
    }
}

impl Model for SessionRecord {
    const COLLECTION: &'static str = "sessions";
    const NAME: &'static str = "Session";

    fn fields() -> &'static [&'static str] {
        FIELDS
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![IndexSpec::unique("sid")]
    }

    fn id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }
}

/// Opens, resolves and closes server-side sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    records: Collection<SessionRecord>,
    ttl: Duration,
}

impl SessionRegistry {
    /// Registry backed by `store` with the default lifetime.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            records: Collection::new(store),
            ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
        }
    }

    /// Replace the record lifetime.
    #[must_use]
    pub fn with_ttl_days(mut self, days: i64) -> Self {
        self.ttl = Duration::days(days);
        self
    }

    /// Create the unique `sid` index.
    pub async fn ensure_indexes(&self) -> Result<(), Error> {
        Ok(self.records.ensure_indexes().await?)
    }

    /// Start a session for `principal`.
    pub async fn open(&self, principal: &Principal) -> Result<SessionId, Error> {
        let mut record = SessionRecord::new(SessionId::generate(), principal.clone());
        self.records.insert(&mut record).await?;
        debug!(principal = %principal, "session opened");
        Ok(record.sid)
    }

    /// Principal behind `sid`, or `None` once the session is closed or stale.
    pub async fn resolve(&self, sid: &SessionId) -> Result<Option<Principal>, Error> {
        let Some(record) = self.records.find_one(sid.query()).await? else {
            return Ok(None);
        };
        if record.created_at + self.ttl <= Utc::now() {
            debug!("stale session record dropped");
            self.records.remove(&record).await?;
            return Ok(None);
        }
        Ok(Some(record.principal).filter(|principal| !principal.as_ref().trim().is_empty()))
    }

    /// End the session named by `sid`.
    pub async fn close(&self, sid: &SessionId) -> Result<(), Error> {
        let removed = self.records.remove_entries(sid.query()).await?;
        debug!(removed, "session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::to_document;
    use crate::domain::ports::MockDocumentStore;
    use crate::outbound::memory::InMemoryDocumentStore;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(InMemoryDocumentStore::new()))
    }

    #[rstest]
    #[tokio::test]
    async fn opened_sessions_resolve_until_closed(registry: SessionRegistry) {
        let ada = Principal::new("ada@example.com");
        let sid = registry.open(&ada).await.expect("open");

        assert_eq!(registry.resolve(&sid).await.expect("resolve"), Some(ada));

        registry.close(&sid).await.expect("close");
        assert_eq!(registry.resolve(&sid).await.expect("resolve"), None);
    }

    #[rstest]
    #[tokio::test]
    async fn each_sign_in_gets_its_own_id(registry: SessionRegistry) {
        let ada = Principal::new("ada@example.com");
        let first = registry.open(&ada).await.expect("open");
        let second = registry.open(&ada).await.expect("open");
        assert_ne!(first, second);

        registry.close(&first).await.expect("close");
        assert!(registry.resolve(&second).await.expect("resolve").is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_ids_are_anonymous(registry: SessionRegistry) {
        let resolved = registry
            .resolve(&SessionId::new("0123456789abcdef"))
            .await
            .expect("resolve");
        assert!(resolved.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn stale_records_are_dropped() {
        let mut store = MockDocumentStore::new();
        store
            .expect_find_one()
            .withf(|collection, query| collection == "sessions" && query.contains_key("sid"))
            .return_once(|_, _| {
                let mut record = SessionRecord::new(SessionId::new("old"), Principal::new("ada@example.com"));
                record.created_at = Utc::now() - Duration::days(2);
                record.set_id(ObjectId::generate());
                Ok(Some(to_document(&record).expect("encode record")))
            });
        store
            .expect_remove()
            .withf(|collection, _| collection == "sessions")
            .times(1)
            .return_once(|_, _| Ok(1));
        let registry = SessionRegistry::new(Arc::new(store)).with_ttl_days(1);

        let resolved = registry.resolve(&SessionId::new("old")).await.expect("resolve");

        assert!(resolved.is_none());
    }

    #[rstest]
    fn records_store_the_id_and_principal() {
        let record = SessionRecord::new(SessionId::new("abc"), Principal::new("ada@example.com"));
        let document = to_document(&record).expect("encode record");
        assert_eq!(document.get("sid"), Some(&json!("abc")));
        assert_eq!(document.get("principal"), Some(&json!("ada@example.com")));
    }
}
