//! Schemaless documents and the identifiers the store assigns to them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A stored document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Field holding the store-assigned identifier.
pub const ID_FIELD: &str = "_id";

/// Opaque identifier assigned by the document store.
///
/// Serialised as a hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Read the identifier stored under [`ID_FIELD`], if well formed.
    pub fn from_document(document: &Document) -> Option<Self> {
        document
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
    }

    /// Query matching exactly the document with this identifier.
    pub fn query(&self) -> Document {
        let mut query = Document::new();
        query.insert(ID_FIELD.to_owned(), Value::String(self.to_string()));
        query
    }
}

impl From<Uuid> for ObjectId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Equality match of `query` against the top-level fields of `document`.
///
/// A field missing from the document compares equal to `null`, so
/// `{"phone": null}` matches documents with no phone at all.
pub fn matches(document: &Document, query: &Document) -> bool {
    query.iter().all(|(field, expected)| {
        let actual = document.get(field).unwrap_or(&Value::Null);
        actual == expected
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("fixture must be an object, got {other}"),
        }
    }

    #[rstest]
    #[case(json!({}), true)]
    #[case(json!({"email": "a@x.com"}), true)]
    #[case(json!({"email": "b@x.com"}), false)]
    #[case(json!({"phone": null}), true)]
    #[case(json!({"email": "a@x.com", "name": "A"}), true)]
    #[case(json!({"email": "a@x.com", "name": "B"}), false)]
    fn equality_queries(#[case] query: Value, #[case] expected: bool) {
        let document = doc(json!({"email": "a@x.com", "name": "A"}));
        assert_eq!(matches(&document, &doc(query)), expected);
    }

    #[rstest]
    fn identifiers_round_trip_through_documents() {
        let id = ObjectId::generate();
        let query = id.query();
        assert_eq!(ObjectId::from_document(&query), Some(id));
        assert_eq!(ObjectId::from_document(&doc(json!({"_id": 7}))), None);
    }
}
