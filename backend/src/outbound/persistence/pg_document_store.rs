//! PostgreSQL-backed document store.
//!
//! All collections share the `documents` table. Queries become JSONB
//! containment on the non-null fields plus an explicit check that every
//! null-valued query field is absent or null. Unique indexes are partial
//! expression indexes on `body ->> field`, one per collection and field.

use async_trait::async_trait;
use diesel::sql_query;
use diesel::sql_types::{Array, BigInt, Jsonb, Text, Uuid as SqlUuid};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::document::{Document, ID_FIELD, ObjectId};
use crate::domain::ports::{DocumentStore, DocumentStoreError, IndexSpec, UpdateOutcome};
use crate::outbound::pipeline;

use super::error_mapping::{map_diesel_error, unique_index_name};
use super::pool::DbPool;

const MATCHING: &str = "collection = $1 AND body @> $2 AND NOT EXISTS (\
     SELECT 1 FROM unnest($3::text[]) AS absent(name) \
     WHERE body -> absent.name IS NOT NULL AND body -> absent.name <> 'null'::jsonb)";

#[derive(QueryableByName)]
struct BodyRow {
    #[diesel(sql_type = Jsonb)]
    body: Value,
}

#[derive(QueryableByName)]
struct IdRow {
    #[diesel(sql_type = SqlUuid)]
    id: Uuid,
}

/// A query split into its containment document and its null-valued fields.
#[derive(Debug, PartialEq)]
struct Filter {
    contains: Value,
    absent: Vec<String>,
}

impl Filter {
    fn from_query(query: &Document) -> Self {
        let mut contains = Document::new();
        let mut absent = Vec::new();
        for (field, value) in query {
            if value.is_null() {
                absent.push(field.clone());
            } else {
                contains.insert(field.clone(), value.clone());
            }
        }
        Self {
            contains: Value::Object(contains),
            absent,
        }
    }
}

/// Reject names that cannot be spliced into DDL verbatim.
fn sql_identifier<'a>(kind: &str, raw: &'a str) -> Result<&'a str, DocumentStoreError> {
    let valid = !raw.is_empty() && raw.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        Ok(raw)
    } else {
        Err(DocumentStoreError::query(format!("invalid {kind} name {raw:?}")))
    }
}

fn into_document(row: BodyRow) -> Result<Document, DocumentStoreError> {
    match row.body {
        Value::Object(document) => Ok(document),
        other => Err(DocumentStoreError::query(format!(
            "stored body is not an object: {other}"
        ))),
    }
}

fn with_id(mut document: Document, id: ObjectId) -> Value {
    document.insert(ID_FIELD.to_owned(), Value::String(id.to_string()));
    Value::Object(document)
}

/// [`DocumentStore`] over PostgreSQL JSONB.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: DbPool,
}

impl PgDocumentStore {
    /// Store using connections from `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn select(
        &self,
        collection: &str,
        query: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, DocumentStoreError> {
        let filter = Filter::from_query(query);
        let limit = limit.map_or(i64::MAX, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
        let mut conn = self.pool.get().await?;
        let rows: Vec<BodyRow> = sql_query(format!(
            "SELECT body FROM documents WHERE {MATCHING} ORDER BY seq LIMIT $4"
        ))
        .bind::<Text, _>(collection)
        .bind::<Jsonb, _>(&filter.contains)
        .bind::<Array<Text>, _>(&filter.absent)
        .bind::<BigInt, _>(limit)
        .load(&mut conn)
        .await
        .map_err(|err| map_diesel_error(err, collection))?;
        rows.into_iter().map(into_document).collect()
    }

    async fn insert_body(
        &self,
        collection: &str,
        id: ObjectId,
        body: &Value,
    ) -> Result<(), DocumentStoreError> {
        let mut conn = self.pool.get().await?;
        sql_query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind::<Text, _>(collection)
            .bind::<SqlUuid, _>(id.as_uuid())
            .bind::<Jsonb, _>(body)
            .execute(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, collection))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        query: &Document,
    ) -> Result<Option<Document>, DocumentStoreError> {
        Ok(self.select(collection, query, Some(1)).await?.into_iter().next())
    }

    async fn find(
        &self,
        collection: &str,
        query: &Document,
        limit: usize,
    ) -> Result<Vec<Document>, DocumentStoreError> {
        self.select(collection, query, Some(limit)).await
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
        self.insert_body(collection, id, &with_id(document, id)).await?;
        debug!(collection, %id, "inserted document");
        Ok(id)
    }

    async fn replace(
        &self,
        collection: &str,
        id: ObjectId,
        document: Document,
    ) -> Result<(), DocumentStoreError> {
        let body = with_id(document, id);
        let mut conn = self.pool.get().await?;
        sql_query(
            "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body",
        )
        .bind::<Text, _>(collection)
        .bind::<SqlUuid, _>(id.as_uuid())
        .bind::<Jsonb, _>(&body)
        .execute(&mut conn)
        .await
        .map_err(|err| map_diesel_error(err, collection))?;
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, DocumentStoreError> {
        let filter = Filter::from_query(query);
        let mut patch = patch.clone();
        patch.remove(ID_FIELD);
        let patch = Value::Object(patch);

        let updated: Vec<IdRow> = {
            let mut conn = self.pool.get().await?;
            sql_query(format!(
                "UPDATE documents SET body = body || $4 WHERE collection = $1 AND id = (\
                 SELECT id FROM documents WHERE {MATCHING} ORDER BY seq LIMIT 1) RETURNING id"
            ))
            .bind::<Text, _>(collection)
            .bind::<Jsonb, _>(&filter.contains)
            .bind::<Array<Text>, _>(&filter.absent)
            .bind::<Jsonb, _>(&patch)
            .load(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, collection))?
        };
        if let Some(row) = updated.into_iter().next() {
            debug!(collection, id = %row.id, "merged document");
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
        if let Value::Object(fields) = patch {
            created.extend(fields);
        }
        self.insert_body(collection, id, &with_id(created, id)).await?;
        Ok(UpdateOutcome {
            matched: 0,
            upserted: Some(id),
        })
    }

    async fn remove(&self, collection: &str, query: &Document) -> Result<u64, DocumentStoreError> {
        let filter = Filter::from_query(query);
        let mut conn = self.pool.get().await?;
        let removed = sql_query(format!("DELETE FROM documents WHERE {MATCHING}"))
            .bind::<Text, _>(collection)
            .bind::<Jsonb, _>(&filter.contains)
            .bind::<Array<Text>, _>(&filter.absent)
            .execute(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, collection))?;
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<(), DocumentStoreError> {
        let table = sql_identifier("collection", collection)?;
        let field = sql_identifier("field", &index.field)?;
        let statement = if index.unique {
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {name} ON documents ((body ->> '{field}')) \
                 WHERE collection = '{table}'",
                name = unique_index_name(table, field),
            )
        } else {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{field} ON documents ((body ->> '{field}')) \
                 WHERE collection = '{table}'"
            )
        };
        let mut conn = self.pool.get().await?;
        sql_query(statement)
            .execute(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, collection))?;
        info!(collection, field, unique = index.unique, "index ensured");
        Ok(())
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, DocumentStoreError> {
        let (query, rest) = pipeline::split_leading_match(pipeline);
        let documents = self.select(collection, &query, None).await?;
        pipeline::evaluate(documents, rest)
    }
}
