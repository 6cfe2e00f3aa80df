//! Embedded schema migrations applied at startup.

use diesel::{Connection, PgConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use crate::domain::ports::DocumentStoreError;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Apply every pending migration to `database_url`.
///
/// Diesel's migration harness is synchronous, so the work runs on the
/// blocking thread pool.
pub async fn run_migrations(database_url: &str) -> Result<(), DocumentStoreError> {
    let url = database_url.to_owned();
    tokio::task::spawn_blocking(move || {
        let mut connection = PgConnection::establish(&url)
            .map_err(|err| DocumentStoreError::connection(err.to_string()))?;
        let applied = connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|err| DocumentStoreError::query(format!("migration failed: {err}")))?;
        info!(applied = applied.len(), "database migrations applied");
        Ok(())
    })
    .await
    .map_err(|err| DocumentStoreError::query(format!("migration task failed: {err}")))?
}
