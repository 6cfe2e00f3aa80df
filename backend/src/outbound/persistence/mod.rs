//! PostgreSQL persistence for the document store port.
//!
//! Diesel with `diesel-async` and a `bb8` pool. Row types and SQL stay inside
//! this module; the domain only sees [`crate::domain::ports::DocumentStore`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use calendio::outbound::persistence::{DbPool, PgDocumentStore, PoolConfig, run_migrations};
//!
//! # async fn connect() -> Result<(), Box<dyn std::error::Error>> {
//! let url = "postgres://localhost/calendio";
//! run_migrations(url).await?;
//! let pool = DbPool::new(PoolConfig::new(url)).await?;
//! let store = Arc::new(PgDocumentStore::new(pool));
//! # let _ = store;
//! # Ok(())
//! # }
//! ```

mod error_mapping;
mod migrations;
mod pg_document_store;
mod pool;

pub use migrations::run_migrations;
pub use pg_document_store::PgDocumentStore;
pub use pool::{DbPool, PoolConfig, PoolError};
