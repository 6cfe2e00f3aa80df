//! bb8 pool of async Diesel PostgreSQL connections backing the document store.

use std::time::Duration;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use tracing::debug;

use crate::domain::ports::{DocumentStoreError, define_port_error};

const DEFAULT_MAX_SIZE: u32 = 10;
const DEFAULT_MIN_IDLE: u32 = 2;
const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

define_port_error! {
    /// Pool construction and checkout failures.
    pub enum PoolError {
        /// No connection freed up before the checkout timeout.
        Checkout { message: String } => "no pooled connection within the checkout timeout: {message}",
        /// The pool could not start.
        Build { message: String } => "connection pool could not start: {message}",
    }
}

impl From<PoolError> for DocumentStoreError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::Checkout { message } | PoolError::Build { message } => Self::connection(message),
        }
    }
}

/// Connection limits for the accounts database.
///
/// Defaults: 10 connections, 2 kept idle, 30 second checkout timeout. The
/// checkout timeout is the only request-path timeout the store applies.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use calendio::outbound::persistence::PoolConfig;
///
/// let config = PoolConfig::new("postgres://localhost/calendio")
///     .with_max_size(4)
///     .with_connection_timeout(Duration::from_secs(5));
/// assert_eq!(config.max_size(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    database_url: String,
    max_size: u32,
    min_idle: Option<u32>,
    connection_timeout: Duration,
}

impl PoolConfig {
    /// Configuration for `database_url` with default limits.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_size: DEFAULT_MAX_SIZE,
            min_idle: Some(DEFAULT_MIN_IDLE),
            connection_timeout: DEFAULT_CHECKOUT_TIMEOUT,
        }
    }

    /// Cap the number of open connections.
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    /// Number of idle connections kept warm.
    pub fn with_min_idle(mut self, min_idle: Option<u32>) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// How long a checkout may wait for a free connection.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Database URL.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Maximum pool size.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Checkout timeout.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }
}

/// Shared handle to the pool behind [`super::PgDocumentStore`].
#[derive(Clone)]
pub struct DbPool {
    inner: Pool<AsyncPgConnection>,
}

impl DbPool {
    /// Build the pool.
    ///
    /// # Errors
    ///
    /// [`PoolError::Build`] when the manager cannot be set up.
    pub async fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.database_url);
        debug!(max_size = config.max_size, timeout = ?config.connection_timeout, "building pool");

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|err| PoolError::build(err.to_string()))?;

        Ok(Self { inner: pool })
    }

    /// Check out a connection.
    ///
    /// # Errors
    ///
    /// [`PoolError::Checkout`] when none frees up within the timeout.
    pub async fn get(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, PoolError> {
        self.inner
            .get()
            .await
            .map_err(|err| PoolError::checkout(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn a_bare_url_gets_the_default_limits() {
        let config = PoolConfig::new("postgres://localhost/calendio");

        assert_eq!(config.database_url(), "postgres://localhost/calendio");
        assert_eq!(config.max_size(), 10);
        assert_eq!(config.min_idle, Some(2));
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
    }

    #[rstest]
    fn pool_failures_become_connection_errors() {
        let error = DocumentStoreError::from(PoolError::checkout("timed out"));

        assert!(matches!(error, DocumentStoreError::Connection { .. }));
        assert!(error.to_string().contains("timed out"));
    }
}
