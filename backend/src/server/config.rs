//! HTTP server configuration object.

use std::net::SocketAddr;

use calendio::inbound::http::HttpState;
use calendio::inbound::http::session_config::SessionSettings;

/// Everything the server needs once startup checks have passed.
pub struct ServerConfig {
    pub(crate) http_state: HttpState,
    pub(crate) session: SessionSettings,
    pub(crate) session_ttl_days: i64,
    pub(crate) bind_addr: SocketAddr,
}

impl ServerConfig {
    /// Configuration serving `http_state` on `bind_addr`.
    #[must_use]
    pub fn new(http_state: HttpState, session: SessionSettings, bind_addr: SocketAddr) -> Self {
        Self {
            http_state,
            session,
            session_ttl_days: 30,
            bind_addr,
        }
    }

    /// Session cookie lifetime.
    #[must_use]
    pub fn with_session_ttl_days(mut self, days: i64) -> Self {
        self.session_ttl_days = days;
        self
    }
}
