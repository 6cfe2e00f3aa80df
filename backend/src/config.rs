//! Application settings loaded via OrthoConfig.
//!
//! Values come from `CALENDIO_*` environment variables, CLI flags and
//! configuration files, in OrthoConfig's usual precedence. Unset optional
//! values fall back to the defaults exposed by the accessors.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::sessions::DEFAULT_SESSION_TTL_DAYS;
use crate::inbound::http::PageSettings;
use crate::outbound::persistence::PoolConfig;

const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_STATIC_URL: &str = "/static/";

fn default_template_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates")
}

/// Server, storage and page settings.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "CALENDIO")]
pub struct AppSettings {
    /// Interface to listen on.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Verbose logging and development conveniences; on unless disabled.
    pub debug: Option<bool>,
    /// PostgreSQL URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Directory holding page templates.
    pub template_path: Option<PathBuf>,
    /// URL prefix for static assets.
    pub static_url: Option<String>,
    /// Require the `_xsrf` token on form submissions; on unless disabled.
    pub xsrf_cookies: Option<bool>,
    /// Session lifetime in days, for both the cookie and the server record.
    pub session_ttl_days: Option<i64>,
    /// Upper bound on pooled database connections.
    pub db_max_connections: Option<u32>,
    /// Seconds a request may wait for a pooled connection.
    pub db_checkout_timeout_secs: Option<u64>,
}

impl AppSettings {
    /// Socket address to bind.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.host.unwrap_or(DEFAULT_HOST),
            self.port.unwrap_or(DEFAULT_PORT),
        )
    }

    /// Template directory, defaulting to the crate's `templates/`.
    pub fn template_path(&self) -> PathBuf {
        self.template_path
            .clone()
            .unwrap_or_else(default_template_path)
    }

    /// Whether debug conveniences are enabled.
    pub fn debug(&self) -> bool {
        self.debug.unwrap_or(true)
    }

    /// Whether form submissions must carry the `_xsrf` token.
    pub fn xsrf_cookies(&self) -> bool {
        self.xsrf_cookies.unwrap_or(true)
    }

    /// Static asset prefix.
    pub fn static_url(&self) -> &str {
        self.static_url.as_deref().unwrap_or(DEFAULT_STATIC_URL)
    }

    /// Session lifetime in days; non-positive values use the default.
    pub fn session_ttl_days(&self) -> i64 {
        self.session_ttl_days
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_SESSION_TTL_DAYS)
    }

    /// Pool limits for the configured database, if any.
    pub fn pool_config(&self) -> Option<PoolConfig> {
        let url = self.database_url.as_deref()?;
        let mut config = PoolConfig::new(url);
        if let Some(max) = self.db_max_connections.filter(|max| *max > 0) {
            config = config.with_max_size(max).with_min_idle(Some(max.min(2)));
        }
        if let Some(secs) = self.db_checkout_timeout_secs.filter(|secs| *secs > 0) {
            config = config.with_connection_timeout(Duration::from_secs(secs));
        }
        Some(config)
    }

    /// Settings shared by every rendered page.
    pub fn pages(&self) -> PageSettings {
        PageSettings {
            static_url: self.static_url().to_owned(),
            xsrf_cookies: self.xsrf_cookies(),
        }
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.debug() { "debug" } else { "info" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 10] = [
        "CALENDIO_HOST",
        "CALENDIO_PORT",
        "CALENDIO_DEBUG",
        "CALENDIO_DATABASE_URL",
        "CALENDIO_TEMPLATE_PATH",
        "CALENDIO_STATIC_URL",
        "CALENDIO_XSRF_COOKIES",
        "CALENDIO_SESSION_TTL_DAYS",
        "CALENDIO_DB_MAX_CONNECTIONS",
        "CALENDIO_DB_CHECKOUT_TIMEOUT_SECS",
    ];

    fn load() -> AppSettings {
        AppSettings::load_from_iter([OsString::from("calendio")]).expect("config should load")
    }

    #[rstest]
    fn defaults_apply_when_nothing_is_set() {
        let _guard = lock_env(VARS.map(|name| (name, None::<String>)));

        let settings = load();

        assert_eq!(settings.bind_addr(), "0.0.0.0:8000".parse().expect("addr"));
        assert!(settings.debug());
        assert!(settings.xsrf_cookies());
        assert!(settings.database_url.is_none());
        assert!(settings.pool_config().is_none());
        assert_eq!(settings.template_path(), default_template_path());
        assert_eq!(settings.pages(), PageSettings::default());
        assert_eq!(settings.session_ttl_days(), 30);
        assert_eq!(settings.log_filter(), "debug");
    }

    #[rstest]
    #[case("true", true)]
    #[case("false", false)]
    fn boolean_flags_follow_the_environment(#[case] raw: &str, #[case] expected: bool) {
        let mut vars = VARS.map(|name| (name, None::<String>));
        for entry in &mut vars {
            if entry.0 == "CALENDIO_DEBUG" || entry.0 == "CALENDIO_XSRF_COOKIES" {
                entry.1 = Some(raw.to_owned());
            }
        }
        let _guard = lock_env(vars);

        let settings = load();

        assert_eq!(settings.debug(), expected);
        assert_eq!(settings.xsrf_cookies(), expected);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            ("CALENDIO_HOST", Some("127.0.0.1".to_owned())),
            ("CALENDIO_PORT", Some("9000".to_owned())),
            ("CALENDIO_DEBUG", Some("false".to_owned())),
            (
                "CALENDIO_DATABASE_URL",
                Some("postgres://localhost/calendio".to_owned()),
            ),
            ("CALENDIO_TEMPLATE_PATH", Some("/srv/templates".to_owned())),
            ("CALENDIO_STATIC_URL", Some("/assets/".to_owned())),
            ("CALENDIO_XSRF_COOKIES", Some("false".to_owned())),
            ("CALENDIO_SESSION_TTL_DAYS", Some("7".to_owned())),
            ("CALENDIO_DB_MAX_CONNECTIONS", Some("1".to_owned())),
            ("CALENDIO_DB_CHECKOUT_TIMEOUT_SECS", Some("5".to_owned())),
        ]);

        let settings = load();

        assert_eq!(settings.bind_addr(), "127.0.0.1:9000".parse().expect("addr"));
        assert!(!settings.debug());
        assert_eq!(settings.log_filter(), "info");
        assert_eq!(
            settings.database_url.as_deref(),
            Some("postgres://localhost/calendio")
        );
        assert_eq!(settings.template_path(), PathBuf::from("/srv/templates"));
        assert_eq!(settings.static_url(), "/assets/");
        assert!(!settings.xsrf_cookies());
        assert!(!settings.pages().xsrf_cookies);
        assert_eq!(settings.session_ttl_days(), 7);
        let pool = settings.pool_config().expect("database configured");
        assert_eq!(pool.database_url(), "postgres://localhost/calendio");
        assert_eq!(pool.max_size(), 1);
        assert_eq!(pool.connection_timeout(), Duration::from_secs(5));
    }
}
