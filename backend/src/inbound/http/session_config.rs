//! Session cookie settings read from the environment.
//!
//! Debug builds fall back to permissive defaults with a warning. Release
//! builds insist on every toggle being present and valid, and on a session
//! key file of at least 64 bytes.

pub mod fingerprint;

use std::path::PathBuf;

use actix_session::config::{CookieContentSecurity, PersistentSession};
use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::{Key, SameSite, time::Duration};
use mockable::Env;
use tracing::{info, warn};
use zeroize::Zeroize;

use fingerprint::key_fingerprint;

const SESSION_KEY_DEFAULT_PATH: &str = "/var/run/secrets/session_key";
const SESSION_KEY_MIN_LEN: usize = 64;
/// Shortest master key `Key::derive_from` accepts.
const KEY_DERIVE_MIN_LEN: usize = 32;
const SESSION_COOKIE_NAME: &str = "session";
const COOKIE_SECURE_ENV: &str = "SESSION_COOKIE_SECURE";
const SAMESITE_ENV: &str = "SESSION_SAMESITE";
const ALLOW_EPHEMERAL_ENV: &str = "SESSION_ALLOW_EPHEMERAL";
const KEY_FILE_ENV: &str = "SESSION_KEY_FILE";
const BOOL_EXPECTED: &str = "1|0|true|false|yes|no|y|n";
const SAMESITE_EXPECTED: &str = "Strict|Lax|None";

/// Build mode for session configuration validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildMode {
    /// Missing or invalid toggles fall back to defaults.
    Debug,
    /// Every toggle must be set explicitly.
    Release,
}

impl BuildMode {
    /// Mode matching `cfg!(debug_assertions)`.
    #[must_use]
    pub fn from_debug_assertions() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Release
        }
    }

    fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }

    /// Use `fallback` in debug builds; fail with `error` in release builds.
    fn tolerate<T>(
        self,
        fallback: T,
        error: SessionConfigError,
        warning: impl FnOnce(),
    ) -> Result<T, SessionConfigError> {
        if self.is_debug() {
            warning();
            Ok(fallback)
        } else {
            Err(error)
        }
    }
}

/// Validated session cookie settings.
#[derive(Clone)]
pub struct SessionSettings {
    /// Signing and encryption key for cookie sessions.
    pub key: Key,
    /// Whether session cookies are marked `Secure`.
    pub cookie_secure: bool,
    /// `SameSite` policy for session cookies.
    pub same_site: SameSite,
}

impl SessionSettings {
    /// Short fingerprint of the active key, safe to log.
    pub fn fingerprint(&self) -> String {
        key_fingerprint(&self.key)
    }

    /// Cookie-backed session middleware whose sessions last `ttl_days`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use actix_web::cookie::{Key, SameSite};
    /// use calendio::inbound::http::session_config::SessionSettings;
    ///
    /// let settings = SessionSettings {
    ///     key: Key::generate(),
    ///     cookie_secure: false,
    ///     same_site: SameSite::Lax,
    /// };
    /// let _middleware = settings.middleware(30);
    /// ```
    pub fn middleware(&self, ttl_days: i64) -> SessionMiddleware<CookieSessionStore> {
        SessionMiddleware::builder(CookieSessionStore::default(), self.key.clone())
            .cookie_name(SESSION_COOKIE_NAME.to_owned())
            .cookie_path("/".to_owned())
            .cookie_secure(self.cookie_secure)
            .cookie_http_only(true)
            .cookie_content_security(CookieContentSecurity::Private)
            .cookie_same_site(self.same_site)
            .session_lifecycle(PersistentSession::default().session_ttl(Duration::days(ttl_days)))
            .build()
    }
}

/// Errors raised while validating session configuration.
#[derive(thiserror::Error, Debug)]
pub enum SessionConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {name}")]
    MissingEnv { name: &'static str },
    /// A variable is present but contains an invalid value.
    #[error("invalid value for {name}='{value}'; expected {expected}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    /// Reading the session key file failed.
    #[error("failed to read session key at {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The session key file is too short for release builds.
    #[error("session key at {path} too short: need >= {min_len} bytes, got {length}")]
    KeyTooShort {
        path: PathBuf,
        length: usize,
        min_len: usize,
    },
    /// `SameSite=None` without a secure cookie.
    #[error("SESSION_SAMESITE=None requires SESSION_COOKIE_SECURE=1")]
    InsecureSameSiteNone,
    /// Ephemeral keys were requested in a release build.
    #[error("SESSION_ALLOW_EPHEMERAL must be 0 in release builds")]
    EphemeralNotAllowed,
}

/// Build session settings from environment variables and build mode.
///
/// # Examples
///
/// ```rust
/// use calendio::inbound::http::session_config::{BuildMode, session_settings_from_env};
/// use mockable::MockEnv;
///
/// let mut env = MockEnv::new();
/// env.expect_string().returning(|name| match name {
///     "SESSION_COOKIE_SECURE" => Some("0".to_owned()),
///     "SESSION_SAMESITE" => Some("Lax".to_owned()),
///     _ => None,
/// });
///
/// let settings = session_settings_from_env(&env, BuildMode::Debug).expect("debug settings");
/// assert!(!settings.cookie_secure);
/// ```
pub fn session_settings_from_env<E: Env>(
    env: &E,
    mode: BuildMode,
) -> Result<SessionSettings, SessionConfigError> {
    let cookie_secure = bool_from_env(env, mode, COOKIE_SECURE_ENV, true)?;
    let same_site = same_site_from_env(env, mode, cookie_secure)?;
    let allow_ephemeral = bool_from_env(env, mode, ALLOW_EPHEMERAL_ENV, false)?;
    if allow_ephemeral && !mode.is_debug() {
        return Err(SessionConfigError::EphemeralNotAllowed);
    }
    let key = session_key_from_env(env, mode, allow_ephemeral)?;
    let settings = SessionSettings {
        key,
        cookie_secure,
        same_site,
    };
    info!(
        fingerprint = %settings.fingerprint(),
        cookie_secure,
        same_site = %same_site,
        "session settings loaded"
    );
    Ok(settings)
}

fn bool_from_env<E: Env>(
    env: &E,
    mode: BuildMode,
    name: &'static str,
    default: bool,
) -> Result<bool, SessionConfigError> {
    let Some(value) = env.string(name) else {
        return mode.tolerate(default, SessionConfigError::MissingEnv { name }, || {
            warn!(name, default, "session toggle not set; using default");
        });
    };
    match parse_bool(&value) {
        Some(flag) => Ok(flag),
        None => {
            let error = SessionConfigError::InvalidEnv {
                name,
                value: value.clone(),
                expected: BOOL_EXPECTED,
            };
            mode.tolerate(default, error, || {
                warn!(name, value = %value, default, "invalid session toggle; using default");
            })
        }
    }
}

fn same_site_from_env<E: Env>(
    env: &E,
    mode: BuildMode,
    cookie_secure: bool,
) -> Result<SameSite, SessionConfigError> {
    let default = if mode.is_debug() {
        SameSite::Lax
    } else {
        SameSite::Strict
    };
    let Some(value) = env.string(SAMESITE_ENV) else {
        return mode.tolerate(
            default,
            SessionConfigError::MissingEnv { name: SAMESITE_ENV },
            || warn!("SESSION_SAMESITE not set; using default"),
        );
    };
    match value.to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" if cookie_secure => Ok(SameSite::None),
        "none" => mode.tolerate(SameSite::None, SessionConfigError::InsecureSameSiteNone, || {
            warn!("SESSION_SAMESITE=None without a secure cookie; browsers may drop it");
        }),
        _ => {
            let error = SessionConfigError::InvalidEnv {
                name: SAMESITE_ENV,
                value: value.clone(),
                expected: SAMESITE_EXPECTED,
            };
            mode.tolerate(default, error, || {
                warn!(value = %value, "invalid SESSION_SAMESITE; using default");
            })
        }
    }
}

fn session_key_from_env<E: Env>(
    env: &E,
    mode: BuildMode,
    allow_ephemeral: bool,
) -> Result<Key, SessionConfigError> {
    let path = PathBuf::from(
        env.string(KEY_FILE_ENV)
            .unwrap_or_else(|| SESSION_KEY_DEFAULT_PATH.to_owned()),
    );
    match std::fs::read(&path) {
        Ok(mut bytes) => {
            let length = bytes.len();
            if !mode.is_debug() && length < SESSION_KEY_MIN_LEN {
                bytes.zeroize();
                return Err(SessionConfigError::KeyTooShort {
                    path,
                    length,
                    min_len: SESSION_KEY_MIN_LEN,
                });
            }
            if length < KEY_DERIVE_MIN_LEN {
                bytes.zeroize();
                warn!(
                    path = %path.display(),
                    length,
                    "session key too short to derive from; using temporary key (dev only)"
                );
                return Ok(Key::generate());
            }
            let key = Key::derive_from(&bytes);
            bytes.zeroize();
            Ok(key)
        }
        Err(error) if mode.is_debug() || allow_ephemeral => {
            warn!(
                path = %path.display(),
                error = %error,
                "using temporary session key (dev only)"
            );
            Ok(Key::generate())
        }
        Err(source) => Err(SessionConfigError::KeyRead { path, source }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}
