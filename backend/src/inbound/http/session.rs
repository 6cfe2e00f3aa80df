//! Session helpers to keep HTTP handlers free of framework-specific logic.
//!
//! The session cookie holds two entries: `sid`, the opaque id of a
//! server-side session record, and `_xsrf`, the anti-forgery token minted on
//! first use. The principal itself only lives in the record.

use actix_session::Session;
use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use futures_util::future::LocalBoxFuture;
use rand::Rng;
use tracing::{debug, warn};

use crate::domain::{Error, Principal, SessionId, SessionRegistry};

use super::state::HttpState;

pub(crate) const SID_KEY: &str = "sid";
pub(crate) const XSRF_KEY: &str = "_xsrf";

fn read_error(error: impl std::fmt::Display) -> Error {
    Error::internal(format!("failed to read session: {error}"))
}

fn write_error(error: impl std::fmt::Display) -> Error {
    Error::internal(format!("failed to persist session: {error}"))
}

/// Anti-forgery token stored in `session`, minted on first use.
pub(crate) fn xsrf_token(session: &Session) -> Result<String, Error> {
    let existing = session.get::<String>(XSRF_KEY).map_err(read_error)?;
    if let Some(token) = existing.filter(|token| !token.is_empty()) {
        return Ok(token);
    }
    let token = format!("{:032x}", rand::thread_rng().r#gen::<u128>());
    session.insert(XSRF_KEY, &token).map_err(write_error)?;
    Ok(token)
}

/// Newtype wrapper that exposes higher-level session operations.
#[derive(Clone)]
pub struct SessionContext {
    session: Session,
    registry: SessionRegistry,
}

impl SessionContext {
    /// Construct a new wrapper from the underlying Actix session and the
    /// registry holding session records.
    pub fn new(session: Session, registry: SessionRegistry) -> Self {
        Self { session, registry }
    }

    fn session_id(&self) -> Result<Option<SessionId>, Error> {
        match self.session.get::<String>(SID_KEY).map_err(read_error)? {
            Some(raw) if raw.trim().is_empty() => {
                warn!("blank session id in cookie");
                Ok(None)
            }
            Some(raw) => Ok(Some(SessionId::new(raw))),
            None => Ok(None),
        }
    }

    /// Principal stored by the last login or signup.
    ///
    /// A cookie whose record was closed or expired is anonymous.
    pub async fn current_principal(&self) -> Result<Option<Principal>, Error> {
        let Some(sid) = self.session_id()? else {
            return Ok(None);
        };
        let principal = self.registry.resolve(&sid).await?;
        if principal.is_none() {
            debug!("cookie names a closed session");
            self.session.remove(SID_KEY);
        }
        Ok(principal)
    }

    /// Mark the session as authenticated for `principal`.
    ///
    /// Any previous record is closed and the cookie is renewed, so neither a
    /// pre-login cookie nor an older signed-in one can be replayed.
    pub async fn set_session(&self, principal: &Principal) -> Result<(), Error> {
        if let Some(previous) = self.session_id()? {
            self.registry.close(&previous).await?;
        }
        let sid = self.registry.open(principal).await?;
        self.session.renew();
        self.session.insert(SID_KEY, sid.as_ref()).map_err(write_error)?;
        debug!(principal = %principal, "session authenticated");
        Ok(())
    }

    /// Close the server-side session and forget its id.
    pub async fn clear_session(&self) -> Result<(), Error> {
        if let Some(sid) = self.session_id()? {
            self.registry.close(&sid).await?;
        }
        if self.session.remove(SID_KEY).is_some() {
            debug!("session cleared");
        }
        Ok(())
    }

    /// Anti-forgery token for this session, minted on first use.
    pub fn xsrf_token(&self) -> Result<String, Error> {
        xsrf_token(&self.session)
    }
}

impl FromRequest for SessionContext {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let registry = req
            .app_data::<web::Data<HttpState>>()
            .map(|state| state.accounts.sessions().clone());
        let fut = Session::from_request(req, payload);
        Box::pin(async move {
            let session = fut.await?;
            let registry = registry.ok_or_else(|| Error::internal("HTTP state is not configured"))?;
            Ok(SessionContext::new(session, registry))
        })
    }
}
