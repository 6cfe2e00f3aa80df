//! Authentication guards evaluated before page handlers.
//!
//! A guard inspects the session principal and either lets the operation run
//! or answers with a redirect. [`guarded`] takes the operation as an unpolled
//! future, so a refused operation never starts.

use std::future::Future;

use actix_web::http::Method;
use actix_web::{HttpRequest, HttpResponse};
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::domain::{ApiResult, Principal};

use super::render::redirect;
use super::routes::{INDEX, LOGIN, reverse_url};

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Run the guarded operation.
    Proceed,
    /// Skip it and redirect to this location.
    Redirect(String),
}

/// Pre-condition on the authentication state of a request.
pub trait Guard {
    /// Decide whether the request may proceed.
    fn check(&self, principal: Option<&Principal>, req: &HttpRequest) -> GuardDecision;
}

fn resolve(route: &str) -> String {
    match reverse_url(route) {
        Some(path) => path.to_owned(),
        None => {
            warn!(route, "guard redirect names an unknown route");
            "/".to_owned()
        }
    }
}

/// Only anonymous visitors may proceed; signed-in users are sent away.
#[derive(Debug, Clone, Copy)]
pub struct AnonymousOnly {
    redirect_to: &'static str,
}

impl AnonymousOnly {
    /// Redirect signed-in users to the route named `redirect_to`.
    pub const fn redirect_to(redirect_to: &'static str) -> Self {
        Self { redirect_to }
    }
}

impl Default for AnonymousOnly {
    fn default() -> Self {
        Self::redirect_to(INDEX)
    }
}

impl Guard for AnonymousOnly {
    fn check(&self, principal: Option<&Principal>, _req: &HttpRequest) -> GuardDecision {
        match principal {
            Some(principal) => {
                debug!(principal = %principal, "already signed in");
                GuardDecision::Redirect(resolve(self.redirect_to))
            }
            None => GuardDecision::Proceed,
        }
    }
}

/// Only signed-in users may proceed; anonymous visitors go to login.
///
/// `GET` requests carry their own path as `?next=` so login can send the
/// user back.
#[derive(Debug, Clone, Copy)]
pub struct RequireAuthenticated {
    redirect_to: &'static str,
}

impl RequireAuthenticated {
    /// Redirect anonymous visitors to the route named `redirect_to`.
    pub const fn redirect_to(redirect_to: &'static str) -> Self {
        Self { redirect_to }
    }
}

impl Default for RequireAuthenticated {
    fn default() -> Self {
        Self::redirect_to(LOGIN)
    }
}

impl Guard for RequireAuthenticated {
    fn check(&self, principal: Option<&Principal>, req: &HttpRequest) -> GuardDecision {
        if principal.is_some() {
            return GuardDecision::Proceed;
        }
        let mut location = resolve(self.redirect_to);
        if req.method() == Method::GET {
            let next = req
                .uri()
                .path_and_query()
                .map_or_else(|| req.path().to_owned(), |pq| pq.as_str().to_owned());
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair("next", &next)
                .finish();
            location.push(if location.contains('?') { '&' } else { '?' });
            location.push_str(&query);
        }
        debug!(location = %location, "authentication required");
        GuardDecision::Redirect(location)
    }
}

/// Run `operation` only if `guard` lets the request through.
pub async fn guarded<G, Fut>(
    guard: &G,
    principal: Option<&Principal>,
    req: &HttpRequest,
    operation: Fut,
) -> ApiResult<HttpResponse>
where
    G: Guard,
    Fut: Future<Output = ApiResult<HttpResponse>>,
{
    match guard.check(principal, req) {
        GuardDecision::Proceed => operation.await,
        GuardDecision::Redirect(location) => Ok(redirect(&location)),
    }
}
