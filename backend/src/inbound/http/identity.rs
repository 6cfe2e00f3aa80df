//! Identity of the user behind a request.
//!
//! The principal is resolved from the server-side session record when the
//! request is extracted. The full account document is loaded on first use
//! and cached for the rest of the request.

use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use futures_util::future::LocalBoxFuture;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::domain::{AccountService, Error, Principal, User};

use super::session::SessionContext;
use super::state::HttpState;

/// Per-request view of who is signed in.
pub struct RequestIdentity {
    session: SessionContext,
    accounts: AccountService,
    principal: Option<Principal>,
    user: OnceCell<Option<User>>,
}

impl RequestIdentity {
    /// Identity for `principal`, resolved against `accounts`.
    pub fn new(session: SessionContext, accounts: AccountService, principal: Option<Principal>) -> Self {
        Self {
            session,
            accounts,
            principal,
            user: OnceCell::new(),
        }
    }

    /// Principal of the live session, if any.
    pub fn current_principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Account the principal refers to.
    ///
    /// The lookup runs at most once per request. A principal whose account
    /// no longer exists resolves to `None`.
    pub async fn current_user_object(&self) -> Result<Option<&User>, Error> {
        let Some(principal) = self.principal.as_ref() else {
            return Ok(None);
        };
        let user = self
            .user
            .get_or_try_init(|| async {
                let found = self.accounts.find_by_principal(principal).await?;
                if found.is_none() {
                    warn!(principal = %principal, "session principal has no account");
                }
                Ok::<_, Error>(found)
            })
            .await?;
        Ok(user.as_ref())
    }

    /// Session this identity was read from.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }
}

impl FromRequest for RequestIdentity {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<HttpState>>().cloned();
        let session = SessionContext::from_request(req, payload);
        Box::pin(async move {
            let session = session.await?;
            let state = state.ok_or_else(|| Error::internal("HTTP state is not configured"))?;
            let principal = session.current_principal().await?;
            Ok(RequestIdentity::new(session, state.accounts.clone(), principal))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::ObjectId;
    use crate::domain::model::to_document;
    use crate::domain::ports::{MockDocumentStore, MockTemplateRenderer};
    use crate::inbound::http::test_utils::{session_cookie, test_session_middleware};
    use crate::outbound::memory::InMemoryDocumentStore;
    use actix_web::{App, HttpResponse, test};
    use serde_json::json;
    use std::sync::Arc;

    #[actix_web::test]
    async fn user_object_is_loaded_once_and_cached() {
        let mut store = MockDocumentStore::new();
        store
            .expect_insert()
            .withf(|collection, _| collection == "sessions")
            .returning(|_, _| Ok(ObjectId::generate()));
        store
            .expect_find_one()
            .times(1)
            .withf(|collection, query| collection == "sessions" && query.contains_key("sid"))
            .returning(|_, _| Ok(json!({"sid": "s1", "principal": "ada@example.com"}).as_object().cloned()));
        store
            .expect_find_one()
            .times(1)
            .withf(|collection, query| {
                collection == "accounts" && query.get("email") == Some(&json!("ada@example.com"))
            })
            .returning(|_, _| {
                let user = User::new("ada@example.com", "Ada");
                Ok(Some(to_document(&user).expect("document")))
            });
        let accounts = AccountService::new(Arc::new(store));
        let state = HttpState::new(accounts, Arc::new(MockTemplateRenderer::new()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(test_session_middleware())
                .route(
                    "/login",
                    web::get().to(|session: SessionContext| async move {
                        session.set_session(&Principal::new("ada@example.com")).await?;
                        Ok::<_, Error>(HttpResponse::Ok())
                    }),
                )
                .route(
                    "/me",
                    web::get().to(|identity: RequestIdentity| async move {
                        let first = identity.current_user_object().await?.map(|u| u.name.clone());
                        let again = identity.current_user_object().await?.map(|u| u.name.clone());
                        assert_eq!(first, again);
                        Ok::<_, Error>(HttpResponse::Ok().body(first.unwrap_or_default()))
                    }),
                ),
        )
        .await;

        let login = test::call_service(&app, test::TestRequest::get().uri("/login").to_request()).await;
        let cookie = session_cookie(&login).expect("session cookie");
        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/me").cookie(cookie).to_request(),
        )
        .await;

        assert_eq!(test::read_body(res).await, "Ada");
    }

    #[actix_web::test]
    async fn anonymous_requests_have_no_user() {
        let accounts = AccountService::new(Arc::new(InMemoryDocumentStore::new()));
        let state = HttpState::new(accounts, Arc::new(MockTemplateRenderer::new()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(test_session_middleware())
                .route(
                    "/me",
                    web::get().to(|identity: RequestIdentity| async move {
                        assert!(identity.current_principal().is_none());
                        let user = identity.current_user_object().await?;
                        Ok::<_, Error>(HttpResponse::Ok().body(format!("{}", user.is_some())))
                    }),
                ),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(test::read_body(res).await, "false");
    }
}
