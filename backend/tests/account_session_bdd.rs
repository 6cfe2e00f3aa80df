//! Behaviour tests for signup, login, logout and the profile page.
//!
//! Each request runs through the full application: cookie sessions, the
//! trace middleware, the registered routes and the bundled templates, with
//! accounts and session records kept in the in-memory document store.
//
// rstest-bdd generates guard variables with double underscores, which trips
// the non_snake_case lint under -D warnings.
#![allow(non_snake_case)]

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use actix_rt::SystemRunner;
use actix_web::cookie::{Cookie, Key, SameSite};
use actix_web::http::StatusCode;
use actix_web::http::header::{self, ContentType};
use actix_web::test::{self as actix_test, TestRequest};
use actix_web::{App, web};
use calendio::domain::AccountService;
use calendio::domain::forms::{FormInput, ModelForm, RegistrationForm};
use calendio::inbound::http::routes;
use calendio::inbound::http::session_config::SessionSettings;
use calendio::inbound::http::state::HttpState;
use calendio::middleware::Trace;
use calendio::outbound::memory::InMemoryDocumentStore;
use calendio::outbound::templates::MiniJinjaRenderer;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use url::form_urlencoded;

const XSRF_MARKER: &str = r#"name="_xsrf" value=""#;

struct Reply {
    status: StatusCode,
    location: Option<String>,
    cookie: Option<Cookie<'static>>,
    body: String,
}

struct AccountWorld {
    system: SystemRunner,
    accounts: AccountService,
    state: web::Data<HttpState>,
    session: SessionSettings,
    cookie: RefCell<Option<Cookie<'static>>>,
    kept_cookie: RefCell<Option<Cookie<'static>>>,
    email: RefCell<String>,
    status: Cell<Option<StatusCode>>,
    location: RefCell<Option<String>>,
    body: RefCell<String>,
}

impl AccountWorld {
    fn new() -> Self {
        let system = actix_rt::System::new();
        let accounts = AccountService::new(Arc::new(InMemoryDocumentStore::new()));
        system
            .block_on(accounts.ensure_indexes())
            .expect("email index should be created");
        let renderer = MiniJinjaRenderer::from_directory(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/templates"
        ));
        let state = web::Data::new(HttpState::new(accounts.clone(), Arc::new(renderer)));
        Self {
            system,
            accounts,
            state,
            session: SessionSettings {
                key: Key::generate(),
                cookie_secure: false,
                same_site: SameSite::Lax,
            },
            cookie: RefCell::new(None),
            kept_cookie: RefCell::new(None),
            email: RefCell::new(String::new()),
            status: Cell::new(None),
            location: RefCell::new(None),
            body: RefCell::new(String::new()),
        }
    }

    fn send(&self, request: TestRequest) {
        let request = match self.cookie.borrow().clone() {
            Some(cookie) => request.cookie(cookie),
            None => request,
        };
        let state = self.state.clone();
        let session = self.session.clone();
        let reply = self.system.block_on(async move {
            let app = actix_test::init_service(
                App::new()
                    .app_data(state)
                    .wrap(session.middleware(30))
                    .wrap(Trace)
                    .configure(routes::configure),
            )
            .await;
            let response = actix_test::call_service(&app, request.to_request()).await;
            let status = response.status();
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let cookie = response
                .response()
                .cookies()
                .find(|cookie| cookie.name() == "session")
                .map(Cookie::into_owned);
            let body = actix_test::read_body(response).await;
            Reply {
                status,
                location,
                cookie,
                body: String::from_utf8_lossy(&body).into_owned(),
            }
        });

        if let Some(cookie) = reply.cookie {
            *self.cookie.borrow_mut() = (!cookie.value().is_empty()).then_some(cookie);
        }
        self.status.set(Some(reply.status));
        *self.location.borrow_mut() = reply.location;
        *self.body.borrow_mut() = reply.body;
    }

    fn open(&self, path: &str) {
        self.send(TestRequest::get().uri(path));
    }

    fn post(&self, path: &str, pairs: &[(&str, &str)]) {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.send(
            TestRequest::post()
                .uri(path)
                .insert_header(ContentType::form_url_encoded())
                .set_payload(body),
        );
    }

    /// Load the form page at `path`, then post `pairs` with its token.
    fn submit(&self, path: &str, pairs: &[(&str, &str)]) {
        self.open(path);
        let token = xsrf_token(&self.body.borrow()).expect("form page should carry a token");
        let mut pairs = pairs.to_vec();
        pairs.push(("_xsrf", &token));
        self.post(path, &pairs);
    }

    fn status(&self) -> StatusCode {
        self.status.get().expect("a request should have been sent")
    }
}

fn xsrf_token(html: &str) -> Option<String> {
    let start = html.find(XSRF_MARKER)? + XSRF_MARKER.len();
    let end = html[start..].find('"')?;
    Some(html[start..start + end].to_owned())
}

#[fixture]
fn world() -> AccountWorld {
    AccountWorld::new()
}

#[given("a registered account {email} with password {password}")]
fn a_registered_account(world: &AccountWorld, email: String, password: String) {
    let mut form = ModelForm::<RegistrationForm>::bind(&FormInput::from_pairs([
        ("name", "Ada"),
        ("email", email.as_str()),
        ("password", password.as_str()),
        ("password_confirmation", password.as_str()),
    ]));
    let created = world
        .system
        .block_on(world.accounts.register(&mut form))
        .expect("registration should reach the store");
    assert!(created.is_some(), "fixture account should be valid");
}

#[given("an anonymous visitor")]
fn an_anonymous_visitor(world: &AccountWorld) {
    *world.cookie.borrow_mut() = None;
}

#[when("they sign up as {email} with password {password}")]
fn they_sign_up(world: &AccountWorld, email: String, password: String) {
    *world.email.borrow_mut() = email.clone();
    world.submit(
        "/signup",
        &[
            ("name", "Ada"),
            ("email", &email),
            ("password", &password),
            ("password_confirmation", &password),
        ],
    );
}

#[when("they log in as {email} with password {password}")]
fn they_log_in(world: &AccountWorld, email: String, password: String) {
    *world.email.borrow_mut() = email.clone();
    let target = world
        .location
        .borrow()
        .clone()
        .filter(|location| location.starts_with("/login"))
        .unwrap_or_else(|| "/login".to_owned());
    world.submit(&target, &[("email", &email), ("password", &password)]);
}

#[when("they open {path}")]
fn they_open(world: &AccountWorld, path: String) {
    world.open(&path);
}

#[when("they post a login form without a token")]
fn they_post_without_a_token(world: &AccountWorld) {
    world.open("/login");
    world.post("/login", &[("email", "ada@example.com"), ("password", "engine")]);
}

#[when("they keep a copy of their session cookie")]
fn they_keep_their_session_cookie(world: &AccountWorld) {
    let cookie = world.cookie.borrow().clone();
    assert!(cookie.is_some(), "a signed-in visitor should hold a session cookie");
    *world.kept_cookie.borrow_mut() = cookie;
}

#[when("they present the kept session cookie")]
fn they_present_the_kept_session_cookie(world: &AccountWorld) {
    *world.cookie.borrow_mut() = world.kept_cookie.borrow().clone();
}

#[when("they change their name to {name}")]
fn they_change_their_name(world: &AccountWorld, name: String) {
    let email = world.email.borrow().clone();
    world.submit("/profile", &[("name", &name), ("email", &email)]);
}

#[then("they are redirected to {location}")]
fn they_are_redirected_to(world: &AccountWorld, location: String) {
    assert_eq!(world.status(), StatusCode::FOUND);
    assert_eq!(world.location.borrow().as_deref(), Some(location.as_str()));
}

#[then("the response status is {status}")]
fn the_response_status_is(world: &AccountWorld, status: u16) {
    assert_eq!(world.status().as_u16(), status);
}

#[then("the page shows {text}")]
fn the_page_shows(world: &AccountWorld, text: String) {
    let body = world.body.borrow();
    assert!(body.contains(&text), "expected {text:?} in page:\n{body}");
}

#[scenario(path = "tests/features/account_session.feature")]
fn account_session_scenarios(world: AccountWorld) {
    drop(world);
}
