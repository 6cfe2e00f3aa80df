//! Route table.
//!
//! Every page has a name used by redirects, guards and the `reverse_url`
//! template helper. [`configure`] mounts the handlers on those paths.

use std::collections::BTreeMap;

use actix_web::web;

use super::{account, events, health, home};

/// Home page.
pub const INDEX: &str = "index";
/// Login page.
pub const LOGIN: &str = "login";
/// Signup page.
pub const SIGNUP: &str = "signup";
/// Logout action.
pub const LOGOUT: &str = "logout";
/// Profile page.
pub const PROFILE: &str = "profile";
/// Events page.
pub const EVENTS: &str = "events";

const ROUTES: &[(&str, &str)] = &[
    (INDEX, "/"),
    (LOGIN, "/login"),
    (SIGNUP, "/signup"),
    (LOGOUT, "/logout"),
    (PROFILE, "/profile"),
    (EVENTS, "/events"),
];

/// Path registered under `name`.
///
/// # Examples
/// ```
/// use calendio::inbound::http::routes::{LOGIN, reverse_url};
///
/// assert_eq!(reverse_url(LOGIN), Some("/login"));
/// assert_eq!(reverse_url("nowhere"), None);
/// ```
pub fn reverse_url(name: &str) -> Option<&'static str> {
    ROUTES
        .iter()
        .find(|(route, _)| *route == name)
        .map(|(_, path)| *path)
}

/// Name to path map exposed to templates.
pub fn route_map() -> BTreeMap<&'static str, &'static str> {
    ROUTES.iter().copied().collect()
}

/// Mount every page, action and probe.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(home::index)
        .service(account::login_page)
        .service(account::login)
        .service(account::signup_page)
        .service(account::signup)
        .service(account::logout)
        .service(account::profile_page)
        .service(account::update_profile)
        .service(events::events_page)
        .service(health::ready)
        .service(health::live);
}
