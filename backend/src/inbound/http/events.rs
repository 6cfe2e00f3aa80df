//! Events page.
//!
//! Placeholder: the page renders with an empty list until events exist.

use actix_web::{HttpRequest, HttpResponse, get, web};
use serde::Serialize;

use crate::domain::ApiResult;

use super::guards::{RequireAuthenticated, guarded};
use super::identity::RequestIdentity;
use super::render::Page;
use super::routes::EVENTS;
use super::state::HttpState;

const TEMPLATE: &str = "events/events.html";

#[derive(Serialize)]
struct EventsPage {
    events: Vec<serde_json::Value>,
}

/// `GET /events`.
#[get("/events")]
pub async fn events_page(
    req: HttpRequest,
    identity: RequestIdentity,
    state: web::Data<HttpState>,
) -> ApiResult<HttpResponse> {
    let data = EventsPage { events: Vec::new() };
    guarded(
        &RequireAuthenticated::default(),
        identity.current_principal(),
        &req,
        Page::new(&state, &req, &identity).render(TEMPLATE, EVENTS, &data),
    )
    .await
}
