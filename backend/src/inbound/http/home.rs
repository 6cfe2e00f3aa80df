//! Home page.

use actix_web::{HttpRequest, HttpResponse, get, web};
use serde_json::json;

use crate::domain::ApiResult;

use super::guards::{RequireAuthenticated, guarded};
use super::identity::RequestIdentity;
use super::render::Page;
use super::routes::INDEX;
use super::state::HttpState;

const TEMPLATE: &str = "index.html";

/// `GET /`: signed-in landing page.
#[get("/")]
pub async fn index(
    req: HttpRequest,
    identity: RequestIdentity,
    state: web::Data<HttpState>,
) -> ApiResult<HttpResponse> {
    guarded(
        &RequireAuthenticated::default(),
        identity.current_principal(),
        &req,
        Page::new(&state, &req, &identity).render(TEMPLATE, INDEX, &json!({})),
    )
    .await
}
