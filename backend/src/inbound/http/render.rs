//! Page responses.
//!
//! Pages render a template with a context holding `xsrf`, `request`,
//! `user`, `static`, `handler` and `reverse_url` alongside the handler's own
//! data. Requests sent with `X-Requested-With: XMLHttpRequest` get the
//! handler data as JSON instead.

use actix_web::http::header::{self, ContentType};
use actix_web::{HttpRequest, HttpResponse};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::domain::{ApiResult, Error, UserView};

use super::identity::RequestIdentity;
use super::routes::route_map;
use super::state::HttpState;
use super::xsrf::xsrf_form_html;

/// Whether the request came from script rather than navigation.
pub fn is_xhr(req: &HttpRequest) -> bool {
    req.headers()
        .get("X-Requested-With")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("XMLHttpRequest"))
}

/// `302 Found` pointing at `location`.
pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// JSON response with `payload`.
pub fn json_response<T: Serialize>(payload: &T) -> HttpResponse {
    HttpResponse::Ok().json(payload)
}

fn to_object<T: Serialize>(data: &T) -> ApiResult<Map<String, Value>> {
    match serde_json::to_value(data) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(Error::internal(format!("page data must be an object, got {other}"))),
        Err(err) => Err(Error::internal(format!("page data failed to serialise: {err}"))),
    }
}

/// A page about to be rendered for one request.
pub struct Page<'a> {
    state: &'a HttpState,
    req: &'a HttpRequest,
    identity: &'a RequestIdentity,
}

impl<'a> Page<'a> {
    /// Page for `req` as seen by `identity`.
    pub fn new(state: &'a HttpState, req: &'a HttpRequest, identity: &'a RequestIdentity) -> Self {
        Self {
            state,
            req,
            identity,
        }
    }

    async fn context(&self, handler: &str, data: Map<String, Value>) -> ApiResult<Value> {
        let xsrf = if self.state.pages.xsrf_cookies {
            xsrf_form_html(&self.identity.session().xsrf_token()?)
        } else {
            String::new()
        };
        let user: Option<UserView> = self.identity.current_user_object().await?.map(|u| u.view());
        let mut context = data;
        context.insert("xsrf".to_owned(), Value::String(xsrf));
        context.insert(
            "request".to_owned(),
            json!({
                "method": self.req.method().as_str(),
                "path": self.req.path(),
                "query": self.req.query_string(),
            }),
        );
        context.insert("user".to_owned(), json!(user));
        context.insert(
            "static".to_owned(),
            Value::String(self.state.pages.static_url.clone()),
        );
        context.insert("handler".to_owned(), Value::String(handler.to_owned()));
        context.insert("reverse_url".to_owned(), json!(route_map()));
        Ok(Value::Object(context))
    }

    /// Render `template` for the route `handler` with `data`.
    pub async fn render<T: Serialize>(
        &self,
        template: &str,
        handler: &str,
        data: &T,
    ) -> ApiResult<HttpResponse> {
        if is_xhr(self.req) {
            return Ok(json_response(data));
        }
        let context = self.context(handler, to_object(data)?).await?;
        let html = self.state.renderer.render(template, &context)?;
        Ok(HttpResponse::Ok()
            .content_type(ContentType::html())
            .body(html))
    }
}
