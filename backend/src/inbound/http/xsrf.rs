//! Anti-forgery checked form submissions.
//!
//! [`PostedForm`] reads an `application/x-www-form-urlencoded` body into
//! [`FormInput`]. When `xsrf_cookies` is on, the submission must carry the
//! session's token in the `_xsrf` field or the `X-XSRFToken` header.

use actix_session::Session;
use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use futures_util::future::LocalBoxFuture;
use tracing::warn;
use url::form_urlencoded;

use crate::domain::credentials::constant_time_eq;
use crate::domain::forms::FormInput;
use crate::domain::{ApiResult, Error};

use super::session::{XSRF_KEY, xsrf_token};
use super::state::HttpState;

/// Header accepted in place of the `_xsrf` form field.
pub const XSRF_HEADER: &str = "X-XSRFToken";

/// Hidden input carrying `token`, for inclusion in every form.
pub fn xsrf_form_html(token: &str) -> String {
    format!(r#"<input type="hidden" name="{XSRF_KEY}" value="{token}"/>"#)
}

fn verify(expected: &str, submitted: Option<&str>) -> ApiResult<()> {
    let Some(submitted) = submitted.filter(|token| !token.is_empty()) else {
        warn!("form submission without an anti-forgery token");
        return Err(Error::forbidden("'_xsrf' argument missing from POST"));
    };
    if constant_time_eq(expected.as_bytes(), submitted.as_bytes()) {
        Ok(())
    } else {
        warn!("anti-forgery token mismatch");
        Err(Error::forbidden("XSRF cookie does not match POST argument"))
    }
}

/// Decoded form body that passed the anti-forgery check.
#[derive(Debug, Clone)]
pub struct PostedForm(FormInput);

impl PostedForm {
    /// Submitted arguments.
    pub fn input(&self) -> &FormInput {
        &self.0
    }
}

impl FromRequest for PostedForm {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let enforce = req
            .app_data::<web::Data<HttpState>>()
            .is_none_or(|state| state.pages.xsrf_cookies);
        let header = req
            .headers()
            .get(XSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let session = Session::from_request(req, payload);
        let body = web::Bytes::from_request(req, payload);
        Box::pin(async move {
            let session = session.await?;
            let body = body.await?;
            let input = FormInput::from_pairs(form_urlencoded::parse(&body).into_owned());
            if enforce {
                let expected = xsrf_token(&session)?;
                verify(&expected, input.first(XSRF_KEY).or(header.as_deref()))?;
            }
            Ok(PostedForm(input))
        })
    }
}
