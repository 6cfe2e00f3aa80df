//! Signup, login, logout and profile pages.
//!
//! Invalid submissions re-render the page with the bound form so the user
//! sees inline errors. Successful submissions redirect.

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use serde::Serialize;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::domain::forms::{Form, LoginForm, ModelForm, ProfileForm, RegistrationForm};
use crate::domain::{ApiResult, UserView};

use super::guards::{AnonymousOnly, RequireAuthenticated, guarded};
use super::identity::RequestIdentity;
use super::render::{Page, redirect};
use super::routes::{INDEX, LOGIN, PROFILE, SIGNUP, reverse_url};
use super::state::HttpState;
use super::xsrf::PostedForm;

const LOGIN_TEMPLATE: &str = "account/login.html";
const SIGNUP_TEMPLATE: &str = "account/signup.html";
const PROFILE_TEMPLATE: &str = "account/profile.html";

#[derive(Serialize)]
struct FormPage<'a, F> {
    form: &'a F,
}

#[derive(Serialize)]
struct ProfilePage<'a> {
    form: &'a ModelForm<ProfileForm>,
    obj: UserView,
}

fn path_of(route: &str) -> &'static str {
    reverse_url(route).unwrap_or("/")
}

/// Local path from the `next` query argument, if it is safe to follow.
fn next_location(req: &HttpRequest) -> Option<String> {
    form_urlencoded::parse(req.query_string().as_bytes())
        .find(|(name, _)| name == "next")
        .map(|(_, value)| value.into_owned())
        .filter(|next| next.starts_with('/') && !next.starts_with("//") && !next.contains('\\'))
}

/// `GET /login`.
#[get("/login")]
pub async fn login_page(
    req: HttpRequest,
    identity: RequestIdentity,
    state: web::Data<HttpState>,
) -> ApiResult<HttpResponse> {
    let form = Form::<LoginForm>::empty();
    guarded(
        &AnonymousOnly::default(),
        identity.current_principal(),
        &req,
        Page::new(&state, &req, &identity).render(LOGIN_TEMPLATE, LOGIN, &FormPage { form: &form }),
    )
    .await
}

/// `POST /login`: check credentials and start the session.
#[post("/login")]
pub async fn login(
    req: HttpRequest,
    identity: RequestIdentity,
    state: web::Data<HttpState>,
    posted: PostedForm,
) -> ApiResult<HttpResponse> {
    guarded(&AnonymousOnly::default(), identity.current_principal(), &req, async {
        let mut form = Form::<LoginForm>::bind(posted.input());
        match state.accounts.authenticate(&mut form).await? {
            Some(user) => {
                identity.session().set_session(&user.principal()).await?;
                info!(user = %user, "signed in");
                let location = next_location(&req).unwrap_or_else(|| path_of(INDEX).to_owned());
                Ok(redirect(&location))
            }
            None => {
                Page::new(&state, &req, &identity)
                    .render(LOGIN_TEMPLATE, LOGIN, &FormPage { form: &form })
                    .await
            }
        }
    })
    .await
}

/// `GET /signup`.
#[get("/signup")]
pub async fn signup_page(
    req: HttpRequest,
    identity: RequestIdentity,
    state: web::Data<HttpState>,
) -> ApiResult<HttpResponse> {
    let form = ModelForm::<RegistrationForm>::empty();
    guarded(
        &AnonymousOnly::default(),
        identity.current_principal(),
        &req,
        Page::new(&state, &req, &identity).render(SIGNUP_TEMPLATE, SIGNUP, &FormPage { form: &form }),
    )
    .await
}

/// `POST /signup`: register the account and sign it in.
#[post("/signup")]
pub async fn signup(
    req: HttpRequest,
    identity: RequestIdentity,
    state: web::Data<HttpState>,
    posted: PostedForm,
) -> ApiResult<HttpResponse> {
    guarded(&AnonymousOnly::default(), identity.current_principal(), &req, async {
        let mut form = ModelForm::<RegistrationForm>::bind(posted.input());
        match state.accounts.register(&mut form).await? {
            Some(user) => {
                identity.session().set_session(&user.principal()).await?;
                Ok(redirect(path_of(INDEX)))
            }
            None => {
                Page::new(&state, &req, &identity)
                    .render(SIGNUP_TEMPLATE, SIGNUP, &FormPage { form: &form })
                    .await
            }
        }
    })
    .await
}

/// `GET /logout`: close the session and go home.
#[get("/logout")]
pub async fn logout(identity: RequestIdentity) -> ApiResult<HttpResponse> {
    identity.session().clear_session().await?;
    Ok(redirect(path_of(INDEX)))
}

/// `GET /profile`: the signed-in user's details.
#[get("/profile")]
pub async fn profile_page(
    req: HttpRequest,
    identity: RequestIdentity,
    state: web::Data<HttpState>,
) -> ApiResult<HttpResponse> {
    guarded(&RequireAuthenticated::default(), identity.current_principal(), &req, async {
        let Some(user) = identity.current_user_object().await? else {
            return orphaned_session(&identity).await;
        };
        let form = ModelForm::<ProfileForm>::bind(&ProfileForm::initial(user));
        let data = ProfilePage {
            form: &form,
            obj: user.view(),
        };
        Page::new(&state, &req, &identity)
            .render(PROFILE_TEMPLATE, PROFILE, &data)
            .await
    })
    .await
}

/// `POST /profile`: merge the edited fields into the stored account.
#[post("/profile")]
pub async fn update_profile(
    req: HttpRequest,
    identity: RequestIdentity,
    state: web::Data<HttpState>,
    posted: PostedForm,
) -> ApiResult<HttpResponse> {
    guarded(&RequireAuthenticated::default(), identity.current_principal(), &req, async {
        let Some(user) = identity.current_user_object().await? else {
            return orphaned_session(&identity).await;
        };
        let mut form = ModelForm::<ProfileForm>::bind(posted.input());
        match state.accounts.update_profile(user, &mut form).await? {
            Some(updated) => {
                if updated.email != user.email {
                    identity.session().set_session(&updated.principal()).await?;
                }
                Ok(redirect(path_of(PROFILE)))
            }
            None => {
                let data = ProfilePage {
                    form: &form,
                    obj: user.view(),
                };
                Page::new(&state, &req, &identity)
                    .render(PROFILE_TEMPLATE, PROFILE, &data)
                    .await
            }
        }
    })
    .await
}

/// The session names an account that no longer exists.
async fn orphaned_session(identity: &RequestIdentity) -> ApiResult<HttpResponse> {
    warn!("dropping session for a deleted account");
    identity.session().clear_session().await?;
    Ok(redirect(path_of(LOGIN)))
}
