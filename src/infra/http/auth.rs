//! Session-cookie identity extraction and the login/signup/logout handlers.

use axum::{
    extract::{FromRequestParts, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, Expiration, SameSite};
use serde::Deserialize;
use tracing::warn;

use crate::application::accounts::{AccountError, IssuedSession};
use crate::application::error::HttpError;
use crate::domain::entities::UserRecord;
use crate::domain::forms::FieldErrors;
use crate::presentation::views::{
    AuthFormContext, AuthFormTemplate, FieldErrorView, LayoutContext, field_error_views,
    render_template_response, site_chrome,
};

use super::public::HttpState;

pub const SESSION_COOKIE: &str = "cortile_session";

/// The authenticated visitor. Anonymous requests are redirected to the login
/// form with the original path carried in `next`.
#[derive(Clone)]
pub struct CurrentUser(pub UserRecord);

/// The visitor if a valid session cookie is present; `None` otherwise.
/// Resolution failures degrade to anonymous so public pages stay up.
#[derive(Clone)]
pub struct MaybeUser(pub Option<UserRecord>);

impl FromRequestParts<HttpState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        match resolve_session(parts, state).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => Err(redirect_to_login(parts)),
            Err(err) => Err(err.into_response()),
        }
    }
}

impl FromRequestParts<HttpState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        match resolve_session(parts, state).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(_) => {
                warn!(
                    target = "cortile::http::auth",
                    path = %parts.uri.path(),
                    "session resolution failed; treating request as anonymous"
                );
                Ok(MaybeUser(None))
            }
        }
    }
}

async fn resolve_session(
    parts: &Parts,
    state: &HttpState,
) -> Result<Option<UserRecord>, HttpError> {
    let jar = CookieJar::from_headers(&parts.headers);
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };

    state.accounts.resolve(cookie.value()).await.map_err(|err| {
        HttpError::from_error(
            "infra::http::auth::resolve_session",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
    })
}

fn redirect_to_login(parts: &Parts) -> Response {
    Redirect::to(&format!("/auth/login?next={}", parts.uri.path())).into_response()
}

fn session_cookie(issued: &IssuedSession) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, issued.cookie_value.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_expires(Expiration::from(issued.expires_at));
    cookie
}

fn expired_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_path("/");
    cookie
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    next: Option<String>,
}

/// Only same-site relative paths are honored as post-login targets.
fn sanitize_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => "/".to_string(),
    }
}

fn login_context(
    username_value: String,
    next: String,
    errors: Vec<FieldErrorView>,
) -> AuthFormContext {
    AuthFormContext {
        heading: "Sign in".to_string(),
        action: "/auth/login".to_string(),
        submit_label: "Sign in".to_string(),
        username_value,
        next,
        errors,
        alternate_label: "New here? Create an account".to_string(),
        alternate_href: "/auth/signup".to_string(),
    }
}

fn signup_context(
    username_value: String,
    next: String,
    errors: Vec<FieldErrorView>,
) -> AuthFormContext {
    AuthFormContext {
        heading: "Create an account".to_string(),
        action: "/auth/signup".to_string(),
        submit_label: "Sign up".to_string(),
        username_value,
        next,
        errors,
        alternate_label: "Already registered? Sign in".to_string(),
        alternate_href: "/auth/login".to_string(),
    }
}

pub async fn login_form(Query(query): Query<NextQuery>) -> Response {
    let context = login_context(String::new(), sanitize_next(query.next.as_deref()), Vec::new());
    render_template_response(
        AuthFormTemplate {
            view: LayoutContext::new(site_chrome(), context),
        },
        StatusCode::OK,
    )
}

pub async fn signup_form(Query(query): Query<NextQuery>) -> Response {
    let context = signup_context(String::new(), sanitize_next(query.next.as_deref()), Vec::new());
    render_template_response(
        AuthFormTemplate {
            view: LayoutContext::new(site_chrome(), context),
        },
        StatusCode::OK,
    )
}

pub async fn login(
    State(state): State<HttpState>,
    jar: CookieJar,
    axum::extract::Form(form): axum::extract::Form<CredentialsForm>,
) -> Response {
    let next = sanitize_next(form.next.as_deref());

    match state.accounts.login(&form.username, &form.password).await {
        Ok(issued) => {
            let jar = jar.add(session_cookie(&issued));
            (jar, Redirect::to(&next)).into_response()
        }
        Err(AccountError::InvalidCredentials) => {
            let mut errors = FieldErrors::new();
            errors.push("username", "Invalid username or password");
            let context = login_context(form.username, next, field_error_views(&errors));
            render_template_response(
                AuthFormTemplate {
                    view: LayoutContext::new(site_chrome(), context),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            )
        }
        Err(err) => account_error_response(err),
    }
}

pub async fn signup(
    State(state): State<HttpState>,
    jar: CookieJar,
    axum::extract::Form(form): axum::extract::Form<CredentialsForm>,
) -> Response {
    let next = sanitize_next(form.next.as_deref());

    match state.accounts.signup(&form.username, &form.password).await {
        Ok(issued) => {
            let jar = jar.add(session_cookie(&issued));
            (jar, Redirect::to(&next)).into_response()
        }
        Err(AccountError::Validation(errors)) => {
            let context = signup_context(form.username, next, field_error_views(&errors));
            render_template_response(
                AuthFormTemplate {
                    view: LayoutContext::new(site_chrome(), context),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            )
        }
        Err(AccountError::UsernameTaken) => {
            let mut errors = FieldErrors::new();
            errors.push("username", "That username is already taken");
            let context = signup_context(form.username, next, field_error_views(&errors));
            render_template_response(
                AuthFormTemplate {
                    view: LayoutContext::new(site_chrome(), context),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            )
        }
        Err(err) => account_error_response(err),
    }
}

pub async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(err) = state.accounts.logout(cookie.value()).await {
            return account_error_response(err);
        }
    }

    let jar = jar.remove(expired_session_cookie());
    (jar, Redirect::to("/")).into_response()
}

fn account_error_response(err: AccountError) -> Response {
    HttpError::from_error(
        "infra::http::auth::account_error_response",
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        &err,
    )
    .into_response()
}
