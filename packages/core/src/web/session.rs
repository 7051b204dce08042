//! Session cookie and the login/logout pages.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request::Parts},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use crate::app::SharedState;
use crate::auth::{AuthError, User};
use super::templates;

pub const AUTH_COOKIE: &str = "authToken";
pub const COOKIE_MAX_AGE_DAYS: i64 = 7;

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .same_site(SameSite::Strict)
        .http_only(true)
        .secure(secure)
        .max_age(time::Duration::days(COOKIE_MAX_AGE_DAYS))
        .build()
}

/// Cookie to hand to `CookieJar::remove`; the path must match the one set.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, "")).path("/").build()
}

/// Redirect to `/login` and expire the session cookie, for when the backend
/// rejects the token partway through a page.
pub fn expire_session() -> Response {
    let mut cookie = removal_cookie();
    cookie.make_removal();
    (
        [(header::SET_COOKIE, cookie.to_string())],
        Redirect::to("/login"),
    )
        .into_response()
}

/// The signed-in user, resolved from a verified session cookie.
///
/// Rejection redirects to `/login` and clears the cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(AUTH_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty());

        let Some(token) = token else {
            return Err(Redirect::to("/login").into_response());
        };

        match state.auth.verify(&token) {
            Ok(user) => Ok(CurrentUser { user, token }),
            Err(err) => {
                tracing::info!(path = %parts.uri.path(), "session rejected: {}", err);
                Err((jar.remove(removal_cookie()), Redirect::to("/login")).into_response())
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login_page() -> Html<String> {
    templates::login_page(None, "")
}

pub async fn login_submit(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    if form.username.trim().is_empty() || form.password.is_empty() {
        return templates::login_page(Some("Please enter both username and password"), &form.username)
            .into_response();
    }

    match state.auth.login(&form.username, &form.password) {
        Ok(outcome) => {
            state.metrics.record_login("success");
            tracing::info!(user = %outcome.user.username, "signed in");
            let cookie = session_cookie(outcome.token, state.secure_cookies);
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        Err(err) => {
            let outcome = match err {
                AuthError::InvalidCredentials => "invalid",
                _ => "error",
            };
            state.metrics.record_login(outcome);
            tracing::warn!(user = %form.username, "sign-in failed: {}", err);
            templates::login_page(Some(&err.to_string()), &form.username).into_response()
        }
    }
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (jar.remove(removal_cookie()), Redirect::to("/login"))
}
