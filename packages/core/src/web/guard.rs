//! Route guard.
//!
//! Runs in front of every route and only looks at the `authToken` cookie's
//! shape and expiry. Pages that need the actual user still verify the
//! signature through [`super::session::CurrentUser`].

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;

use crate::auth::token::{self, TokenState};
use super::session::{removal_cookie, AUTH_COOKIE};

const BYPASS_PREFIXES: [&str; 5] = ["/_next", "/favicon", "/public", "/api", "/static"];
const BYPASS_EXACT: [&str; 2] = ["/health", "/metrics"];
const PROTECTED: [&str; 5] = ["/", "/patients", "/result", "/settings", "/profile"];
const AUTH_PAGES: [&str; 1] = ["/login"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Bypass,
    Protected,
    AuthPage,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Continue,
    ContinueClearingCookie,
    Redirect { to: &'static str, clear_cookie: bool },
}

/// `path` is `route` itself or something below it.
fn matches_route(path: &str, route: &str) -> bool {
    if route == "/" {
        return path == "/";
    }
    path == route
        || path
            .strip_prefix(route)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub fn classify(path: &str) -> RouteClass {
    if BYPASS_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
        || BYPASS_EXACT.contains(&path)
        || path.contains('.')
    {
        return RouteClass::Bypass;
    }
    if PROTECTED.iter().any(|route| matches_route(path, route)) {
        return RouteClass::Protected;
    }
    if AUTH_PAGES.iter().any(|route| matches_route(path, route)) {
        return RouteClass::AuthPage;
    }
    RouteClass::Public
}

pub fn decide(class: RouteClass, state: TokenState) -> GuardDecision {
    match (class, state) {
        (RouteClass::Bypass, _) => GuardDecision::Continue,
        (RouteClass::Protected, TokenState::Missing) => GuardDecision::Redirect {
            to: "/login",
            clear_cookie: false,
        },
        (_, TokenState::Missing) => GuardDecision::Continue,
        (RouteClass::AuthPage, TokenState::Live) => GuardDecision::Redirect {
            to: "/",
            clear_cookie: false,
        },
        (_, TokenState::Live) => GuardDecision::Continue,
        (RouteClass::Protected, TokenState::Malformed | TokenState::Expired) => {
            GuardDecision::Redirect {
                to: "/login",
                clear_cookie: true,
            }
        }
        (_, TokenState::Malformed | TokenState::Expired) => GuardDecision::ContinueClearingCookie,
    }
}

/// `axum::middleware::from_fn` layer applying [`decide`] to each request.
pub async fn guard(jar: CookieJar, request: Request, next: Next) -> Response {
    let class = classify(request.uri().path());
    if class == RouteClass::Bypass {
        return next.run(request).await;
    }

    let state = token::inspect(
        jar.get(AUTH_COOKIE).map(|cookie| cookie.value()),
        Utc::now().timestamp(),
    );
    let decision = decide(class, state);
    if decision != GuardDecision::Continue {
        tracing::debug!(path = %request.uri().path(), ?class, ?state, ?decision, "guard");
    }

    match decision {
        GuardDecision::Continue => next.run(request).await,
        GuardDecision::ContinueClearingCookie => {
            let response = next.run(request).await;
            (jar.remove(removal_cookie()), response).into_response()
        }
        GuardDecision::Redirect { to, clear_cookie } => {
            if clear_cookie {
                (jar.remove(removal_cookie()), Redirect::to(to)).into_response()
            } else {
                Redirect::to(to).into_response()
            }
        }
    }
}
