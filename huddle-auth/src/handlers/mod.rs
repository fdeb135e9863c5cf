pub mod auth;
pub mod keys;
pub mod membership;
pub mod mfa;
pub mod user;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::middleware::{ACCESS_COOKIE, CSRF_COOKIE, REFRESH_COOKIE};
use crate::services::SessionTokens;
use crate::AppState;

/// Build the session cookie set for a freshly issued token pair.
///
/// Access and refresh cookies are http-only; the CSRF cookie is readable so
/// the client can echo it in the `x-csrf-token` header.
pub(crate) fn session_cookies(state: &AppState, tokens: &SessionTokens) -> CookieJar {
    let secure = state.config.security.cookie_secure;

    let access = Cookie::build((ACCESS_COOKIE, tokens.access_token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();

    let refresh = Cookie::build((REFRESH_COOKIE, tokens.refresh_token.clone()))
        .path("/auth")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();

    let csrf = Cookie::build((CSRF_COOKIE, tokens.csrf_token.clone()))
        .path("/")
        .http_only(false)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();

    CookieJar::default().add(access).add(refresh).add(csrf)
}

/// Clear every session cookie (logout).
pub(crate) fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    let access = Cookie::build((ACCESS_COOKIE, "")).path("/").build();
    let refresh = Cookie::build((REFRESH_COOKIE, "")).path("/auth").build();
    let csrf = Cookie::build((CSRF_COOKIE, "")).path("/").build();
    jar.remove(access).remove(refresh).remove(csrf)
}
