//! Request authentication: bearer token or session cookie.
//!
//! The cookie path carries a double-submit anti-forgery check: unsafe
//! methods must echo the csrf cookie's value in the `x-csrf-token` header.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, Method},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use subtle::ConstantTimeEq;

use crate::{services::AccessTokenClaims, AppState};
use huddle_core::error::AppError;

/// Http-only cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "huddle_access";
/// Http-only cookie carrying the refresh token, scoped to /auth.
pub const REFRESH_COOKIE: &str = "huddle_refresh";
/// Script-readable cookie for the double-submit CSRF pair.
pub const CSRF_COOKIE: &str = "huddle_csrf";

const CSRF_HEADER: &str = "x-csrf-token";

/// Middleware to require authentication.
///
/// Accepts a bearer access token, or the session cookie plus a matching
/// CSRF header for unsafe methods. Validated claims land in the request
/// extensions for [`AuthUser`] to pick up.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    let token = match bearer {
        Some(token) => token,
        None => {
            let jar = CookieJar::from_headers(req.headers());
            let cookie_token = jar
                .get(ACCESS_COOKIE)
                .map(|c| c.value().to_string())
                .ok_or_else(|| {
                    AppError::Unauthenticated(anyhow::anyhow!(
                        "Missing bearer token or session cookie"
                    ))
                })?;

            if is_unsafe(req.method()) {
                verify_csrf(&jar, req.headers())?;
            }

            cookie_token
        }
    };

    let claims = state
        .jwt
        .validate_access_token(&token)
        .map_err(|_| AppError::Unauthenticated(anyhow::anyhow!("Invalid or expired token")))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn is_unsafe(method: &Method) -> bool {
    !matches!(method.as_str(), "GET" | "HEAD" | "OPTIONS")
}

fn verify_csrf(jar: &CookieJar, headers: &axum::http::HeaderMap) -> Result<(), AppError> {
    let cookie_value = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthenticated(anyhow::anyhow!("Missing CSRF cookie")))?;

    let header_value = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthenticated(anyhow::anyhow!("Missing CSRF header")))?;

    let matches: bool = cookie_value
        .as_bytes()
        .ct_eq(header_value.as_bytes())
        .into();
    if !matches {
        return Err(AppError::Unauthenticated(anyhow::anyhow!(
            "CSRF token mismatch"
        )));
    }
    Ok(())
}

/// Extractor for the authenticated caller's claims.
pub struct AuthUser(pub AccessTokenClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<AccessTokenClaims>()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Auth claims missing from request extensions"
                ))
            })?;

        Ok(AuthUser(claims.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_methods_skip_csrf() {
        assert!(!is_unsafe(&Method::GET));
        assert!(!is_unsafe(&Method::HEAD));
        assert!(!is_unsafe(&Method::OPTIONS));
        assert!(is_unsafe(&Method::POST));
        assert!(is_unsafe(&Method::DELETE));
        assert!(is_unsafe(&Method::PATCH));
    }
}
