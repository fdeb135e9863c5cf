use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-level error with a stable wire code.
///
/// Every variant maps to exactly one `(status, code)` pair so handlers can
/// return typed failures without leaking internal detail to the caller.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(anyhow::Error),

    #[error("Invalid email or password")]
    InvalidLogin,

    #[error("Invalid refresh token")]
    InvalidRefresh,

    #[error("Refresh token expired")]
    ExpiredRefresh,

    #[error("Invalid MFA code")]
    InvalidMfa,

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Insufficient role for this operation")]
    InsufficientRole,

    #[error("Not a member of this organization")]
    NotAMember,

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Organization must retain at least one owner")]
    LastOwner,

    #[error("Too many requests")]
    TooManyRequests(Option<u64>),

    #[error("Cryptographic operation failed")]
    CryptoFailure,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Stable wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => "VALIDATION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::InvalidLogin => "INVALID_LOGIN",
            AppError::InvalidRefresh => "INVALID_REFRESH",
            AppError::ExpiredRefresh => "EXPIRED_REFRESH",
            AppError::InvalidMfa => "INVALID_MFA",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::InsufficientRole => "INSUFFICIENT_ROLE",
            AppError::NotAMember => "NOT_A_MEMBER",
            AppError::Conflict(_) => "CONFLICT",
            AppError::LastOwner => "LAST_OWNER",
            AppError::TooManyRequests(_) => "RATE_LIMITED",
            AppError::CryptoFailure => "CRYPTO_FAILURE",
            AppError::DatabaseError(_)
            | AppError::InternalError(_)
            | AppError::ConfigError(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthenticated(_)
            | AppError::InvalidLogin
            | AppError::InvalidRefresh
            | AppError::ExpiredRefresh
            | AppError::InvalidMfa => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::InsufficientRole | AppError::NotAMember => {
                StatusCode::FORBIDDEN
            }
            AppError::Conflict(_) | AppError::LastOwner => StatusCode::CONFLICT,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::CryptoFailure
            | AppError::DatabaseError(_)
            | AppError::InternalError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller. Internal detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(err) => err.to_string(),
            AppError::BadRequest(err) => err.to_string(),
            AppError::NotFound(err) => err.to_string(),
            AppError::Conflict(err) => err.to_string(),
            AppError::Forbidden(err) => err.to_string(),
            AppError::Unauthenticated(err) => err.to_string(),
            AppError::DatabaseError(_)
            | AppError::InternalError(_)
            | AppError::ConfigError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthenticated(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// Wire shape for every failed request: `{ ok: false, error: <CODE>, message }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }

        let retry_after = match &self {
            AppError::TooManyRequests(retry) => *retry,
            _ => None,
        };

        let mut res = (
            status,
            Json(ErrorBody {
                ok: false,
                error: code,
                message: Some(self.public_message()),
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AppError::InvalidLogin.code(), "INVALID_LOGIN");
        assert_eq!(AppError::InvalidRefresh.code(), "INVALID_REFRESH");
        assert_eq!(AppError::ExpiredRefresh.code(), "EXPIRED_REFRESH");
        assert_eq!(AppError::InvalidMfa.code(), "INVALID_MFA");
        assert_eq!(AppError::InsufficientRole.code(), "INSUFFICIENT_ROLE");
        assert_eq!(AppError::NotAMember.code(), "NOT_A_MEMBER");
        assert_eq!(AppError::LastOwner.code(), "LAST_OWNER");
        assert_eq!(AppError::TooManyRequests(None).code(), "RATE_LIMITED");
        assert_eq!(AppError::CryptoFailure.code(), "CRYPTO_FAILURE");
        assert_eq!(
            AppError::DatabaseError(anyhow::anyhow!("boom")).code(),
            "INTERNAL"
        );
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = AppError::DatabaseError(anyhow::anyhow!("connection refused to 10.0.0.3"));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn login_and_refresh_failures_are_unauthorized() {
        assert_eq!(AppError::InvalidLogin.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InvalidRefresh.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InvalidMfa.status(), StatusCode::UNAUTHORIZED);
    }
}
