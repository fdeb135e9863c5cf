mod auth;
mod rate_limit;

pub use auth::{auth_middleware, AuthUser, ACCESS_COOKIE, CSRF_COOKIE, REFRESH_COOKIE};
pub use rate_limit::{action_rate_limit_middleware, ActionLimit};
