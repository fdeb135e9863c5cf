//! Services layer for huddle-auth.
//!
//! Business logic for credentials, sessions, MFA, authorization, and key
//! distribution. Persistence goes through [`Database`] only.

mod audit;
mod auth;
mod authz;
mod database;
mod jwt;
mod keydist;
mod mfa;

pub use audit::{AuditAction, AuditLogger};
pub use auth::{
    generate_opaque_token, hash_refresh_token, AuthService, LoginOutcome, SessionTokens,
};
pub use authz::{AuthzService, MemberInfo};
pub use database::Database;
pub use jwt::{AccessTokenClaims, JwtService};
pub use keydist::{KeyDistService, WrapSubmission};
pub use mfa::MfaService;
