pub mod config;
pub mod crypto;
pub mod dtos;
pub mod handlers;
pub mod keywrap;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::Config;
use crate::middleware::{action_rate_limit_middleware, ActionLimit};
use crate::services::{
    AuditLogger, AuthService, AuthzService, Database, JwtService, KeyDistService, MfaService,
};
use huddle_core::error::AppError;
use huddle_core::ratelimit::RateCounter;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::registration::register,
        handlers::auth::session::login,
        handlers::auth::session::refresh,
        handlers::auth::session::logout,
        handlers::auth::session::logout_all,
        handlers::user::get_me,
        handlers::user::change_password,
        handlers::mfa::setup_totp,
        handlers::mfa::confirm_totp,
        handlers::mfa::verify_during_login,
        handlers::mfa::disable_totp,
        handlers::keys::register_device_key,
        handlers::keys::publish_wrapped_keys,
        handlers::keys::fetch_wrapped_key,
        handlers::keys::rotate_key_version,
        handlers::membership::list_members,
        handlers::membership::update_member_role,
        handlers::membership::remove_member,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::RefreshRequest,
            dtos::auth::LogoutRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::MeResponse,
            dtos::mfa::SetupTotpResponse,
            dtos::mfa::ConfirmTotpRequest,
            dtos::mfa::ConfirmTotpResponse,
            dtos::mfa::MfaVerifyRequest,
            dtos::mfa::DisableTotpRequest,
            dtos::keys::RegisterDeviceKeyRequest,
            dtos::keys::WrapEntry,
            dtos::keys::PublishWrappedKeysRequest,
            dtos::keys::PublishWrappedKeysResponse,
            dtos::keys::FetchWrappedKeyResponse,
            dtos::keys::RotateKeyVersionResponse,
            dtos::membership::UpdateMemberRoleRequest,
            dtos::membership::MembersResponse,
            models::Role,
            models::SanitizedUser,
            models::Organization,
            models::WrappedOrgKey,
            services::SessionTokens,
            services::MemberInfo,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login, and session lifecycle"),
        (name = "MFA", description = "TOTP and recovery-code flows"),
        (name = "Keys", description = "Organization key distribution"),
        (name = "Membership", description = "Roles and membership management"),
        (name = "User", description = "Current-user operations"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub jwt: JwtService,
    pub auth: AuthService,
    pub mfa: MfaService,
    pub keys: KeyDistService,
    pub authz: AuthzService,
    pub audit: AuditLogger,
    pub rate_counter: Arc<dyn RateCounter>,
}

impl AppState {
    /// Wire the service graph from its leaves up.
    pub fn build(
        config: Config,
        db: Database,
        jwt: JwtService,
        rate_counter: Arc<dyn RateCounter>,
    ) -> Result<Self, AppError> {
        let audit = AuditLogger::new(db.clone());
        let auth = AuthService::new(
            db.clone(),
            jwt.clone(),
            audit.clone(),
            config.mfa.challenge_ttl_minutes,
        )?;
        let mfa = MfaService::new(
            db.clone(),
            audit.clone(),
            config.security.totp_enc_key,
            config.security.recovery_pepper.clone(),
            config.mfa.issuer.clone(),
            config.mfa.challenge_max_attempts,
        );
        let authz = AuthzService::new(db.clone(), audit.clone());
        let keys = KeyDistService::new(db.clone(), authz.clone(), audit.clone());

        Ok(Self {
            config,
            db,
            jwt,
            auth,
            mfa,
            keys,
            authz,
            audit,
            rate_counter,
        })
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let rl = &state.config.rate_limit;

    // Per-action fixed-window limits on the credential endpoints.
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            ActionLimit::new(
                state.rate_counter.clone(),
                "login",
                rl.login_attempts,
                rl.login_window_seconds,
            ),
            action_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .layer(from_fn_with_state(
            ActionLimit::new(
                state.rate_counter.clone(),
                "register",
                rl.register_attempts,
                rl.register_window_seconds,
            ),
            action_rate_limit_middleware,
        ));

    let mfa_verify_route = Router::new()
        .route("/auth/mfa/verify", post(handlers::mfa::verify_during_login))
        .layer(from_fn_with_state(
            ActionLimit::new(
                state.rate_counter.clone(),
                "mfa_verify",
                rl.mfa_attempts,
                rl.mfa_window_seconds,
            ),
            action_rate_limit_middleware,
        ));

    // Everything behind the authentication gate.
    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route("/auth/me", get(handlers::user::get_me))
        .route("/auth/password", post(handlers::user::change_password))
        .route("/auth/mfa/totp/setup", post(handlers::mfa::setup_totp))
        .route("/auth/mfa/totp/confirm", post(handlers::mfa::confirm_totp))
        .route("/auth/mfa/totp/disable", post(handlers::mfa::disable_totp))
        .route("/keys/device", post(handlers::keys::register_device_key))
        .route(
            "/orgs/:org_id/keys/wraps",
            post(handlers::keys::publish_wrapped_keys),
        )
        .route(
            "/orgs/:org_id/keys/wrap",
            get(handlers::keys::fetch_wrapped_key),
        )
        .route(
            "/orgs/:org_id/keys/rotate",
            post(handlers::keys::rotate_key_version),
        )
        .route(
            "/orgs/:org_id/members",
            get(handlers::membership::list_members),
        )
        .route(
            "/orgs/:org_id/members/:user_id",
            axum::routing::patch(handlers::membership::update_member_role)
                .delete(handlers::membership::remove_member),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        )
        .route("/auth/refresh", post(handlers::auth::refresh))
        .merge(login_route)
        .merge(register_route)
        .merge(mfa_verify_route)
        .merge(protected_routes)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::HeaderName::from_static("x-csrf-token"),
                ])
                .allow_credentials(true),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Postgres health check failed");
        e
    })?;

    Ok(axum::Json(serde_json::json!({
        "ok": true,
        "service": state.config.service_name,
        "version": state.config.service_version,
        "checks": {
            "postgres": "up"
        }
    })))
}
