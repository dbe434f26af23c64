use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Identity and authorization core.
pub mod auth;
pub mod password;
pub mod policy;
pub mod service;
pub mod token;

// Application services and wiring.
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;

// Routing segregation (Public, Authenticated).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use password::{Argon2Verifier, CredentialState};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use service::AuthService;
pub use token::{CodecState, TokenCodec};

/// ApiDoc
///
/// OpenAPI description of every handler and wire schema, served at
/// `/api-docs/openapi.json` and browsable through `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::get_me, handlers::add_user, handlers::get_users,
        handlers::search_users, handlers::edit_user, handlers::delete_user
    ),
    components(
        schemas(
            models::UserView, models::UserList, models::LoginRequest, models::LoginResponse,
            models::CreateUserRequest, models::EditUserRequest,
        )
    ),
    tags(
        (name = "yanblog", description = "Blog admin account and session API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single shared container of services and configuration handed to every
/// handler. Everything in it is either immutable or internally synchronized.
#[derive(Clone)]
pub struct AppState {
    /// Account storage, also the user lookup of the auth core.
    pub repo: RepositoryState,
    /// Password hashing and verification.
    pub credentials: CredentialState,
    /// Session token signing and verification. Built once from the config.
    pub codec: CodecState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    pub fn new(repo: RepositoryState, credentials: CredentialState, config: AppConfig) -> Self {
        let codec = Arc::new(TokenCodec::new(&config.jwt_secret, config.jwt_issuer.clone()));
        Self {
            repo,
            credentials,
            codec,
            config,
        }
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(
            self.repo.clone(),
            self.credentials.clone(),
            self.codec.clone(),
        )
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for CodecState {
    fn from_ref(app_state: &AppState) -> CodecState {
        app_state.codec.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// session_middleware
///
/// The session gate in front of every authenticated route. `AuthUser` does the
/// validation; a failure rejects the request with 401 before the handler runs.
/// On success the identity is attached to the request for downstream extractors.
async fn session_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .nest(
            "/api/v1",
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                session_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span so every log line of one request carries the
/// same `req_id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
