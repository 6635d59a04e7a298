use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
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

// Core application services and components.
pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hash;
pub mod models;
pub mod repository;
pub mod storage;
pub mod tokens;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::{AuthUser, MaybeUser};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the main application entry point (main.rs).
pub use config::{AppConfig, Env};
pub use error::ApiError;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{DiskStorage, MemoryStorage, StorageState};
pub use tokens::TokenStore;

/// ApiDoc
///
/// Auto-generates the OpenAPI documentation (Swagger JSON) for the
/// application from the `#[utoipa::path]` and `#[derive(utoipa::ToSchema)]`
/// annotations. The resulting JSON is served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::logout_all, handlers::teapot,
        handlers::list_posts, handlers::get_post, handlers::create_post,
        handlers::update_own_post, handlers::delete_own_post,
        handlers::update_any_post, handlers::delete_any_post,
        handlers::create_user, handlers::update_own_username,
        handlers::update_username, handlers::delete_own_account,
        handlers::delete_user, handlers::change_own_password,
        handlers::set_password, handlers::upload_image, handlers::my_images,
        handlers::get_image, handlers::delete_own_image, handlers::delete_image
    ),
    components(
        schemas(
            models::UserPublic, models::UserEnvelope, models::Post,
            models::PostSummary, models::PostRef, models::Image,
            models::ImageSummary, models::LoginRequest, models::LoginResponse,
            models::CreatePostRequest, models::UpdatePostRequest,
            models::CreateUserRequest, models::UpdateUsernameRequest,
            models::ChangePasswordRequest, models::SetPasswordRequest,
        )
    ),
    tags(
        (name = "content-portal", description = "Multi-tenant content API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Implements the **Unified State Pattern**: the single, thread-safe,
/// immutable container holding all essential application services and
/// configuration, shared across all incoming requests.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: abstracts database access via the PgPool connection.
    pub repo: RepositoryState,
    /// Storage Layer: abstracts the image file store.
    pub storage: StorageState,
    /// Token Store: issues and resolves opaque bearer tokens.
    pub tokens: TokenStore,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// These implementations allow extractors and handlers to selectively pull
// components from the shared AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for TokenStore {
    fn from_ref(app_state: &AppState) -> TokenStore {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the protected route groups.
///
/// *Mechanism*: it attempts to extract `AuthUser` from the request. Since
/// `AuthUser` implements `FromRequestParts`, if authentication (token
/// resolution, owner lookup) fails, the extractor immediately rejects the
/// request with 401, preventing execution of the handler. Handlers behind the
/// gate extract `AuthUser` again to receive the principal as an explicit
/// argument.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// credential_middleware
///
/// Applied across the whole API surface, public routes included. `MaybeUser`
/// lets credential-less requests through untouched but rejects any request
/// that *presents* a credential which does not resolve: a failed
/// authentication attempt is never downgraded to anonymous access, even on
/// endpoints that would have served an anonymous caller.
async fn credential_middleware(_user: MaybeUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// ensure_admin_user
///
/// Startup bootstrap: on an empty users table in the local environment,
/// creates a default `admin`/`admin` account holding the `admin` capability so
/// a fresh database is immediately usable. Production never fabricates
/// credentials; it logs a warning and leaves provisioning to the operator.
pub async fn ensure_admin_user(repo: &RepositoryState, config: &AppConfig) -> Result<(), ApiError> {
    if repo.count_users().await? > 0 {
        return Ok(());
    }

    match config.env {
        Env::Local => {
            let digest = hash::hash_password("admin")?;
            if let Some(user) = repo
                .create_user("admin", &digest, &["admin".to_string()])
                .await?
            {
                tracing::warn!(
                    "created default admin account '{}' ({}); change its password before exposing this instance",
                    user.username,
                    user.id
                );
            }
        }
        Env::Production => {
            tracing::warn!("users table is empty; provision an admin account manually");
        }
    }
    Ok(())
}

/// create_router
///
/// Assembles the application's entire routing structure, applies global and
/// scoped middleware, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Protected Routes: authenticated and admin groups share one
    // authentication gate; capability checks run inside the handlers via the
    // declared access policies.
    let protected = authenticated::authenticated_routes()
        .merge(admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 3. Base Router Assembly
    let base_router = Router::new()
        // Documentation: serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // GET /health
        // Unauthenticated liveness probe for monitors and load balancers.
        .route("/health", get(|| async { "ok" }))
        // The versioned API surface. The credential gate covers public routes
        // too: no credential passes, an invalid one never does.
        .nest(
            "/api/v1",
            public::public_routes().merge(protected).route_layer(
                middleware::from_fn_with_state(state.clone(), credential_middleware),
            ),
        )
        // Apply the Unified State to all routes.
        .with_state(state);

    // 4. Observability and Correlation Layers (applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation: a unique UUID for every request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing: wraps the request/response lifecycle in
                // a span correlated by the generated request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation: returns x-request-id to the
                // client and downstream services.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Helper used by `TraceLayer` to customize span creation: extracts the
/// `x-request-id` header (if present) and includes it in the structured
/// logging metadata alongside the HTTP method and URI, so every log line for
/// a single request is correlated by a unique ID.
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
