use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Defines endpoints that are accessible to any client, anonymous or
/// logged-in. Read-only post access and the login gateway live here.
///
/// A client presenting an *invalid* credential is still rejected with 401 on
/// these routes; the optional-authentication extractor treats a bad token as
/// an error, never as anonymity.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /api/v1/
        // Version-root probe. Returns 418 to anything that asks.
        .route("/", get(handlers::teapot))
        // POST /api/v1/auth/login
        // Exchanges credentials for an opaque bearer token.
        .route("/auth/login", post(handlers::login))
        // GET /api/v1/posts
        // Lists all posts (summaries only).
        .route("/posts", get(handlers::list_posts))
        // GET /api/v1/posts/{id}
        // Retrieves a full post.
        .route("/posts/{id}", get(handlers::get_post))
}
