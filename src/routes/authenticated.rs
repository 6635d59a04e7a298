use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
};

/// Authenticated Router Module
///
/// Defines the routes accessible to any caller who passed the authentication
/// gate. Every handler receives a validated `AuthUser`; ownership and
/// capability checks run through the per-operation access policies.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // DELETE /api/v1/auth/sessions
        // Revokes every token the caller owns (logout everywhere).
        .route("/auth/sessions", delete(handlers::logout_all))
        // --- Posts ---
        // POST /api/v1/posts
        // Creates a post authored by the caller. Policy: managePosts.
        .route("/posts", post(handlers::create_post))
        // PATCH/DELETE /api/v1/posts/me/{id}
        // Self-scoped post management: the author may always act on their own
        // post; otherwise managePosts is required.
        .route(
            "/posts/me/{id}",
            patch(handlers::update_own_post).delete(handlers::delete_own_post),
        )
        // --- Account self-service ---
        // PATCH/DELETE /api/v1/user/me
        .route(
            "/user/me",
            patch(handlers::update_own_username).delete(handlers::delete_own_account),
        )
        // PATCH /api/v1/user/me/password
        // Verifies the current password, stores the new digest and revokes all
        // of the caller's tokens.
        .route("/user/me/password", patch(handlers::change_own_password))
        // --- Images ---
        // POST /api/v1/image
        // Multipart upload. The body limit sits just above the 5 MiB file cap
        // so the handler can answer oversized files itself.
        .route(
            "/image",
            post(handlers::upload_image)
                .layer(DefaultBodyLimit::max(handlers::MAX_IMAGE_BYTES + 64 * 1024)),
        )
        // GET /api/v1/images/me
        .route("/images/me", get(handlers::my_images))
        // DELETE /api/v1/images/me/{id}
        // Strictly ownership-gated; no capability opens this route.
        .route("/images/me/{id}", delete(handlers::delete_own_image))
        // GET /api/v1/images/{id}
        // Metadata lookup, available to any authenticated user.
        .route("/images/{id}", get(handlers::get_image))
}
