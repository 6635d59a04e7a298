use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, patch, post},
};

/// Admin Router Module
///
/// Defines the routes whose access policies require the `admin` capability:
/// moderation of any post or image and full user management.
///
/// Access Control:
/// These routes share the authentication gate with the authenticated module.
/// The capability requirement itself is declared per operation in `authz` and
/// enforced by `authorize` inside each handler, so an authenticated
/// non-admin receives 403 (after the 404 existence check, which is
/// deliberately not hidden from authenticated callers).
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // PATCH/DELETE /api/v1/posts/{id}
        // Moderation of any post regardless of author.
        .route(
            "/posts/{id}",
            patch(handlers::update_any_post).delete(handlers::delete_any_post),
        )
        // POST /api/v1/user
        // Account provisioning with an explicit capability grant.
        .route("/user", post(handlers::create_user))
        // PATCH/DELETE /api/v1/user/{id}
        .route(
            "/user/{id}",
            patch(handlers::update_username).delete(handlers::delete_user),
        )
        // PATCH /api/v1/user/{id}/password
        // Password reset for another account; revokes that account's tokens.
        .route("/user/{id}/password", patch(handlers::set_password))
        // DELETE /api/v1/images/{id}
        // Removes any image regardless of owner.
        .route("/images/{id}", delete(handlers::delete_image))
}
