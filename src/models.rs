use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Application Schemas (Mapped to Database) ---

/// UserRecord
///
/// The user's canonical identity row from the `users` table, including the
/// password digest and raw permission names. This struct never crosses the
/// serialization boundary: anything handed to a client goes through
/// `UserPublic`, and the principal attached to a request is built from this
/// row by the token store.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    // Argon2 PHC string. Opaque outside the hash module.
    pub password_hash: String,
    // Stored capability names ("admin", "managePosts", "uploadImages").
    pub permissions: Vec<String>,
}

/// UserPublic
///
/// The public projection of a user: what login responses, user management
/// endpoints and password updates return. Deliberately excludes the digest
/// and the permission list.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct UserPublic {
    pub id: Uuid,
    pub username: String,
}

/// Envelope used by the password endpoints, mirroring their `{ "user": ... }`
/// response shape.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserEnvelope {
    pub user: UserPublic,
}

/// Post
///
/// A full post record from the `posts` table. Ownership (`author_id`) is set
/// at creation and never changes.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// PostSummary
///
/// The listing projection: everything except the body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct PostSummary {
    pub id: Uuid,
    pub title: String,
    pub author_id: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Reference returned by post create/update endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PostRef {
    pub id: Uuid,
}

/// Image
///
/// An image record from the `images` table. The file bytes live with the
/// storage service under `name`; this row only carries metadata and ownership.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Image {
    pub id: i64,
    pub name: String,
    pub owner_id: Uuid,
}

/// ImageSummary
///
/// The client-facing projection of an image: id and name, never the owner.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ImageSummary {
    pub id: i64,
    pub name: String,
}

/// TokenRecord
///
/// A bearer-token row from the `tokens` table. Only the token store reads
/// these.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRecord {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---
//
// String fields default to "" on missing JSON keys so that handlers can apply
// their own emptiness checks and answer 400 (not a deserializer 422) for
// absent input.

/// Input payload for POST /auth/login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Output of a successful login: the opaque bearer token plus the public user
/// projection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserPublic,
}

/// Input payload for POST /posts.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Input payload for the post update endpoints. Both fields are required;
/// partial updates are not part of the contract.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Input payload for POST /user (admin-created accounts).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Capability names to grant. Unknown names are rejected with 400.
    pub permissions: Option<Vec<String>>,
}

/// Input payload for the username update endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUsernameRequest {
    #[serde(default)]
    pub username: String,
}

/// Input payload for PATCH /user/me/password.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Input payload for PATCH /user/{id}/password (admin-set).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SetPasswordRequest {
    #[serde(default)]
    pub new_password: String,
}
