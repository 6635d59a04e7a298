use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{authz::Deny, hash::HashError, storage::StorageError};

/// ApiError
///
/// The unified error taxonomy for the request path. Every handler returns
/// `Result<_, ApiError>`; the `IntoResponse` implementation below is the single
/// place where errors are translated into HTTP statuses, so nothing escapes the
/// request boundary untyped.
///
/// Status mapping:
/// - `BadRequest` 400: malformed or missing input, checked before authorization.
/// - `Unauthorized` 401: absent-but-required or invalid credential.
/// - `InvalidCredentials` 403: failed login attempt. Unknown username, wrong
///   password and unreadable stored digests all collapse into this one variant.
/// - `Forbidden` 403: authenticated principal without the required capability
///   or ownership.
/// - `NotFound` 404: resource absent, reported independently of authorization.
/// - `Conflict` 409: duplicate resource (username, image name).
/// - `Database` / `Storage` / `Hash` 500: infrastructure failure. Logged with
///   the cause; the response body stays opaque.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("database failure")]
    Database(#[from] sqlx::Error),

    #[error("storage failure")]
    Storage(#[from] StorageError),

    #[error("hashing failure")]
    Hash(#[from] HashError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Conflict(msg.into())
    }
}

/// Authorization verdicts map straight onto the taxonomy: a missing principal
/// is a credential problem (401), an insufficient one is a permission problem (403).
impl From<Deny> for ApiError {
    fn from(deny: Deny) -> Self {
        match deny {
            Deny::Unauthenticated => ApiError::Unauthorized,
            Deny::Forbidden => ApiError::Forbidden,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::InvalidCredentials => (
                StatusCode::FORBIDDEN,
                "Invalid username or password".to_string(),
            ),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            ApiError::Storage(e) => {
                tracing::error!("storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            ApiError::Hash(e) => {
                tracing::error!("hashing error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };
        (status, body).into_response()
    }
}
