use crate::{
    AppState,
    auth::{AuthUser, MaybeUser},
    authz::{self, Capability, CapabilitySet, authorize},
    error::ApiError,
    hash::{hash_password, verify_password},
    models::{
        ChangePasswordRequest, CreatePostRequest, CreateUserRequest, ImageSummary, LoginRequest,
        LoginResponse, Post, PostRef, PostSummary, SetPasswordRequest, UpdatePostRequest,
        UpdateUsernameRequest, UserEnvelope, UserPublic,
    },
    storage::sanitize_name,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// Upload constraints for the image endpoint, matching the published client
/// contract.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const ALLOWED_IMAGE_TYPES: [&str; 8] = [
    "image/png",
    "image/jpg",
    "image/jpeg",
    "image/gif",
    "image/svg+xml",
    "image/webp",
    "image/avif",
    "image/apng",
];

// --- Auth ---

/// login
///
/// [Public Route] Exchanges a username/password pair for an opaque bearer
/// token. Unknown usernames and wrong passwords are indistinguishable to the
/// caller; nothing is persisted on a failed attempt. Multiple concurrent
/// sessions per user are allowed: each login issues an independent token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Missing fields or already logged in"),
        (status = 403, description = "Invalid username or password")
    )
)]
pub async fn login(
    MaybeUser(current): MaybeUser,
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if current.is_some() {
        return Err(ApiError::bad_request("Already logged in"));
    }
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Missing username or password"));
    }

    let Some(user) = state.repo.find_user_by_username(&payload.username).await? else {
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    let issued = state.tokens.issue(user.id).await?;
    Ok(Json(LoginResponse {
        token: issued.token,
        user: UserPublic {
            id: user.id,
            username: user.username,
        },
    }))
}

/// logout_all
///
/// [Authenticated Route] Revokes every live token belonging to the caller,
/// ending all of their sessions at once.
#[utoipa::path(
    delete,
    path = "/api/v1/auth/sessions",
    responses((status = 204, description = "All sessions revoked"))
)]
pub async fn logout_all(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.tokens.revoke_all(principal.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Meta ---

/// API index. Kept for clients probing the version root.
#[utoipa::path(get, path = "/api/v1/", responses((status = 418, description = "I'm a teapot")))]
pub async fn teapot() -> (StatusCode, &'static str) {
    (StatusCode::IM_A_TEAPOT, "I'm a teapot")
}

// --- Posts ---

/// list_posts
///
/// [Public Route] Lists all posts without their bodies.
#[utoipa::path(
    get,
    path = "/api/v1/posts",
    responses((status = 200, description = "Posts", body = [PostSummary]))
)]
pub async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<PostSummary>>, ApiError> {
    Ok(Json(state.repo.list_posts().await?))
}

/// get_post
///
/// [Public Route] Retrieves a single post, body included.
#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Post>, ApiError> {
    let post = state.repo.find_post(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(post))
}

/// create_post
///
/// [Authenticated Route] Creates a post authored by the caller. Requires the
/// `managePosts` capability (or `admin`).
#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 200, description = "Created", body = PostRef),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn create_post(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<Json<PostRef>, ApiError> {
    if payload.title.is_empty() {
        return Err(ApiError::bad_request("Missing title"));
    }
    if payload.content.is_empty() {
        return Err(ApiError::bad_request("Missing content"));
    }

    authorize(Some(&principal), &authz::CREATE_POST, None)?;

    let id = state
        .repo
        .create_post(&payload.title, &payload.content, principal.id)
        .await?;
    Ok(Json(PostRef { id }))
}

/// update_own_post
///
/// [Authenticated Route] Edits a post through the self-scoped route. The
/// author may always edit their own post; anyone else needs `managePosts`
/// (or `admin`). Guard order: input (400), existence (404), permission (403).
#[utoipa::path(
    patch,
    path = "/api/v1/posts/me/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = PostRef),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_own_post(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<PostRef>, ApiError> {
    if payload.title.is_empty() {
        return Err(ApiError::bad_request("Missing title"));
    }
    if payload.content.is_empty() {
        return Err(ApiError::bad_request("Missing content"));
    }

    let post = state.repo.find_post(id).await?.ok_or(ApiError::NotFound)?;
    authorize(Some(&principal), &authz::EDIT_OWN_POST, Some(post.author_id))?;

    state
        .repo
        .update_post(id, &payload.title, &payload.content)
        .await?;
    Ok(Json(PostRef { id }))
}

/// delete_own_post
///
/// [Authenticated Route] Deletes a post through the self-scoped route, same
/// policy as editing.
#[utoipa::path(
    delete,
    path = "/api/v1/posts/me/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_own_post(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<&'static str, ApiError> {
    let post = state.repo.find_post(id).await?.ok_or(ApiError::NotFound)?;
    authorize(
        Some(&principal),
        &authz::DELETE_OWN_POST,
        Some(post.author_id),
    )?;

    state.repo.delete_post(id).await?;
    Ok("Post deleted")
}

/// update_any_post
///
/// [Admin Route] Edits any post regardless of ownership.
#[utoipa::path(
    patch,
    path = "/api/v1/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = PostRef),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_any_post(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<PostRef>, ApiError> {
    if payload.title.is_empty() {
        return Err(ApiError::bad_request("Missing title"));
    }
    if payload.content.is_empty() {
        return Err(ApiError::bad_request("Missing content"));
    }

    let post = state.repo.find_post(id).await?.ok_or(ApiError::NotFound)?;
    authorize(Some(&principal), &authz::EDIT_ANY_POST, Some(post.author_id))?;

    state
        .repo
        .update_post(id, &payload.title, &payload.content)
        .await?;
    Ok(Json(PostRef { id }))
}

/// delete_any_post
///
/// [Admin Route] Deletes any post regardless of ownership.
#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_any_post(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<&'static str, ApiError> {
    let post = state.repo.find_post(id).await?.ok_or(ApiError::NotFound)?;
    authorize(
        Some(&principal),
        &authz::DELETE_ANY_POST,
        Some(post.author_id),
    )?;

    state.repo.delete_post(id).await?;
    Ok("Post deleted")
}

// --- Users ---

/// create_user
///
/// [Admin Route] Creates an account with a hashed password and an explicit
/// capability grant. Unknown capability names are rejected rather than
/// silently dropped, since the caller is an administrator stating intent.
#[utoipa::path(
    post,
    path = "/api/v1/user",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "Created", body = UserPublic),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Username already exists")
    )
)]
pub async fn create_user(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserPublic>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::bad_request("Missing username"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Missing password"));
    }
    let Some(names) = payload.permissions else {
        return Err(ApiError::bad_request("Invalid permissions"));
    };
    let mut capabilities = CapabilitySet::new();
    for name in &names {
        match Capability::parse(name) {
            Some(cap) => capabilities.insert(cap),
            None => return Err(ApiError::bad_request("Invalid permissions")),
        }
    }

    authorize(Some(&principal), &authz::CREATE_USER, None)?;

    let digest = hash_password(&payload.password)?;
    let Some(user) = state
        .repo
        .create_user(&payload.username, &digest, &capabilities.names())
        .await?
    else {
        return Err(ApiError::conflict("Username already exists"));
    };
    Ok(Json(user))
}

/// update_own_username
///
/// [Authenticated Route] Renames the caller's own account. Self-scoped: no
/// capability needed.
#[utoipa::path(
    patch,
    path = "/api/v1/user/me",
    request_body = UpdateUsernameRequest,
    responses((status = 200, description = "Updated", body = UserPublic))
)]
pub async fn update_own_username(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateUsernameRequest>,
) -> Result<Json<UserPublic>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::bad_request("Missing username"));
    }

    authorize(
        Some(&principal),
        &authz::EDIT_OWN_PROFILE,
        Some(principal.id),
    )?;

    // The account can disappear between authentication and this update.
    let user = state
        .repo
        .update_username(principal.id, &payload.username)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(user))
}

/// update_username
///
/// [Admin Route] Renames any account.
#[utoipa::path(
    patch,
    path = "/api/v1/user/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUsernameRequest,
    responses(
        (status = 200, description = "Updated", body = UserPublic),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_username(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUsernameRequest>,
) -> Result<Json<UserPublic>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::bad_request("Missing username"));
    }

    let target = state
        .repo
        .find_user_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize(Some(&principal), &authz::EDIT_ANY_USER, Some(target.id))?;

    let user = state
        .repo
        .update_username(id, &payload.username)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(user))
}

/// delete_own_account
///
/// [Authenticated Route] Deletes the caller's account and revokes every token
/// it owned, so residual sessions die with it.
#[utoipa::path(
    delete,
    path = "/api/v1/user/me",
    responses((status = 200, description = "Account deleted"))
)]
pub async fn delete_own_account(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
) -> Result<&'static str, ApiError> {
    authorize(
        Some(&principal),
        &authz::DELETE_OWN_ACCOUNT,
        Some(principal.id),
    )?;

    if !state.repo.delete_user(principal.id).await? {
        return Err(ApiError::NotFound);
    }
    state.tokens.revoke_all(principal.id).await?;
    Ok("Account deleted")
}

/// delete_user
///
/// [Admin Route] Deletes any account plus its tokens.
#[utoipa::path(
    delete,
    path = "/api/v1/user/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_user(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<&'static str, ApiError> {
    let target = state
        .repo
        .find_user_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize(Some(&principal), &authz::DELETE_ANY_USER, Some(target.id))?;

    state.repo.delete_user(target.id).await?;
    state.tokens.revoke_all(target.id).await?;
    Ok("User deleted")
}

/// change_own_password
///
/// [Authenticated Route] Rotates the caller's password after verifying the
/// current one, then revokes all of their tokens: every session must
/// re-authenticate with the new password. Requests already past token
/// resolution when the revocation commits are allowed to finish.
#[utoipa::path(
    patch,
    path = "/api/v1/user/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = UserEnvelope),
        (status = 400, description = "Missing or unchanged password"),
        (status = 403, description = "Invalid password")
    )
)]
pub async fn change_own_password(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<UserEnvelope>, ApiError> {
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Missing password"));
    }
    if payload.new_password.is_empty() {
        return Err(ApiError::bad_request("Missing new password"));
    }
    if payload.password == payload.new_password {
        return Err(ApiError::bad_request(
            "New password is the same as old password",
        ));
    }

    authorize(
        Some(&principal),
        &authz::CHANGE_OWN_PASSWORD,
        Some(principal.id),
    )?;

    let user = state
        .repo
        .find_user_by_id(principal.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    let digest = hash_password(&payload.new_password)?;
    state
        .repo
        .update_user_password(user.id, &digest)
        .await?;
    state.tokens.revoke_all(user.id).await?;

    Ok(Json(UserEnvelope {
        user: UserPublic {
            id: user.id,
            username: user.username,
        },
    }))
}

/// set_password
///
/// [Admin Route] Overwrites another user's password without knowing the old
/// one, revoking that user's tokens. Self-service goes through
/// `/user/me/password` so the current-password check cannot be bypassed.
#[utoipa::path(
    patch,
    path = "/api/v1/user/{id}/password",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetPasswordRequest,
    responses(
        (status = 200, description = "Password set", body = UserEnvelope),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn set_password(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<Json<UserEnvelope>, ApiError> {
    if id == principal.id {
        return Err(ApiError::bad_request("Use /user/me/password instead"));
    }
    if payload.new_password.is_empty() {
        return Err(ApiError::bad_request("Missing new password"));
    }

    let target = state
        .repo
        .find_user_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize(Some(&principal), &authz::SET_ANY_PASSWORD, Some(target.id))?;

    let digest = hash_password(&payload.new_password)?;
    state
        .repo
        .update_user_password(target.id, &digest)
        .await?;
    state.tokens.revoke_all(target.id).await?;

    Ok(Json(UserEnvelope {
        user: UserPublic {
            id: target.id,
            username: target.username,
        },
    }))
}

// --- Images ---

/// upload_image
///
/// [Authenticated Route] Accepts a multipart `file` field, constrained to the
/// image MIME allow-list and 5 MiB. Requires the `uploadImages` capability
/// (or `admin`). The stored name is derived from the uploaded filename
/// (lowercased, spaces to dashes, path components stripped); the database row
/// reserves the name atomically, and the bytes are written only after the
/// reservation succeeds.
#[utoipa::path(
    post,
    path = "/api/v1/image",
    responses(
        (status = 200, description = "Uploaded", body = ImageSummary),
        (status = 400, description = "Missing or invalid file"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Image already exists")
    )
)]
pub async fn upload_image(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImageSummary>, ApiError> {
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("File size cannot be larger than 5MB!"))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|_| ApiError::bad_request("File size cannot be larger than 5MB!"))?;
            file = Some((file_name, content_type, bytes));
            break;
        }
    }

    let Some((file_name, content_type, bytes)) = file else {
        return Err(ApiError::bad_request("Missing file"));
    };
    if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(ApiError::bad_request(
            "Image type should be: .jpeg, .jpg and .png!",
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::bad_request("File size cannot be larger than 5MB!"));
    }

    let name = sanitize_name(&file_name.to_lowercase().split(' ').collect::<Vec<_>>().join("-"));
    if name.is_empty() {
        return Err(ApiError::bad_request("Missing file"));
    }

    authorize(Some(&principal), &authz::UPLOAD_IMAGE, None)?;

    let Some(image) = state.repo.create_image(&name, principal.id).await? else {
        return Err(ApiError::conflict("Image already exists"));
    };

    if let Err(e) = state.storage.store(&name, &bytes).await {
        // Give the name back if the bytes never made it to disk.
        if let Err(cleanup) = state.repo.delete_image(image.id).await {
            tracing::error!("failed to roll back image record {}: {:?}", image.id, cleanup);
        }
        return Err(e.into());
    }

    Ok(Json(image))
}

/// my_images
///
/// [Authenticated Route] Lists the caller's own images.
#[utoipa::path(
    get,
    path = "/api/v1/images/me",
    responses((status = 200, description = "My images", body = [ImageSummary]))
)]
pub async fn my_images(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ImageSummary>>, ApiError> {
    Ok(Json(state.repo.list_images_by_owner(principal.id).await?))
}

/// get_image
///
/// [Authenticated Route] Image metadata by id. Any authenticated user may
/// look up any image.
#[utoipa::path(
    get,
    path = "/api/v1/images/{id}",
    params(("id" = i64, Path, description = "Image ID")),
    responses(
        (status = 200, description = "Image", body = ImageSummary),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_image(
    AuthUser(_principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ImageSummary>, ApiError> {
    let image = state
        .repo
        .find_image(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(ImageSummary {
        id: image.id,
        name: image.name,
    }))
}

/// delete_own_image
///
/// [Authenticated Route] Deletes one of the caller's own images: strictly
/// ownership-gated, no capability grants access here (admins use the
/// unscoped route). File bytes go first, then the metadata row.
#[utoipa::path(
    delete,
    path = "/api/v1/images/me/{id}",
    params(("id" = i64, Path, description = "Image ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_own_image(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<&'static str, ApiError> {
    let image = state
        .repo
        .find_image(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize(
        Some(&principal),
        &authz::DELETE_OWN_IMAGE,
        Some(image.owner_id),
    )?;

    state.storage.remove(&image.name).await?;
    state.repo.delete_image(image.id).await?;
    Ok("Image deleted")
}

/// delete_image
///
/// [Admin Route] Deletes any image regardless of ownership.
#[utoipa::path(
    delete,
    path = "/api/v1/images/{id}",
    params(("id" = i64, Path, description = "Image ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_image(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<&'static str, ApiError> {
    let image = state
        .repo
        .find_image(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize(
        Some(&principal),
        &authz::DELETE_ANY_IMAGE,
        Some(image.owner_id),
    )?;

    state.storage.remove(&image.name).await?;
    state.repo.delete_image(image.id).await?;
    Ok("Image deleted")
}
