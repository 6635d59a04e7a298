use async_trait::async_trait;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use content_portal::{
    AppState, TokenStore,
    auth::{AuthUser, MaybeUser, Principal},
    authz::CapabilitySet,
    config::AppConfig,
    error::ApiError,
    handlers,
    hash::hash_password,
    models::{
        ChangePasswordRequest, CreatePostRequest, CreateUserRequest, Image, ImageSummary,
        LoginRequest, Post, PostSummary, SetPasswordRequest, TokenRecord, UpdatePostRequest,
        UserPublic, UserRecord,
    },
    repository::Repository,
    storage::MemoryStorage,
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::test;
use uuid::Uuid;

// --- MOCK REPOSITORY IMPLEMENTATION ---

// The central control point for handler tests: pre-canned rows in, call
// counters out. Handlers rely on the Repository trait, so the mock stands in
// for Postgres entirely.
#[derive(Default)]
struct MockRepoControl {
    user_by_username: Option<UserRecord>,
    user_by_id: Option<UserRecord>,
    post: Option<Post>,
    image: Option<Image>,
    // None simulates a taken username.
    create_user_result: Option<UserPublic>,

    tokens_issued: AtomicUsize,
    tokens_revoked: AtomicUsize,
    posts_updated: AtomicUsize,
    posts_deleted: AtomicUsize,
}

#[async_trait]
impl Repository for MockRepoControl {
    async fn find_user_by_username(
        &self,
        _username: &str,
    ) -> Result<Option<UserRecord>, sqlx::Error> {
        Ok(self.user_by_username.clone())
    }
    async fn find_user_by_id(&self, _id: Uuid) -> Result<Option<UserRecord>, sqlx::Error> {
        Ok(self.user_by_id.clone())
    }
    async fn create_user(
        &self,
        _username: &str,
        _password_hash: &str,
        _permissions: &[String],
    ) -> Result<Option<UserPublic>, sqlx::Error> {
        Ok(self.create_user_result.clone())
    }
    async fn update_username(
        &self,
        id: Uuid,
        username: &str,
    ) -> Result<Option<UserPublic>, sqlx::Error> {
        Ok(Some(UserPublic {
            id,
            username: username.to_string(),
        }))
    }
    async fn update_user_password(
        &self,
        _id: Uuid,
        _password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        Ok(true)
    }
    async fn delete_user(&self, _id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(true)
    }
    async fn count_users(&self) -> Result<i64, sqlx::Error> {
        Ok(1)
    }
    async fn create_token(
        &self,
        _token: &str,
        _user_id: Uuid,
        _created_at: DateTime<Utc>,
        _expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        self.tokens_issued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    async fn find_token(&self, _token: &str) -> Result<Option<TokenRecord>, sqlx::Error> {
        Ok(None)
    }
    async fn delete_token(&self, _token: &str) -> Result<bool, sqlx::Error> {
        Ok(true)
    }
    async fn delete_tokens_by_user(&self, _user_id: Uuid) -> Result<u64, sqlx::Error> {
        self.tokens_revoked.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }
    async fn list_posts(&self) -> Result<Vec<PostSummary>, sqlx::Error> {
        Ok(vec![])
    }
    async fn find_post(&self, _id: Uuid) -> Result<Option<Post>, sqlx::Error> {
        Ok(self.post.clone())
    }
    async fn create_post(
        &self,
        _title: &str,
        _content: &str,
        _author_id: Uuid,
    ) -> Result<Uuid, sqlx::Error> {
        Ok(Uuid::new_v4())
    }
    async fn update_post(
        &self,
        _id: Uuid,
        _title: &str,
        _content: &str,
    ) -> Result<bool, sqlx::Error> {
        self.posts_updated.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
    async fn delete_post(&self, _id: Uuid) -> Result<bool, sqlx::Error> {
        self.posts_deleted.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
    async fn create_image(
        &self,
        name: &str,
        _owner_id: Uuid,
    ) -> Result<Option<ImageSummary>, sqlx::Error> {
        Ok(Some(ImageSummary {
            id: 1,
            name: name.to_string(),
        }))
    }
    async fn find_image(&self, _id: i64) -> Result<Option<Image>, sqlx::Error> {
        Ok(self.image.clone())
    }
    async fn list_images_by_owner(
        &self,
        _owner_id: Uuid,
    ) -> Result<Vec<ImageSummary>, sqlx::Error> {
        Ok(vec![])
    }
    async fn delete_image(&self, _id: i64) -> Result<bool, sqlx::Error> {
        Ok(true)
    }
}

// --- TEST UTILITIES ---

const OWNER_ID: Uuid = Uuid::from_u128(123);
const OTHER_ID: Uuid = Uuid::from_u128(456);
const ADMIN_ID: Uuid = Uuid::from_u128(789);

fn create_test_state(repo_control: MockRepoControl) -> (AppState, Arc<MockRepoControl>) {
    let control = Arc::new(repo_control);
    let repo: Arc<dyn Repository> = control.clone();
    let state = AppState {
        repo: repo.clone(),
        storage: Arc::new(MemoryStorage::new()),
        tokens: TokenStore::new(repo, 24),
        config: AppConfig::default(),
    };
    (state, control)
}

fn principal(id: Uuid, capabilities: &[&str]) -> Principal {
    Principal {
        id,
        username: format!("user-{}", id.simple()),
        capabilities: CapabilitySet::from_names(capabilities.iter().copied()),
    }
}

fn admin_user() -> AuthUser {
    AuthUser(principal(ADMIN_ID, &["admin"]))
}
fn author_user() -> AuthUser {
    AuthUser(principal(OWNER_ID, &["managePosts"]))
}
fn plain_user(id: Uuid) -> AuthUser {
    AuthUser(principal(id, &[]))
}

fn owned_post() -> Post {
    Post {
        id: Uuid::from_u128(1),
        title: "First".to_string(),
        content: "Body".to_string(),
        author_id: OWNER_ID,
        created_at: Utc::now(),
    }
}

fn status_of(err: ApiError) -> StatusCode {
    err.into_response().status()
}

// --- LOGIN ---

#[test]
async fn login_with_wrong_password_issues_nothing() {
    let digest = hash_password("right-password").unwrap();
    let (state, control) = create_test_state(MockRepoControl {
        user_by_username: Some(UserRecord {
            id: OWNER_ID,
            username: "alice".to_string(),
            password_hash: digest,
            permissions: vec![],
        }),
        ..MockRepoControl::default()
    });

    for _ in 0..2 {
        let result = handlers::login(
            MaybeUser(None),
            State(state.clone()),
            Json(LoginRequest {
                username: "alice".to_string(),
                password: "wrong-password".to_string(),
            }),
        )
        .await;
        assert_eq!(status_of(result.unwrap_err()), StatusCode::FORBIDDEN);
    }

    // Two failed attempts, zero side effects on the token store.
    assert_eq!(control.tokens_issued.load(Ordering::SeqCst), 0);
}

#[test]
async fn login_unknown_user_matches_wrong_password() {
    let (state, _) = create_test_state(MockRepoControl::default());

    let result = handlers::login(
        MaybeUser(None),
        State(state),
        Json(LoginRequest {
            username: "nobody".to_string(),
            password: "whatever".to_string(),
        }),
    )
    .await;

    // Same status and body as a wrong password: no username oracle.
    assert_eq!(status_of(result.unwrap_err()), StatusCode::FORBIDDEN);
}

#[test]
async fn login_success_returns_token_and_public_projection() {
    let digest = hash_password("hunter2").unwrap();
    let (state, control) = create_test_state(MockRepoControl {
        user_by_username: Some(UserRecord {
            id: OWNER_ID,
            username: "alice".to_string(),
            password_hash: digest,
            permissions: vec!["managePosts".to_string()],
        }),
        ..MockRepoControl::default()
    });

    let result = handlers::login(
        MaybeUser(None),
        State(state),
        Json(LoginRequest {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        }),
    )
    .await
    .unwrap();

    let body = serde_json::to_value(result.0).unwrap();
    assert_eq!(body["user"]["username"], "alice");
    assert!(body["token"].as_str().unwrap().len() >= 32);
    // The digest must not appear anywhere in the response.
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(control.tokens_issued.load(Ordering::SeqCst), 1);
}

#[test]
async fn login_while_authenticated_is_rejected() {
    let (state, _) = create_test_state(MockRepoControl::default());

    let result = handlers::login(
        MaybeUser(Some(principal(OWNER_ID, &[]))),
        State(state),
        Json(LoginRequest {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        }),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::BAD_REQUEST);
}

// --- POSTS ---

#[test]
async fn create_post_requires_capability() {
    let (state, _) = create_test_state(MockRepoControl::default());
    let payload = CreatePostRequest {
        title: "T".to_string(),
        content: "C".to_string(),
    };

    let result = handlers::create_post(
        plain_user(OTHER_ID),
        State(state.clone()),
        Json(payload.clone()),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::FORBIDDEN);

    // managePosts and the admin umbrella both pass.
    assert!(
        handlers::create_post(author_user(), State(state.clone()), Json(payload.clone()))
            .await
            .is_ok()
    );
    assert!(
        handlers::create_post(admin_user(), State(state), Json(payload))
            .await
            .is_ok()
    );
}

#[test]
async fn create_post_validates_input_before_authorization() {
    let (state, _) = create_test_state(MockRepoControl::default());

    // Even a caller who would be denied gets the 400 first.
    let result = handlers::create_post(
        plain_user(OTHER_ID),
        State(state),
        Json(CreatePostRequest {
            title: String::new(),
            content: "C".to_string(),
        }),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::BAD_REQUEST);
}

#[test]
async fn update_own_post_allows_owner_without_capability() {
    let (state, control) = create_test_state(MockRepoControl {
        post: Some(owned_post()),
        ..MockRepoControl::default()
    });

    let result = handlers::update_own_post(
        plain_user(OWNER_ID),
        State(state),
        Path(owned_post().id),
        Json(UpdatePostRequest {
            title: "New".to_string(),
            content: "Edited".to_string(),
        }),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(control.posts_updated.load(Ordering::SeqCst), 1);
}

#[test]
async fn update_own_post_denies_non_owner_without_capability() {
    let (state, control) = create_test_state(MockRepoControl {
        post: Some(owned_post()),
        ..MockRepoControl::default()
    });

    let result = handlers::update_own_post(
        plain_user(OTHER_ID),
        State(state),
        Path(owned_post().id),
        Json(UpdatePostRequest {
            title: "New".to_string(),
            content: "Edited".to_string(),
        }),
    )
    .await;

    assert_eq!(status_of(result.unwrap_err()), StatusCode::FORBIDDEN);
    assert_eq!(control.posts_updated.load(Ordering::SeqCst), 0);
}

#[test]
async fn missing_post_is_404_regardless_of_permissions() {
    let (state, _) = create_test_state(MockRepoControl {
        post: None,
        ..MockRepoControl::default()
    });

    // Existence is reported consistently: the capability check never runs for
    // a resource that is not there.
    let result = handlers::delete_own_post(
        plain_user(OTHER_ID),
        State(state.clone()),
        Path(Uuid::from_u128(99)),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::NOT_FOUND);

    let result =
        handlers::delete_any_post(admin_user(), State(state), Path(Uuid::from_u128(99))).await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::NOT_FOUND);
}

#[test]
async fn delete_any_post_ignores_ownership() {
    let (state, control) = create_test_state(MockRepoControl {
        post: Some(owned_post()),
        ..MockRepoControl::default()
    });

    // The author without admin cannot use the moderation route...
    let result = handlers::delete_any_post(
        plain_user(OWNER_ID),
        State(state.clone()),
        Path(owned_post().id),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::FORBIDDEN);
    assert_eq!(control.posts_deleted.load(Ordering::SeqCst), 0);

    // ...while an admin deletes any post.
    let result = handlers::delete_any_post(admin_user(), State(state), Path(owned_post().id)).await;
    assert_eq!(result.unwrap(), "Post deleted");
    assert_eq!(control.posts_deleted.load(Ordering::SeqCst), 1);
}

// --- USERS ---

#[test]
async fn create_user_is_admin_only() {
    let (state, _) = create_test_state(MockRepoControl {
        create_user_result: Some(UserPublic::default()),
        ..MockRepoControl::default()
    });
    let payload = CreateUserRequest {
        username: "bob".to_string(),
        password: "pw".to_string(),
        permissions: Some(vec!["uploadImages".to_string()]),
    };

    let result = handlers::create_user(
        plain_user(OTHER_ID),
        State(state.clone()),
        Json(payload.clone()),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::FORBIDDEN);

    assert!(
        handlers::create_user(admin_user(), State(state), Json(payload))
            .await
            .is_ok()
    );
}

#[test]
async fn create_user_rejects_unknown_permission_names() {
    let (state, _) = create_test_state(MockRepoControl {
        create_user_result: Some(UserPublic::default()),
        ..MockRepoControl::default()
    });

    let result = handlers::create_user(
        admin_user(),
        State(state),
        Json(CreateUserRequest {
            username: "bob".to_string(),
            password: "pw".to_string(),
            permissions: Some(vec!["root".to_string()]),
        }),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::BAD_REQUEST);
}

#[test]
async fn create_user_duplicate_username_conflicts() {
    let (state, _) = create_test_state(MockRepoControl {
        create_user_result: None,
        ..MockRepoControl::default()
    });

    let result = handlers::create_user(
        admin_user(),
        State(state),
        Json(CreateUserRequest {
            username: "taken".to_string(),
            password: "pw".to_string(),
            permissions: Some(vec![]),
        }),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::CONFLICT);
}

#[test]
async fn change_password_verifies_old_and_revokes_tokens() {
    let digest = hash_password("old-password").unwrap();
    let record = UserRecord {
        id: OWNER_ID,
        username: "alice".to_string(),
        password_hash: digest,
        permissions: vec![],
    };
    let (state, control) = create_test_state(MockRepoControl {
        user_by_id: Some(record),
        ..MockRepoControl::default()
    });

    // Wrong current password: rejected, sessions untouched.
    let result = handlers::change_own_password(
        plain_user(OWNER_ID),
        State(state.clone()),
        Json(ChangePasswordRequest {
            password: "guess".to_string(),
            new_password: "next-password".to_string(),
        }),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::FORBIDDEN);
    assert_eq!(control.tokens_revoked.load(Ordering::SeqCst), 0);

    // Correct current password: updated and every session revoked.
    let result = handlers::change_own_password(
        plain_user(OWNER_ID),
        State(state),
        Json(ChangePasswordRequest {
            password: "old-password".to_string(),
            new_password: "next-password".to_string(),
        }),
    )
    .await;
    assert!(result.is_ok());
    assert_eq!(control.tokens_revoked.load(Ordering::SeqCst), 1);
}

#[test]
async fn change_password_rejects_reused_password() {
    let (state, _) = create_test_state(MockRepoControl::default());

    let result = handlers::change_own_password(
        plain_user(OWNER_ID),
        State(state),
        Json(ChangePasswordRequest {
            password: "same".to_string(),
            new_password: "same".to_string(),
        }),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::BAD_REQUEST);
}

#[test]
async fn set_password_redirects_self_service() {
    let (state, _) = create_test_state(MockRepoControl::default());

    let result = handlers::set_password(
        admin_user(),
        State(state),
        Path(ADMIN_ID),
        Json(SetPasswordRequest {
            new_password: "next".to_string(),
        }),
    )
    .await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::BAD_REQUEST);
}

#[test]
async fn set_password_revokes_target_tokens() {
    let (state, control) = create_test_state(MockRepoControl {
        user_by_id: Some(UserRecord {
            id: OTHER_ID,
            username: "bob".to_string(),
            password_hash: "$argon2id$irrelevant".to_string(),
            permissions: vec![],
        }),
        ..MockRepoControl::default()
    });

    let result = handlers::set_password(
        admin_user(),
        State(state),
        Path(OTHER_ID),
        Json(SetPasswordRequest {
            new_password: "next".to_string(),
        }),
    )
    .await;
    assert!(result.is_ok());
    assert_eq!(control.tokens_revoked.load(Ordering::SeqCst), 1);
}

#[test]
async fn delete_own_account_revokes_tokens() {
    let (state, control) = create_test_state(MockRepoControl::default());

    let result = handlers::delete_own_account(plain_user(OWNER_ID), State(state)).await;
    assert_eq!(result.unwrap(), "Account deleted");
    assert_eq!(control.tokens_revoked.load(Ordering::SeqCst), 1);
}

// --- IMAGES ---

#[test]
async fn delete_own_image_is_ownership_only() {
    let image = Image {
        id: 7,
        name: "cat.png".to_string(),
        owner_id: OWNER_ID,
    };
    let (state, _) = create_test_state(MockRepoControl {
        image: Some(image),
        ..MockRepoControl::default()
    });

    // Even an admin is turned away from the self-scoped route for an image
    // they do not own; the moderation route exists for that.
    let result = handlers::delete_own_image(admin_user(), State(state.clone()), Path(7)).await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::FORBIDDEN);

    let result = handlers::delete_own_image(plain_user(OWNER_ID), State(state), Path(7)).await;
    assert_eq!(result.unwrap(), "Image deleted");
}

#[test]
async fn delete_image_requires_admin() {
    let image = Image {
        id: 7,
        name: "cat.png".to_string(),
        owner_id: OWNER_ID,
    };
    let (state, _) = create_test_state(MockRepoControl {
        image: Some(image),
        ..MockRepoControl::default()
    });

    let result = handlers::delete_image(plain_user(OTHER_ID), State(state.clone()), Path(7)).await;
    assert_eq!(status_of(result.unwrap_err()), StatusCode::FORBIDDEN);

    let result = handlers::delete_image(admin_user(), State(state), Path(7)).await;
    assert_eq!(result.unwrap(), "Image deleted");
}
