use crate::models::{Image, ImageSummary, Post, PostSummary, TokenRecord, UserPublic, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations. This is the
/// core of the Repository Abstraction pattern, allowing handlers and the token
/// store to interact with the data layer without knowing the concrete
/// implementation (Postgres, in-memory test double, etc.).
///
/// **Send + Sync + async_trait** are required to make the trait object
/// (`Arc<dyn Repository>`) safely shareable across Axum's asynchronous task
/// boundaries.
///
/// Every method returns `Result<_, sqlx::Error>`; infrastructure failures
/// propagate to the route boundary where they become opaque 500s. "Not found"
/// is modeled as `Ok(None)` / `Ok(false)`, never as an error.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user_by_username(&self, username: &str)
    -> Result<Option<UserRecord>, sqlx::Error>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, sqlx::Error>;
    /// Returns `Ok(None)` when the username is already taken.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        permissions: &[String],
    ) -> Result<Option<UserPublic>, sqlx::Error>;
    async fn update_username(
        &self,
        id: Uuid,
        username: &str,
    ) -> Result<Option<UserPublic>, sqlx::Error>;
    async fn update_user_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error>;
    async fn delete_user(&self, id: Uuid) -> Result<bool, sqlx::Error>;
    async fn count_users(&self) -> Result<i64, sqlx::Error>;

    // --- Tokens ---
    async fn create_token(
        &self,
        token: &str,
        user_id: Uuid,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error>;
    async fn find_token(&self, token: &str) -> Result<Option<TokenRecord>, sqlx::Error>;
    async fn delete_token(&self, token: &str) -> Result<bool, sqlx::Error>;
    /// Removes every token owned by the user, returning how many went away.
    async fn delete_tokens_by_user(&self, user_id: Uuid) -> Result<u64, sqlx::Error>;

    // --- Posts ---
    async fn list_posts(&self) -> Result<Vec<PostSummary>, sqlx::Error>;
    async fn find_post(&self, id: Uuid) -> Result<Option<Post>, sqlx::Error>;
    async fn create_post(
        &self,
        title: &str,
        content: &str,
        author_id: Uuid,
    ) -> Result<Uuid, sqlx::Error>;
    async fn update_post(&self, id: Uuid, title: &str, content: &str)
    -> Result<bool, sqlx::Error>;
    async fn delete_post(&self, id: Uuid) -> Result<bool, sqlx::Error>;

    // --- Images ---
    /// Returns `Ok(None)` when an image with that name already exists; the
    /// unique constraint on `name` makes the reservation atomic under
    /// concurrent uploads.
    async fn create_image(
        &self,
        name: &str,
        owner_id: Uuid,
    ) -> Result<Option<ImageSummary>, sqlx::Error>;
    async fn find_image(&self, id: i64) -> Result<Option<Image>, sqlx::Error>;
    async fn list_images_by_owner(&self, owner_id: Uuid)
    -> Result<Vec<ImageSummary>, sqlx::Error>;
    async fn delete_image(&self, id: i64) -> Result<bool, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the
/// application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Queries use the runtime-checked sqlx API so the crate builds without a live
/// database connection.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, password_hash, permissions FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, password_hash, permissions FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Uses `ON CONFLICT DO NOTHING` so a duplicate username surfaces as
    /// `None` instead of a database error; the handler translates that into
    /// a 409.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        permissions: &[String],
    ) -> Result<Option<UserPublic>, sqlx::Error> {
        sqlx::query_as::<_, UserPublic>(
            r#"
            INSERT INTO users (id, username, password_hash, permissions)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (username) DO NOTHING
            RETURNING id, username
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .bind(permissions)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_username(
        &self,
        id: Uuid,
        username: &str,
    ) -> Result<Option<UserPublic>, sqlx::Error> {
        sqlx::query_as::<_, UserPublic>(
            "UPDATE users SET username = $2 WHERE id = $1 RETURNING id, username",
        )
        .bind(id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_user_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_users(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
    }

    async fn create_token(
        &self,
        token: &str,
        user_id: Uuid,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO tokens (token, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(token)
        .bind(user_id)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_token(&self, token: &str) -> Result<Option<TokenRecord>, sqlx::Error> {
        sqlx::query_as::<_, TokenRecord>(
            "SELECT token, user_id, created_at, expires_at FROM tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_token(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_tokens_by_user(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_posts(&self) -> Result<Vec<PostSummary>, sqlx::Error> {
        sqlx::query_as::<_, PostSummary>(
            "SELECT id, title, author_id, created_at FROM posts ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>, sqlx::Error> {
        sqlx::query_as::<_, Post>(
            "SELECT id, title, content, author_id, created_at FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_post(
        &self,
        title: &str,
        content: &str,
        author_id: Uuid,
    ) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO posts (id, title, content, author_id, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(content)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_post(
        &self,
        id: Uuid,
        title: &str,
        content: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE posts SET title = $2, content = $3 WHERE id = $1")
            .bind(id)
            .bind(title)
            .bind(content)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_image(
        &self,
        name: &str,
        owner_id: Uuid,
    ) -> Result<Option<ImageSummary>, sqlx::Error> {
        sqlx::query_as::<_, ImageSummary>(
            r#"
            INSERT INTO images (name, owner_id)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name
            "#,
        )
        .bind(name)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_image(&self, id: i64) -> Result<Option<Image>, sqlx::Error> {
        sqlx::query_as::<_, Image>("SELECT id, name, owner_id FROM images WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_images_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<ImageSummary>, sqlx::Error> {
        sqlx::query_as::<_, ImageSummary>(
            "SELECT id, name FROM images WHERE owner_id = $1 ORDER BY id ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn delete_image(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
