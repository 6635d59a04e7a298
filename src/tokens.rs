use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    auth::Principal, authz::CapabilitySet, error::ApiError, hash::HashError,
    repository::RepositoryState,
};

/// Number of random bytes behind each token. 48 bytes encode to a 64-character
/// base64url string, comfortably above the 128-bit unguessability floor.
const TOKEN_BYTES: usize = 48;

/// IssuedToken
///
/// What a successful login hands back: the opaque bearer string and when it
/// stops working.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// TokenStore
///
/// Issues, resolves and revokes opaque bearer tokens against the persistence
/// layer. This is the only component that turns a raw token string into a
/// `Principal`; handlers never touch token rows directly.
///
/// Concurrency: tokens are plain inserts keyed by their own value, so two
/// simultaneous logins for one user produce two independent live tokens.
/// `revoke_all` deletes by owner; requests that resolved before the delete
/// committed simply complete with the principal they already loaded.
#[derive(Clone)]
pub struct TokenStore {
    repo: RepositoryState,
    ttl: Duration,
}

impl TokenStore {
    pub fn new(repo: RepositoryState, ttl_hours: i64) -> Self {
        Self {
            repo,
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Generates a fresh opaque token and persists it for `user_id`.
    pub async fn issue(&self, user_id: Uuid) -> Result<IssuedToken, ApiError> {
        let token = generate_token()?;
        let now = Utc::now();
        let expires_at = now + self.ttl;
        self.repo
            .create_token(&token, user_id, now, expires_at)
            .await?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Resolves a raw bearer string to its principal.
    ///
    /// Returns `Ok(None)`, never an error, when the token is unknown,
    /// expired, or its owner no longer exists (deleted accounts can leave
    /// residual rows behind). Expired rows are pruned on the way out.
    pub async fn resolve(&self, raw: &str) -> Result<Option<Principal>, ApiError> {
        let Some(row) = self.repo.find_token(raw).await? else {
            return Ok(None);
        };

        if row.expires_at <= Utc::now() {
            self.repo.delete_token(raw).await?;
            return Ok(None);
        }

        let Some(user) = self.repo.find_user_by_id(row.user_id).await? else {
            return Ok(None);
        };

        Ok(Some(Principal {
            id: user.id,
            username: user.username,
            capabilities: CapabilitySet::from_names(&user.permissions),
        }))
    }

    /// Deletes every token owned by `user_id`. Used on logout-all, password
    /// change and account deletion. Returns how many were removed.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, ApiError> {
        let count = self.repo.delete_tokens_by_user(user_id).await?;
        tracing::debug!(user_id = %user_id, count, "revoked tokens");
        Ok(count)
    }
}

/// 48 bytes from the OS RNG, base64url without padding.
fn generate_token() -> Result<String, HashError> {
    let mut buf = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut buf).map_err(|_| HashError)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}
