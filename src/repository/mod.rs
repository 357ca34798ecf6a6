/// Persistence interfaces
///
/// Lookups return `Ok(None)` when nothing matches; `Err` is reserved for
/// infrastructure failures. Conflicting writes are serialized by the store.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{AuthToken, Identity};
use crate::error::AppError;

pub use memory::{InMemoryIdentityRepository, InMemoryTokenRepository};
pub use postgres::{PgIdentityRepository, PgTokenRepository};

pub type RepoResult<T> = Result<T, AppError>;

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Identity>>;

    /// Case-insensitive match on email
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Identity>>;

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<Identity>>;

    /// Insert a new identity. Duplicate email or username is a
    /// `DatabaseError::UniqueConstraintViolation`.
    async fn save(&self, identity: &Identity) -> RepoResult<Identity>;

    async fn update(&self, identity: &Identity) -> RepoResult<Identity>;

    async fn update_last_login(
        &self,
        id: Uuid,
        origin_address: &str,
        at: DateTime<Utc>,
    ) -> RepoResult<()>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Insert or update by id. Never clears an existing revocation.
    async fn save_or_update(&self, token: &AuthToken) -> RepoResult<AuthToken>;

    async fn find_by_refresh_token(&self, refresh_token: &str) -> RepoResult<Option<AuthToken>>;

    /// Only non-revoked records match
    async fn find_by_access_token(&self, access_token: &str) -> RepoResult<Option<AuthToken>>;

    /// Non-revoked records of one identity, newest first
    async fn list_active_by_identity(&self, identity_id: Uuid) -> RepoResult<Vec<AuthToken>>;

    /// Returns the number of records revoked (0 or 1)
    async fn revoke_by_refresh_token(
        &self,
        refresh_token: &str,
        at: DateTime<Utc>,
    ) -> RepoResult<u64>;

    async fn revoke_all_by_identity(&self, identity_id: Uuid, at: DateTime<Utc>) -> RepoResult<u64>;
}
