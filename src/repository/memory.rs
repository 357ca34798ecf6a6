/// In-memory repositories
///
/// Same contracts as the Postgres store, backed by `HashMap`s behind a tokio
/// `RwLock`. Used by tests and for running the service without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{AuthToken, Identity};
use crate::error::{AppError, DatabaseError};
use crate::repository::{IdentityRepository, RepoResult, TokenRepository};

#[derive(Default)]
pub struct InMemoryIdentityRepository {
    identities: RwLock<HashMap<Uuid, Identity>>,
}

impl InMemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored identity without uniqueness checks
    pub async fn put(&self, identity: Identity) {
        self.identities.write().await.insert(identity.id(), identity);
    }

    pub async fn remove(&self, id: Uuid) {
        self.identities.write().await.remove(&id);
    }
}

fn conflicts(existing: &Identity, candidate: &Identity) -> bool {
    existing.id() != candidate.id()
        && (existing.email.eq_ignore_ascii_case(&candidate.email)
            || existing.username == candidate.username)
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityRepository {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Identity>> {
        Ok(self.identities.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Identity>> {
        let identities = self.identities.read().await;
        Ok(identities
            .values()
            .find(|identity| identity.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<Identity>> {
        let identities = self.identities.read().await;
        Ok(identities
            .values()
            .find(|identity| identity.username == username)
            .cloned())
    }

    async fn save(&self, identity: &Identity) -> RepoResult<Identity> {
        let mut identities = self.identities.write().await;
        if identities.contains_key(&identity.id())
            || identities.values().any(|existing| conflicts(existing, identity))
        {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "Email or username already registered".to_string(),
            )));
        }
        identities.insert(identity.id(), identity.clone());
        Ok(identity.clone())
    }

    async fn update(&self, identity: &Identity) -> RepoResult<Identity> {
        let mut identities = self.identities.write().await;
        if !identities.contains_key(&identity.id()) {
            return Err(AppError::Database(DatabaseError::NotFound(format!(
                "identity {}",
                identity.id()
            ))));
        }
        if identities.values().any(|existing| conflicts(existing, identity)) {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "Email or username already registered".to_string(),
            )));
        }
        identities.insert(identity.id(), identity.clone());
        Ok(identity.clone())
    }

    async fn update_last_login(
        &self,
        id: Uuid,
        origin_address: &str,
        at: DateTime<Utc>,
    ) -> RepoResult<()> {
        let mut identities = self.identities.write().await;
        if let Some(identity) = identities.get_mut(&id) {
            identity.last_login_at = Some(at);
            identity.last_login_ip = Some(origin_address.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTokenRepository {
    tokens: RwLock<HashMap<Uuid, AuthToken>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, revoked or not
    pub async fn all(&self) -> Vec<AuthToken> {
        self.tokens.read().await.values().cloned().collect()
    }

    /// Overwrite a stored record as-is, bypassing the revocation guard
    pub async fn put(&self, token: AuthToken) {
        self.tokens.write().await.insert(token.id(), token);
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn save_or_update(&self, token: &AuthToken) -> RepoResult<AuthToken> {
        let mut tokens = self.tokens.write().await;

        if tokens
            .values()
            .any(|existing| existing.id() != token.id() && existing.refresh_token == token.refresh_token)
        {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "refresh token already exists".to_string(),
            )));
        }

        let mut stored = token.clone();
        if let Some(existing) = tokens.get(&token.id()) {
            if existing.revoked {
                stored.revoked = true;
                stored.revoked_at = existing.revoked_at;
            }
        }
        tokens.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> RepoResult<Option<AuthToken>> {
        let tokens = self.tokens.read().await;
        Ok(tokens
            .values()
            .find(|token| token.refresh_token == refresh_token)
            .cloned())
    }

    async fn find_by_access_token(&self, access_token: &str) -> RepoResult<Option<AuthToken>> {
        let tokens = self.tokens.read().await;
        Ok(tokens
            .values()
            .find(|token| !token.revoked && token.access_token == access_token)
            .cloned())
    }

    async fn list_active_by_identity(&self, identity_id: Uuid) -> RepoResult<Vec<AuthToken>> {
        let tokens = self.tokens.read().await;
        let mut active: Vec<AuthToken> = tokens
            .values()
            .filter(|token| token.identity_id == identity_id && !token.revoked)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.audit
                .created_at
                .cmp(&a.audit.created_at)
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(active)
    }

    async fn revoke_by_refresh_token(
        &self,
        refresh_token: &str,
        at: DateTime<Utc>,
    ) -> RepoResult<u64> {
        let mut tokens = self.tokens.write().await;
        let revoked = tokens
            .values_mut()
            .find(|token| token.refresh_token == refresh_token)
            .map(|token| token.revoke(at))
            .unwrap_or(false);
        Ok(u64::from(revoked))
    }

    async fn revoke_all_by_identity(&self, identity_id: Uuid, at: DateTime<Utc>) -> RepoResult<u64> {
        let mut tokens = self.tokens.write().await;
        let count = tokens
            .values_mut()
            .filter(|token| token.identity_id == identity_id)
            .map(|token| token.revoke(at))
            .filter(|revoked| *revoked)
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClientInfo;
    use chrono::Duration;

    fn identity(email: &str, username: &str) -> Identity {
        Identity::register(
            email.to_string(),
            username.to_string(),
            "hash".to_string(),
            String::new(),
            Utc::now(),
        )
    }

    fn session(owner: Uuid) -> AuthToken {
        AuthToken::issue(
            owner,
            "access".to_string(),
            Uuid::now_v7().to_string(),
            &ClientInfo::default(),
            Utc::now(),
            Duration::seconds(60),
            Duration::seconds(600),
        )
    }

    #[tokio::test]
    async fn test_identity_lookups() {
        let repo = InMemoryIdentityRepository::new();
        let alice = repo.save(&identity("Alice@Example.com", "alice")).await.unwrap();

        assert_eq!(repo.find_by_email("alice@example.com").await.unwrap().unwrap().id(), alice.id());
        assert_eq!(repo.find_by_username("alice").await.unwrap().unwrap().id(), alice.id());
        assert!(repo.find_by_username("Alice").await.unwrap().is_none());
        assert!(repo.find_by_id(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_or_username_is_a_conflict() {
        let repo = InMemoryIdentityRepository::new();
        repo.save(&identity("alice@example.com", "alice")).await.unwrap();

        let same_email = repo.save(&identity("ALICE@example.com", "other")).await;
        let same_username = repo.save(&identity("other@example.com", "alice")).await;

        assert!(matches!(
            same_email,
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
        ));
        assert!(matches!(
            same_username,
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
        ));
    }

    #[tokio::test]
    async fn test_update_last_login() {
        let repo = InMemoryIdentityRepository::new();
        let alice = repo.save(&identity("alice@example.com", "alice")).await.unwrap();
        let at = Utc::now();

        repo.update_last_login(alice.id(), "10.1.1.1", at).await.unwrap();
        let stored = repo.find_by_id(alice.id()).await.unwrap().unwrap();

        assert_eq!(stored.last_login_at, Some(at));
        assert_eq!(stored.last_login_ip.as_deref(), Some("10.1.1.1"));
    }

    #[tokio::test]
    async fn test_save_or_update_never_clears_revocation() {
        let repo = InMemoryTokenRepository::new();
        let token = session(Uuid::now_v7());
        repo.save_or_update(&token).await.unwrap();

        let revoked_at = Utc::now();
        assert_eq!(repo.revoke_by_refresh_token(&token.refresh_token, revoked_at).await.unwrap(), 1);

        // a stale copy written after the revocation
        let mut stale = token.clone();
        stale.access_token = "newer".to_string();
        let stored = repo.save_or_update(&stale).await.unwrap();

        assert!(stored.revoked);
        assert_eq!(stored.revoked_at, Some(revoked_at));
        let found = repo.find_by_refresh_token(&token.refresh_token).await.unwrap().unwrap();
        assert!(found.revoked);
    }

    #[tokio::test]
    async fn test_refresh_token_is_unique() {
        let repo = InMemoryTokenRepository::new();
        let first = session(Uuid::now_v7());
        repo.save_or_update(&first).await.unwrap();

        let mut clash = session(Uuid::now_v7());
        clash.refresh_token = first.refresh_token.clone();

        assert!(repo.save_or_update(&clash).await.is_err());
    }

    #[tokio::test]
    async fn test_revoke_by_refresh_token_is_idempotent() {
        let repo = InMemoryTokenRepository::new();
        let token = session(Uuid::now_v7());
        repo.save_or_update(&token).await.unwrap();

        assert_eq!(repo.revoke_by_refresh_token(&token.refresh_token, Utc::now()).await.unwrap(), 1);
        assert_eq!(repo.revoke_by_refresh_token(&token.refresh_token, Utc::now()).await.unwrap(), 0);
        assert_eq!(repo.revoke_by_refresh_token("unknown", Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_and_revoke_all_by_identity() {
        let repo = InMemoryTokenRepository::new();
        let owner = Uuid::now_v7();
        let other = Uuid::now_v7();
        for _ in 0..3 {
            repo.save_or_update(&session(owner)).await.unwrap();
        }
        let foreign = session(other);
        repo.save_or_update(&foreign).await.unwrap();

        let active = repo.list_active_by_identity(owner).await.unwrap();
        assert_eq!(active.len(), 3);
        assert!(active.windows(2).all(|w| w[0].id() > w[1].id()));

        assert_eq!(repo.revoke_all_by_identity(owner, Utc::now()).await.unwrap(), 3);
        assert!(repo.list_active_by_identity(owner).await.unwrap().is_empty());
        assert_eq!(repo.list_active_by_identity(other).await.unwrap().len(), 1);
        assert_eq!(repo.revoke_all_by_identity(owner, Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_by_access_token_skips_revoked() {
        let repo = InMemoryTokenRepository::new();
        let token = session(Uuid::now_v7());
        repo.save_or_update(&token).await.unwrap();

        assert!(repo.find_by_access_token("access").await.unwrap().is_some());
        repo.revoke_by_refresh_token(&token.refresh_token, Utc::now()).await.unwrap();
        assert!(repo.find_by_access_token("access").await.unwrap().is_none());
    }
}
