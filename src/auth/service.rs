/// Authentication core
///
/// Orchestrates login, registration, refresh, logout and revocation on top of
/// the credential verifier, the token codec and the two repositories.
///
/// Session states: `Active -> Expired` (judged at read time) and
/// `Active -> Revoked` (explicit, terminal). Nothing returns to `Active`.
/// Refresh tokens are not rotated on refresh; they stay valid until revoked
/// or expired.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::jwt::{generate_access_token, generate_refresh_token, validate_access_token};
use crate::auth::password::PasswordHasher;
use crate::configuration::AuthSettings;
use crate::domain::{AuthToken, ClientInfo, Identity, SessionState};
use crate::error::{AppError, AuthError};
use crate::repository::{IdentityRepository, TokenRepository};

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Email or username
    pub identifier: String,
    pub password: String,
    pub client: ClientInfo,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub client: ClientInfo,
}

/// Tokens handed to the client after login or registration
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: &'static str,
    pub identity: Identity,
}

#[derive(Debug, Clone)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: &'static str,
}

/// Client-facing view of an open session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: chrono::DateTime<Utc>,
    pub expires_at: chrono::DateTime<Utc>,
    pub refresh_expires_at: chrono::DateTime<Utc>,
}

impl From<&AuthToken> for SessionSummary {
    fn from(token: &AuthToken) -> Self {
        Self {
            id: token.id(),
            ip_address: token.ip_address.clone(),
            user_agent: token.user_agent.clone(),
            created_at: token.audit.created_at,
            expires_at: token.expires_at,
            refresh_expires_at: token.refresh_expires_at,
        }
    }
}

pub struct AuthService {
    identities: Arc<dyn IdentityRepository>,
    tokens: Arc<dyn TokenRepository>,
    hasher: PasswordHasher,
    /// Verified against when the identifier is unknown, so both failure paths cost the same
    decoy_hash: Option<String>,
    secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(
        identities: Arc<dyn IdentityRepository>,
        tokens: Arc<dyn TokenRepository>,
        settings: &AuthSettings,
    ) -> Self {
        let hasher = PasswordHasher::new(settings.password_hash_cost);
        Self {
            identities,
            tokens,
            decoy_hash: hasher.hash(&Uuid::new_v4().to_string()).ok(),
            hasher,
            secret: settings.secret_bytes().to_vec(),
            access_ttl: settings.access_ttl(),
            refresh_ttl: settings.refresh_ttl(),
        }
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Authenticate by email or username and open a new session
    ///
    /// # Errors
    /// - `InvalidCredentials` for an unknown identifier or a wrong password
    /// - `UserInactive` if the identity is deactivated
    /// - `TokenGeneration` / `TokenSave` on infrastructure failure
    #[tracing::instrument(name = "auth.login", skip_all)]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AppError> {
        let identity = match self.identities.find_by_email(&request.identifier).await? {
            Some(identity) => Some(identity),
            None => self.identities.find_by_username(&request.identifier).await?,
        };

        let identity = match identity {
            Some(identity) if self.hasher.verify(&request.password, &identity.password_hash) => {
                identity
            }
            Some(_) => return Err(AuthError::InvalidCredentials.into()),
            None => {
                if let Some(decoy) = &self.decoy_hash {
                    self.hasher.verify(&request.password, decoy);
                }
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !identity.is_active() {
            return Err(AuthError::UserInactive.into());
        }

        let response = self.open_session(identity, &request.client).await?;

        if let Err(e) = self
            .identities
            .update_last_login(response.identity.id(), &request.client.origin_address, Utc::now())
            .await
        {
            tracing::warn!(user_id = %response.identity.id(), error = %e, "Failed to update last login");
        }

        tracing::info!(user_id = %response.identity.id(), "User logged in successfully");
        Ok(response)
    }

    /// Create a new identity with the default role and open a session for it
    ///
    /// # Errors
    /// - `PasswordHash` if hashing fails
    /// - `DatabaseError::UniqueConstraintViolation` for a taken email or username
    #[tracing::instrument(name = "auth.register", skip_all)]
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AppError> {
        let password_hash = self.hasher.hash(&request.password).map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            e
        })?;

        let identity = Identity::register(
            request.email,
            request.username,
            password_hash,
            request.full_name,
            Utc::now(),
        );
        let identity = self.identities.save(&identity).await?;

        let response = self.open_session(identity, &request.client).await?;
        tracing::info!(user_id = %response.identity.id(), "User registered successfully");
        Ok(response)
    }

    /// Mint a new access token from a refresh token
    ///
    /// Checks run in order: unknown, revoked, expired, owner missing, owner
    /// inactive. A revoked token is reported as revoked even when it has also
    /// expired.
    #[tracing::instrument(name = "auth.refresh_token", skip_all)]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshResponse, AppError> {
        let mut record = self
            .tokens
            .find_by_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        let now = Utc::now();
        match record.state_at(now) {
            SessionState::Revoked => {
                tracing::warn!(user_id = %record.identity_id, "Attempt to use revoked refresh token");
                return Err(AuthError::TokenRevoked.into());
            }
            SessionState::Expired => {
                tracing::info!(user_id = %record.identity_id, "Refresh token expired");
                return Err(AuthError::TokenExpired.into());
            }
            SessionState::Active => {}
        }

        let identity = self.active_identity(record.identity_id).await?;

        let access_token = self.mint_access_token(&identity)?;
        record.rotate_access_token(access_token.clone(), now, self.access_ttl, identity.id());
        let record = self.tokens.save_or_update(&record).await.map_err(|e| {
            tracing::error!(user_id = %identity.id(), error = %e, "Failed to update token");
            AuthError::TokenSave(e.to_string())
        })?;

        tracing::info!(user_id = %identity.id(), "Token refreshed successfully");
        Ok(RefreshResponse {
            access_token,
            refresh_token: record.refresh_token,
            expires_in: self.access_ttl_seconds(),
            token_type: TOKEN_TYPE,
        })
    }

    /// Revoke one session. Unknown or already revoked tokens are a no-op.
    #[tracing::instrument(name = "auth.logout", skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        let revoked = self
            .tokens
            .revoke_by_refresh_token(refresh_token, Utc::now())
            .await?;
        if revoked == 0 {
            tracing::debug!("Logout for unknown or already revoked token");
        }
        Ok(())
    }

    /// Revoke every open session of an identity. Returns how many were revoked.
    #[tracing::instrument(name = "auth.revoke_all_tokens", skip(self))]
    pub async fn revoke_all_tokens(&self, identity_id: Uuid) -> Result<u64, AppError> {
        let revoked = self
            .tokens
            .revoke_all_by_identity(identity_id, Utc::now())
            .await?;
        tracing::info!(user_id = %identity_id, revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }

    /// Check an access token's signature, issuer and time window without
    /// touching storage
    pub fn decode_access_token(&self, access_token: &str) -> Result<Claims, AuthError> {
        validate_access_token(access_token, &self.secret)
    }

    /// Resolve the identity behind an access token
    ///
    /// Token claims are not trusted for current status: the identity is
    /// re-read and its active flag re-checked.
    pub async fn get_identity_from_token(&self, access_token: &str) -> Result<Identity, AppError> {
        let claims = self.decode_access_token(access_token)?;
        self.active_identity(claims.user_id).await
    }

    /// Open (non-revoked) sessions of an identity, newest first
    pub async fn list_active_sessions(&self, identity_id: Uuid) -> Result<Vec<AuthToken>, AppError> {
        self.tokens.list_active_by_identity(identity_id).await
    }

    async fn active_identity(&self, identity_id: Uuid) -> Result<Identity, AppError> {
        let identity = self
            .identities
            .find_by_id(identity_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !identity.is_active() {
            return Err(AuthError::UserInactive.into());
        }
        Ok(identity)
    }

    fn mint_access_token(&self, identity: &Identity) -> Result<String, AuthError> {
        generate_access_token(
            &identity.id(),
            &identity.email,
            identity.role.as_str(),
            &self.secret,
            self.access_ttl,
        )
        .map_err(|e| {
            tracing::error!(user_id = %identity.id(), error = %e, "Failed to generate access token");
            e
        })
    }

    async fn open_session(
        &self,
        identity: Identity,
        client: &ClientInfo,
    ) -> Result<AuthResponse, AppError> {
        let access_token = self.mint_access_token(&identity)?;
        let record = AuthToken::issue(
            identity.id(),
            access_token.clone(),
            generate_refresh_token(),
            client,
            Utc::now(),
            self.access_ttl,
            self.refresh_ttl,
        );

        let saved = self.tokens.save_or_update(&record).await.map_err(|e| {
            tracing::error!(user_id = %identity.id(), error = %e, "Failed to save token");
            AuthError::TokenSave(e.to_string())
        })?;

        Ok(AuthResponse {
            access_token,
            refresh_token: saved.refresh_token,
            expires_in: self.access_ttl_seconds(),
            token_type: TOKEN_TYPE,
            identity,
        })
    }
}
