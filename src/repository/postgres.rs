/// Postgres repositories (sqlx)
///
/// Schema lives in `migrations/`. Identity lookups skip soft-deleted rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{AuditFields, AuthToken, EntityStatus, Identity, Role};
use crate::error::{AppError, DatabaseError};
use crate::repository::{IdentityRepository, RepoResult, TokenRepository};

const IDENTITY_COLUMNS: &str = "id, email, username, password_hash, full_name, role, \
    last_login_at, last_login_ip, created_at, updated_at, deleted_at, created_by, updated_by, \
    version, status";

const TOKEN_COLUMNS: &str = "id, identity_id, access_token, refresh_token, expires_at, \
    refresh_expires_at, ip_address, user_agent, revoked, revoked_at, created_at, updated_at, \
    deleted_at, created_by, updated_by, version, status";

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    email: String,
    username: String,
    password_hash: String,
    full_name: String,
    role: String,
    last_login_at: Option<DateTime<Utc>>,
    last_login_ip: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    created_by: Option<Uuid>,
    updated_by: Option<Uuid>,
    version: i32,
    status: String,
}

#[derive(sqlx::FromRow)]
struct AuthTokenRow {
    id: Uuid,
    identity_id: Uuid,
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    refresh_expires_at: DateTime<Utc>,
    ip_address: String,
    user_agent: String,
    revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    created_by: Option<Uuid>,
    updated_by: Option<Uuid>,
    version: i32,
    status: String,
}

fn parse_status(value: &str) -> Result<EntityStatus, AppError> {
    value
        .parse::<EntityStatus>()
        .map_err(|e| AppError::Database(DatabaseError::UnexpectedError(e)))
}

impl TryFrom<IdentityRow> for Identity {
    type Error = AppError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| AppError::Database(DatabaseError::UnexpectedError(e)))?;
        Ok(Identity {
            audit: AuditFields {
                id: row.id,
                created_at: row.created_at,
                updated_at: row.updated_at,
                deleted_at: row.deleted_at,
                created_by: row.created_by,
                updated_by: row.updated_by,
                version: row.version,
                status: parse_status(&row.status)?,
            },
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            full_name: row.full_name,
            role,
            last_login_at: row.last_login_at,
            last_login_ip: row.last_login_ip,
        })
    }
}

impl TryFrom<AuthTokenRow> for AuthToken {
    type Error = AppError;

    fn try_from(row: AuthTokenRow) -> Result<Self, Self::Error> {
        Ok(AuthToken {
            audit: AuditFields {
                id: row.id,
                created_at: row.created_at,
                updated_at: row.updated_at,
                deleted_at: row.deleted_at,
                created_by: row.created_by,
                updated_by: row.updated_by,
                version: row.version,
                status: parse_status(&row.status)?,
            },
            identity_id: row.identity_id,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at: row.expires_at,
            refresh_expires_at: row.refresh_expires_at,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            revoked: row.revoked,
            revoked_at: row.revoked_at,
        })
    }
}

#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, predicate: &str, value: &str) -> RepoResult<Option<Identity>> {
        let sql = format!(
            "SELECT {} FROM identities WHERE {} AND deleted_at IS NULL",
            IDENTITY_COLUMNS, predicate
        );
        sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(Identity::try_from)
            .transpose()
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Identity>> {
        let sql = format!(
            "SELECT {} FROM identities WHERE id = $1 AND deleted_at IS NULL",
            IDENTITY_COLUMNS
        );
        sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Identity>> {
        self.find_one("lower(email) = lower($1)", email).await
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<Identity>> {
        self.find_one("username = $1", username).await
    }

    async fn save(&self, identity: &Identity) -> RepoResult<Identity> {
        let sql = format!(
            r#"
            INSERT INTO identities ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            IDENTITY_COLUMNS, IDENTITY_COLUMNS
        );
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(identity.audit.id)
            .bind(&identity.email)
            .bind(&identity.username)
            .bind(&identity.password_hash)
            .bind(&identity.full_name)
            .bind(identity.role.as_str())
            .bind(identity.last_login_at)
            .bind(&identity.last_login_ip)
            .bind(identity.audit.created_at)
            .bind(identity.audit.updated_at)
            .bind(identity.audit.deleted_at)
            .bind(identity.audit.created_by)
            .bind(identity.audit.updated_by)
            .bind(identity.audit.version)
            .bind(identity.audit.status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Identity::try_from(row)
    }

    async fn update(&self, identity: &Identity) -> RepoResult<Identity> {
        let sql = format!(
            r#"
            UPDATE identities
            SET email = $2, username = $3, password_hash = $4, full_name = $5, role = $6,
                updated_at = $7, updated_by = $8, deleted_at = $9, status = $10,
                version = GREATEST(version + 1, $11)
            WHERE id = $1
            RETURNING {}
            "#,
            IDENTITY_COLUMNS
        );
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(identity.audit.id)
            .bind(&identity.email)
            .bind(&identity.username)
            .bind(&identity.password_hash)
            .bind(&identity.full_name)
            .bind(identity.role.as_str())
            .bind(identity.audit.updated_at)
            .bind(identity.audit.updated_by)
            .bind(identity.audit.deleted_at)
            .bind(identity.audit.status.as_str())
            .bind(identity.audit.version)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                AppError::Database(DatabaseError::NotFound(format!("identity {}", identity.id())))
            })?;
        Identity::try_from(row)
    }

    async fn update_last_login(
        &self,
        id: Uuid,
        origin_address: &str,
        at: DateTime<Utc>,
    ) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE identities
            SET last_login_at = $2, last_login_ip = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(origin_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn save_or_update(&self, token: &AuthToken) -> RepoResult<AuthToken> {
        // A concurrent revocation must survive this write.
        let sql = format!(
            r#"
            INSERT INTO auth_tokens ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                expires_at = EXCLUDED.expires_at,
                refresh_expires_at = EXCLUDED.refresh_expires_at,
                revoked = auth_tokens.revoked OR EXCLUDED.revoked,
                revoked_at = COALESCE(auth_tokens.revoked_at, EXCLUDED.revoked_at),
                updated_at = EXCLUDED.updated_at,
                updated_by = EXCLUDED.updated_by,
                status = EXCLUDED.status,
                version = GREATEST(auth_tokens.version + 1, EXCLUDED.version)
            RETURNING {}
            "#,
            TOKEN_COLUMNS, TOKEN_COLUMNS
        );
        let row = sqlx::query_as::<_, AuthTokenRow>(&sql)
            .bind(token.audit.id)
            .bind(token.identity_id)
            .bind(&token.access_token)
            .bind(&token.refresh_token)
            .bind(token.expires_at)
            .bind(token.refresh_expires_at)
            .bind(&token.ip_address)
            .bind(&token.user_agent)
            .bind(token.revoked)
            .bind(token.revoked_at)
            .bind(token.audit.created_at)
            .bind(token.audit.updated_at)
            .bind(token.audit.deleted_at)
            .bind(token.audit.created_by)
            .bind(token.audit.updated_by)
            .bind(token.audit.version)
            .bind(token.audit.status.as_str())
            .fetch_one(&self.pool)
            .await?;
        AuthToken::try_from(row)
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> RepoResult<Option<AuthToken>> {
        let sql = format!("SELECT {} FROM auth_tokens WHERE refresh_token = $1", TOKEN_COLUMNS);
        sqlx::query_as::<_, AuthTokenRow>(&sql)
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .await?
            .map(AuthToken::try_from)
            .transpose()
    }

    async fn find_by_access_token(&self, access_token: &str) -> RepoResult<Option<AuthToken>> {
        let sql = format!(
            "SELECT {} FROM auth_tokens WHERE access_token = $1 AND revoked = false",
            TOKEN_COLUMNS
        );
        sqlx::query_as::<_, AuthTokenRow>(&sql)
            .bind(access_token)
            .fetch_optional(&self.pool)
            .await?
            .map(AuthToken::try_from)
            .transpose()
    }

    async fn list_active_by_identity(&self, identity_id: Uuid) -> RepoResult<Vec<AuthToken>> {
        let sql = format!(
            r#"
            SELECT {} FROM auth_tokens
            WHERE identity_id = $1 AND revoked = false
            ORDER BY created_at DESC, id DESC
            "#,
            TOKEN_COLUMNS
        );
        sqlx::query_as::<_, AuthTokenRow>(&sql)
            .bind(identity_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AuthToken::try_from)
            .collect()
    }

    async fn revoke_by_refresh_token(
        &self,
        refresh_token: &str,
        at: DateTime<Utc>,
    ) -> RepoResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE auth_tokens
            SET revoked = true, revoked_at = $1, updated_at = $1, version = version + 1
            WHERE refresh_token = $2 AND revoked = false
            "#,
        )
        .bind(at)
        .bind(refresh_token)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("Refresh token not found or already revoked");
        }
        Ok(result.rows_affected())
    }

    async fn revoke_all_by_identity(&self, identity_id: Uuid, at: DateTime<Utc>) -> RepoResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE auth_tokens
            SET revoked = true, revoked_at = $1, updated_at = $1, version = version + 1
            WHERE identity_id = $2 AND revoked = false
            "#,
        )
        .bind(at)
        .bind(identity_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %identity_id,
            revoked = result.rows_affected(),
            "Revoked refresh tokens for identity"
        );
        Ok(result.rows_affected())
    }
}
