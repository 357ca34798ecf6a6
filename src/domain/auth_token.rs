/// Refresh-token session record
///
/// One record per issued refresh token. Records are never deleted; they move
/// from `Active` to `Expired` (judged at read time) or `Revoked` (explicit,
/// terminal).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::audit::AuditFields;

/// Caller metadata captured when a session is opened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub origin_address: String,
    pub client_agent: String,
}

impl ClientInfo {
    pub fn new(origin_address: impl Into<String>, client_agent: impl Into<String>) -> Self {
        Self {
            origin_address: origin_address.into(),
            client_agent: client_agent.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(flatten)]
    pub audit: AuditFields,
    pub identity_id: Uuid,
    /// Copy of the last access token minted for this session
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    /// Open a new session owned (and created) by `identity_id`
    pub fn issue(
        identity_id: Uuid,
        access_token: String,
        refresh_token: String,
        client: &ClientInfo,
        now: DateTime<Utc>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            audit: AuditFields::new(Some(identity_id), now),
            identity_id,
            access_token,
            refresh_token,
            expires_at: now + access_ttl,
            refresh_expires_at: now + refresh_ttl,
            ip_address: client.origin_address.clone(),
            user_agent: client.client_agent.clone(),
            revoked: false,
            revoked_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.audit.id
    }

    /// Revocation takes precedence over expiry
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.revoked {
            SessionState::Revoked
        } else if now > self.refresh_expires_at {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }

    /// Swap in a freshly minted access token. The refresh token is kept.
    pub fn rotate_access_token(
        &mut self,
        access_token: String,
        now: DateTime<Utc>,
        access_ttl: Duration,
        updated_by: Uuid,
    ) {
        self.access_token = access_token;
        self.expires_at = now + access_ttl;
        self.audit.touch(Some(updated_by), now);
    }

    /// Returns false when the record was already revoked
    pub fn revoke(&mut self, now: DateTime<Utc>) -> bool {
        if self.revoked {
            return false;
        }
        self.revoked = true;
        self.revoked_at = Some(now);
        self.audit.touch(None, now);
        true
    }
}
