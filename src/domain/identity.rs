/// User account (identity) entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::audit::{AuditFields, EntityStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Moderator => "moderator",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    #[serde(flatten)]
    pub audit: AuditFields,
    pub email: String,
    pub username: String,
    /// Bcrypt hash, only ever read by the credential verifier
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
}

impl Identity {
    /// Build a self-registered identity. It is recorded as its own creator.
    pub fn register(
        email: String,
        username: String,
        password_hash: String,
        full_name: String,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::now_v7();
        Self {
            audit: AuditFields::with_id(id, Some(id), now),
            email,
            username,
            password_hash,
            full_name,
            role: Role::default(),
            last_login_at: None,
            last_login_ip: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.audit.id
    }

    pub fn is_active(&self) -> bool {
        self.audit.is_active()
    }

    pub fn status(&self) -> EntityStatus {
        self.audit.status
    }
}
