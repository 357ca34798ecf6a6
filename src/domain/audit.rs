/// Audit and versioning fields shared by every persisted entity
///
/// Embedded by value in each entity. Ids are generated here, at construction
/// time, and the acting identity is always passed in explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Active,
    Inactive,
    Archived,
    Deleted,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Active => "active",
            EntityStatus::Inactive => "inactive",
            EntityStatus::Archived => "archived",
            EntityStatus::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for EntityStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(EntityStatus::Active),
            "inactive" => Ok(EntityStatus::Inactive),
            "archived" => Ok(EntityStatus::Archived),
            "deleted" => Ok(EntityStatus::Deleted),
            other => Err(format!("unknown entity status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFields {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    /// Optimistic-concurrency counter, starts at 1
    pub version: i32,
    pub status: EntityStatus,
}

impl AuditFields {
    /// Initialize audit fields for a brand new entity with a time-ordered id
    pub fn new(created_by: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self::with_id(Uuid::now_v7(), created_by, now)
    }

    /// Same as [`AuditFields::new`] with a caller-chosen id
    pub fn with_id(id: Uuid, created_by: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by,
            updated_by: created_by,
            version: 1,
            status: EntityStatus::Active,
        }
    }

    /// Record an update: bumps the version and the modifier
    pub fn touch(&mut self, updated_by: Option<Uuid>, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
        if updated_by.is_some() {
            self.updated_by = updated_by;
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active && self.deleted_at.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
