/// JWT Claims structure
///
/// Payload of an access token: identity information plus the standard
/// registered claims (RFC 7519).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issuer written into and required from every access token
pub const ISSUER: &str = "backend-service";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    pub iss: String,
    /// Subject (identity id as string)
    pub sub: String,
}

impl Claims {
    /// Build claims valid from `issued_at` for `ttl`
    pub fn new(
        user_id: Uuid,
        email: impl Into<String>,
        role: impl Into<String>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let now = issued_at.timestamp();
        Self {
            user_id,
            email: email.into(),
            role: role.into(),
            exp: (issued_at + ttl).timestamp(),
            iat: now,
            nbf: now,
            iss: ISSUER.to_string(),
            sub: user_id.to_string(),
        }
    }
}
