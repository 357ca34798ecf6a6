/// Domain entities
///
/// Identities, refresh-token sessions and the audit fields they embed.

mod audit;
mod auth_token;
mod identity;

pub use audit::{AuditFields, EntityStatus};
pub use auth_token::{AuthToken, ClientInfo, SessionState};
pub use identity::{Identity, Role};
