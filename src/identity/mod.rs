//! Identity Resolver
//!
//! Port to the user directory, used only to denormalize display names into
//! transfer records and to decorate history. Every caller treats a failure
//! here as non-fatal.

mod memory;
mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::UserId;

pub use memory::StaticDirectory;
pub use postgres::PgDirectory;

/// Resolver failures. Never surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("User directory unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Maps user ids to display names.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` means the directory has no name for this user.
    async fn resolve_display_name(&self, user_id: &UserId) -> Result<Option<String>, ResolverError>;

    /// Batch lookup; ids without a name are absent from the map.
    async fn resolve_many(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, String>, ResolverError> {
        let mut names = HashMap::with_capacity(user_ids.len());
        for user_id in user_ids {
            if let Some(name) = self.resolve_display_name(user_id).await? {
                names.insert(user_id.clone(), name);
            }
        }
        Ok(names)
    }
}

/// Build a display name from profile fields: "First Last" trimmed,
/// falling back to the email when both names are blank.
pub fn compose_display_name(first_name: &str, last_name: &str, email: &str) -> Option<String> {
    let full = format!("{} {}", first_name.trim(), last_name.trim());
    let full = full.trim();
    if !full.is_empty() {
        return Some(full.to_string());
    }
    let email = email.trim();
    (!email.is_empty()).then(|| email.to_string())
}
