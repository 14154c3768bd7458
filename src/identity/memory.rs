//! In-process user directory
//!
//! Used with the `memory` storage backend and in tests. It can be switched
//! offline to exercise the degraded paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::UserId;

use super::{IdentityResolver, ResolverError};

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    names: Arc<RwLock<HashMap<UserId, String>>>,
    offline: Arc<AtomicBool>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or rename a user
    pub fn set_name(&self, user_id: &UserId, name: impl Into<String>) {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.clone(), name.into());
    }

    pub fn remove(&self, user_id: &UserId) {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityResolver for StaticDirectory {
    async fn resolve_display_name(&self, user_id: &UserId) -> Result<Option<String>, ResolverError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ResolverError::Unavailable("directory offline".to_string()));
        }
        Ok(self
            .names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_and_rename() {
        let directory = StaticDirectory::new();
        let alice = UserId::parse("alice").unwrap();

        assert_eq!(directory.resolve_display_name(&alice).await.unwrap(), None);

        directory.set_name(&alice, "Alice");
        assert_eq!(
            directory.resolve_display_name(&alice).await.unwrap(),
            Some("Alice".to_string())
        );

        directory.set_name(&alice, "Alice B.");
        let names = directory.resolve_many(&[alice.clone()]).await.unwrap();
        assert_eq!(names.get(&alice).map(String::as_str), Some("Alice B."));
    }

    #[tokio::test]
    async fn test_offline_directory_errors() {
        let directory = StaticDirectory::new();
        directory.set_offline(true);

        let result = directory
            .resolve_display_name(&UserId::parse("alice").unwrap())
            .await;
        assert!(matches!(result, Err(ResolverError::Unavailable(_))));
    }
}
