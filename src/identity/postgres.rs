//! User directory backed by the `users` table

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::UserId;

use super::{compose_display_name, IdentityResolver, ResolverError};

#[derive(Debug, Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityResolver for PgDirectory {
    async fn resolve_display_name(&self, user_id: &UserId) -> Result<Option<String>, ResolverError> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT first_name, last_name, email FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(first, last, email)| compose_display_name(&first, &last, &email)))
    }

    async fn resolve_many(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, String>, ResolverError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<String> = user_ids.iter().map(|id| id.as_str().to_owned()).collect();
        let rows: Vec<(UserId, String, String, String)> = sqlx::query_as(
            r#"
            SELECT user_id, first_name, last_name, email
            FROM users
            WHERE user_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, first, last, email)| {
                compose_display_name(&first, &last, &email).map(|name| (id, name))
            })
            .collect())
    }
}
