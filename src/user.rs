//! User model and lookup
//!
//! Users are referenced by cards and block requests; their own lifecycle
//! (registration, authentication) is owned elsewhere. This module only
//! resolves identities and derives display data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::domain::Role;
use crate::error::AppError;

/// A user as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Display name stamped onto cards as the holder field
    pub fn holder_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// User lookups
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let row: Option<(i64, String, String, String, String, bool, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT id, email, first_name, last_name, role, is_active, created_at
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(
            |(id, email, first_name, last_name, role, is_active, created_at)| User {
                id,
                email,
                first_name,
                last_name,
                role: Role::from_str_opt(&role).unwrap_or(Role::User),
                is_active,
                created_at,
            },
        ))
    }

    /// Resolve a user or fail with NotFound
    pub async fn get(&self, user_id: i64) -> Result<User, AppError> {
        self.find_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holder_name() {
        let user = User {
            id: 1,
            email: "ivan@example.com".to_string(),
            first_name: "Ivan".to_string(),
            last_name: "Petrov".to_string(),
            role: Role::User,
            is_active: true,
            created_at: Utc::now(),
        };

        assert_eq!(user.holder_name(), "Ivan Petrov");
    }
}
