use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::User;
use crate::error::Result;

/// Minimal user lookup; account management lives elsewhere.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, username: &str, avatar_url: Option<&str>) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, avatar_url, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, username, avatar_url, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(avatar_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, avatar_url, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}
