use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::Result;
use crate::repository::LikeStore;

/// Repository for likes. The feed path only reads liked-status; the write
/// methods exist for the like/unlike endpoints that feed it.
#[derive(Clone)]
pub struct LikeRepository {
    pool: PgPool,
}

impl LikeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a like (idempotent); returns true if this is a new like.
    pub async fn like(&self, user_id: Uuid, post_id: Uuid) -> Result<bool> {
        let inserted = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO likes (id, user_id, post_id, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, post_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted.is_some())
    }

    /// Delete a like (idempotent); returns true if a row was removed.
    pub async fn unlike(&self, user_id: Uuid, post_id: Uuid) -> Result<bool> {
        let affected = sqlx::query(
            r#"
            DELETE FROM likes
            WHERE user_id = $1 AND post_id = $2
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }
}

#[async_trait]
impl LikeStore for LikeRepository {
    async fn batch_check_liked(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, bool>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        // One set query for the whole page instead of a lookup per post.
        let liked_posts: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT post_id
            FROM likes
            WHERE user_id = $1 AND post_id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?;

        let liked_set: HashSet<Uuid> = liked_posts.into_iter().collect();
        let result = post_ids
            .iter()
            .map(|id| (*id, liked_set.contains(id)))
            .collect();

        Ok(result)
    }
}
