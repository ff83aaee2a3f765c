use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;
use transactional_outbox::{OutboxRepository, SqlxOutboxRepository};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::events::FeedEvent;
use crate::repository::SocialGraphStore;

/// Repository for follow edges.
///
/// Writes commit the edge and its feed event atomically; the feed worker only
/// ever observes committed follows.
#[derive(Clone)]
pub struct FollowRepository {
    pool: PgPool,
    outbox: Arc<SqlxOutboxRepository>,
}

impl FollowRepository {
    pub fn new(pool: PgPool, outbox: Arc<SqlxOutboxRepository>) -> Self {
        Self { pool, outbox }
    }

    /// Create a follow edge; returns true if a new edge was inserted.
    ///
    /// Emits `feed.user.followed` only when the edge is new, so re-following
    /// an already-followed user does not trigger another backfill.
    pub async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        if follower_id == followee_id {
            return Err(AppError::BadRequest("cannot follow yourself".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO follows (id, follower_id, followee_id, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(follower_id)
        .bind(followee_id)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        let event = FeedEvent::UserFollowed {
            follower_id,
            followee_id,
        };
        self.outbox.insert(&mut tx, &event.to_outbox()).await?;

        tx.commit().await?;

        debug!(%follower_id, %followee_id, "follow edge created");
        Ok(true)
    }

    /// Delete a follow edge; returns true if an edge was removed.
    ///
    /// Emits `feed.user.unfollowed` only when an edge actually existed.
    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            r#"
            DELETE FROM follows
            WHERE follower_id = $1 AND followee_id = $2
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let event = FeedEvent::UserUnfollowed {
            follower_id,
            followee_id,
        };
        self.outbox.insert(&mut tx, &event.to_outbox()).await?;

        tx.commit().await?;

        debug!(%follower_id, %followee_id, "follow edge removed");
        Ok(true)
    }

    /// Number of followers of the given user.
    pub async fn follower_count(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM follows
            WHERE followee_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Number of users the given user follows.
    pub async fn following_count(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM follows
            WHERE follower_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[async_trait]
impl SocialGraphStore for FollowRepository {
    async fn list_follower_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT follower_id FROM follows
            WHERE followee_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn exists(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM follows
                WHERE follower_id = $1 AND followee_id = $2
            )
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
