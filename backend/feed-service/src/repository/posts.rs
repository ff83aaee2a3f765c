use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;
use transactional_outbox::{OutboxRepository, SqlxOutboxRepository};
use uuid::Uuid;

use crate::domain::Post;
use crate::error::Result;
use crate::events::FeedEvent;
use crate::repository::PostStore;

/// Repository for posts.
#[derive(Clone)]
pub struct PostRepository {
    pool: PgPool,
    outbox: Arc<SqlxOutboxRepository>,
}

impl PostRepository {
    pub fn new(pool: PgPool, outbox: Arc<SqlxOutboxRepository>) -> Self {
        Self { pool, outbox }
    }

    /// Create a post and its `feed.post.created` event in one transaction.
    pub async fn create_post(
        &self,
        author_id: Uuid,
        caption: &str,
        media_urls: &[String],
    ) -> Result<Post> {
        let mut tx = self.pool.begin().await?;

        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, author_id, caption, media_urls, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, author_id, caption, media_urls, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(author_id)
        .bind(caption)
        .bind(media_urls)
        .fetch_one(&mut *tx)
        .await?;

        let event = FeedEvent::PostCreated {
            author_id,
            post_id: post.id,
        };
        self.outbox.insert(&mut tx, &event.to_outbox()).await?;

        tx.commit().await?;

        debug!(post_id = %post.id, %author_id, "post created");
        Ok(post)
    }

    /// Delete a post and every feed item referencing it, in one transaction.
    ///
    /// The feed cleanup is synchronous with the delete rather than
    /// event-driven: a deleted post must never be served from anyone's feed.
    pub async fn delete_by_id(&self, post_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let purged = sqlx::query(
            r#"
            DELETE FROM feed_items
            WHERE post_id = $1
            "#,
        )
        .bind(post_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let affected = sqlx::query(
            r#"
            DELETE FROM posts
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        debug!(%post_id, feed_items_purged = purged, "post deleted");
        Ok(affected > 0)
    }

    pub async fn get_by_id(&self, post_id: Uuid) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, author_id, caption, media_urls, created_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }
}

#[async_trait]
impl PostStore for PostRepository {
    async fn most_recent_by_author(&self, author_id: Uuid, limit: i64) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, author_id, caption, media_urls, created_at
            FROM posts
            WHERE author_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(author_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }
}
