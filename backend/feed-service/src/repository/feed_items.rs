use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{FeedItem, FeedPost, Page, PageRequest};
use crate::error::Result;
use crate::repository::FeedItemStore;

/// Repository for the materialized per-owner feed table.
#[derive(Clone)]
pub struct FeedItemRepository {
    pool: PgPool,
}

impl FeedItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedItemStore for FeedItemRepository {
    async fn append(&self, owner_id: Uuid, post_id: Uuid) -> Result<FeedItem> {
        let item = sqlx::query_as::<_, FeedItem>(
            r#"
            INSERT INTO feed_items (id, feed_owner_id, post_id, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, feed_owner_id, post_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(item)
    }

    async fn bulk_append(&self, items: &[(Uuid, Uuid)]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = items.iter().map(|_| Uuid::new_v4()).collect();
        let owners: Vec<Uuid> = items.iter().map(|(owner, _)| *owner).collect();
        let posts: Vec<Uuid> = items.iter().map(|(_, post)| *post).collect();

        let inserted = sqlx::query(
            r#"
            INSERT INTO feed_items (id, feed_owner_id, post_id, created_at)
            SELECT id, owner, post, NOW()
            FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[]) AS t(id, owner, post)
            "#,
        )
        .bind(&ids)
        .bind(&owners)
        .bind(&posts)
        .execute(&self.pool)
        .await?
        .rows_affected();

        debug!(requested = items.len(), inserted, "bulk feed append");
        Ok(inserted)
    }

    async fn bulk_delete_by_owner_and_author(
        &self,
        owner_id: Uuid,
        author_id: Uuid,
    ) -> Result<u64> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM feed_items fi
            USING posts p
            WHERE fi.post_id = p.id
              AND fi.feed_owner_id = $1
              AND p.author_id = $2
            "#,
        )
        .bind(owner_id)
        .bind(author_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        debug!(%owner_id, %author_id, deleted, "bulk feed delete by author");
        Ok(deleted)
    }

    async fn delete_all_for_post(&self, post_id: Uuid) -> Result<u64> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM feed_items
            WHERE post_id = $1
            "#,
        )
        .bind(post_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        debug!(%post_id, deleted, "feed items purged for deleted post");
        Ok(deleted)
    }

    async fn page_by_owner(&self, owner_id: Uuid, page: PageRequest) -> Result<Page<FeedPost>> {
        // DISTINCT ON collapses duplicate feed rows for the same post, which
        // at-least-once event delivery can produce. Ordering is by the
        // referenced post's timestamp, ties broken by post id for a stable
        // window across pages.
        let items = sqlx::query_as::<_, FeedPost>(
            r#"
            SELECT p.id,
                   p.author_id,
                   p.caption,
                   p.media_urls,
                   u.username AS author_username,
                   u.avatar_url AS author_avatar,
                   p.created_at
            FROM (
                SELECT DISTINCT post_id
                FROM feed_items
                WHERE feed_owner_id = $1
            ) fi
            JOIN posts p ON p.id = fi.post_id
            JOIN users u ON u.id = p.author_id
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT post_id)
            FROM feed_items
            WHERE feed_owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page::new(items, page, total))
    }
}
