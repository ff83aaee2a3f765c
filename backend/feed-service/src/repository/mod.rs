//! Store traits and their sqlx/Postgres implementations.
//!
//! The coordinator and read service talk to these traits so the fan-out and
//! paging logic can be tested against mocks without a database.

pub mod feed_items;
pub mod follows;
pub mod likes;
pub mod posts;
pub mod users;

pub use feed_items::FeedItemRepository;
pub use follows::FollowRepository;
pub use likes::LikeRepository;
pub use posts::PostRepository;
pub use users::UserRepository;

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{FeedItem, FeedPost, Page, PageRequest, Post};
use crate::error::Result;

/// Persisted follow edges (follower -> followee).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialGraphStore: Send + Sync {
    /// All follower IDs of the given user. Unbounded: post fan-out visits
    /// every current follower.
    async fn list_follower_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    async fn exists(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool>;
}

/// Persisted posts, read-only from the coordinator's perspective.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostStore: Send + Sync {
    /// The author's `limit` most recent posts, newest first.
    async fn most_recent_by_author(&self, author_id: Uuid, limit: i64) -> Result<Vec<Post>>;
}

/// The materialized per-owner feed table. Rows are owned exclusively by the
/// feed mutation coordinator; reads go through `page_by_owner`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedItemStore: Send + Sync {
    /// Insert one feed item. No storage-level dedupe; callers must not issue
    /// duplicates within a single event.
    async fn append(&self, owner_id: Uuid, post_id: Uuid) -> Result<FeedItem>;

    /// Insert many feed items in one statement. Rows are independent, so
    /// all-or-nothing semantics are not required by callers.
    async fn bulk_append(&self, items: &[(Uuid, Uuid)]) -> Result<u64>;

    /// Delete every feed item owned by `owner_id` whose post was authored by
    /// `author_id`, regardless of when the items were created.
    async fn bulk_delete_by_owner_and_author(&self, owner_id: Uuid, author_id: Uuid)
        -> Result<u64>;

    /// Delete every feed item referencing the given post.
    async fn delete_all_for_post(&self, post_id: Uuid) -> Result<u64>;

    /// One page of the owner's feed, ordered by the referenced post's
    /// created_at descending. Duplicate rows for the same post collapse here.
    async fn page_by_owner(&self, owner_id: Uuid, page: PageRequest) -> Result<Page<FeedPost>>;
}

/// Liked-status lookups for feed annotation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LikeStore: Send + Sync {
    /// Batch check which of `post_ids` the user has liked. One query per page,
    /// never one per post.
    async fn batch_check_liked(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, bool>>;
}
