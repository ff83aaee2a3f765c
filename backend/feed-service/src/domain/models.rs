use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimal user record, enough to render an author line
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Post entity - author and created_at are immutable after creation
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub caption: String,
    pub media_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Follow edge - follower_id follows followee_id
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEdge {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Materialized feed entry: "this post appears in this owner's following feed"
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedItem {
    pub id: Uuid,
    pub feed_owner_id: Uuid,
    pub post_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A post as rendered in a feed page, already joined with its author
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedPost {
    pub id: Uuid,
    pub author_id: Uuid,
    pub caption: String,
    pub media_urls: Vec<String>,
    pub author_username: String,
    pub author_avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Feed post annotated with whether the requesting user has liked it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithLiked {
    #[serde(flatten)]
    pub post: FeedPost,
    pub liked: bool,
}

/// Zero-based page window with a bounded size
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const MAX_SIZE: u32 = 100;
    pub const DEFAULT_SIZE: u32 = 20;

    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        self.page as i64 * self.size as i64
    }

    pub fn limit(&self) -> i64 {
        self.size as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

/// One page of results plus metadata for the client
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_count: i64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_count: i64) -> Self {
        let has_more = request.offset() + (items.len() as i64) < total_count;
        Self {
            items,
            page: request.page,
            size: request.size,
            total_count,
            has_more,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_count: self.total_count,
            has_more: self.has_more,
        }
    }
}
