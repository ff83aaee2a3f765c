//! Read side of the following feed: paginated, newest-first, annotated with
//! the viewer's like status.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Page, PageRequest, PostWithLiked};
use crate::error::{AppError, Result};
use crate::repository::{FeedItemStore, LikeStore};

pub struct FeedReadService<F, L> {
    feed: Arc<F>,
    likes: Arc<L>,
}

impl<F, L> FeedReadService<F, L>
where
    F: FeedItemStore,
    L: LikeStore,
{
    pub fn new(feed: Arc<F>, likes: Arc<L>) -> Self {
        Self { feed, likes }
    }

    /// One page of the owner's following feed, newest post first.
    ///
    /// An empty page is a `NotFound` error, never an empty 200: the feed is
    /// only ever empty when the owner follows nobody with posts, and clients
    /// render that state from the 404.
    pub async fn get_following_feed(
        &self,
        owner_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<PostWithLiked>> {
        let posts = self.feed.page_by_owner(owner_id, page).await?;

        if posts.is_empty() {
            return Err(AppError::NotFound(
                "No posts found from users you are following".to_string(),
            ));
        }

        let post_ids: Vec<Uuid> = posts.items.iter().map(|post| post.id).collect();
        let liked = self.likes.batch_check_liked(owner_id, &post_ids).await?;

        Ok(posts.map(|post| {
            let liked = liked.get(&post.id).copied().unwrap_or(false);
            PostWithLiked { post, liked }
        }))
    }
}
