//! Feed mutation coordinator: the fan-out-on-write engine.
//!
//! Translates the three committed domain events into feed-table mutations:
//!
//! - `PostCreated` fans the post out to every current follower, one
//!   independent insert per follower
//! - `UserFollowed` backfills the follower's feed with the followee's most
//!   recent posts, bounded by `backfill_limit`
//! - `UserUnfollowed` bulk-deletes the followee's posts from the follower's
//!   feed, from any follow period
//!
//! Events arrive through the outbox worker, so every event refers to
//! already-committed rows. There is no atomicity across a fan-out: a crash
//! mid-way leaves a partial feed, which the outbox redelivery converges.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::FeedConfig;
use crate::error::Result;
use crate::events::FeedEvent;
use crate::repository::{FeedItemStore, PostStore, SocialGraphStore};

/// Tuning for fan-out and backfill, derived from [`FeedConfig`].
#[derive(Debug, Clone)]
pub struct FanoutPolicy {
    /// Posts copied into a new follower's feed.
    pub backfill_limit: i64,
    /// Max in-flight per-follower inserts during post fan-out.
    pub fanout_concurrency: usize,
    /// Per-follower insert timeout.
    pub unit_timeout: Duration,
}

impl From<&FeedConfig> for FanoutPolicy {
    fn from(config: &FeedConfig) -> Self {
        Self {
            backfill_limit: config.backfill_limit,
            fanout_concurrency: config.fanout_concurrency.max(1),
            unit_timeout: Duration::from_secs(config.fanout_timeout_secs),
        }
    }
}

impl Default for FanoutPolicy {
    fn default() -> Self {
        Self {
            backfill_limit: 5,
            fanout_concurrency: 16,
            unit_timeout: Duration::from_secs(5),
        }
    }
}

pub struct FeedMutationCoordinator<G, P, F> {
    graph: Arc<G>,
    posts: Arc<P>,
    feed: Arc<F>,
    policy: FanoutPolicy,
}

impl<G, P, F> FeedMutationCoordinator<G, P, F>
where
    G: SocialGraphStore,
    P: PostStore,
    F: FeedItemStore,
{
    pub fn new(graph: Arc<G>, posts: Arc<P>, feed: Arc<F>, policy: FanoutPolicy) -> Self {
        Self {
            graph,
            posts,
            feed,
            policy,
        }
    }

    /// Apply one committed event to the feed table.
    ///
    /// An `Err` here means the event as a whole could not be processed (for
    /// example the follower lookup failed) and should be retried by the
    /// caller. Per-follower insert failures during fan-out are logged and
    /// skipped, never failing the event.
    pub async fn apply(&self, event: &FeedEvent) -> Result<()> {
        match event {
            FeedEvent::PostCreated { author_id, post_id } => {
                self.fan_out_post(*author_id, *post_id).await
            }
            FeedEvent::UserFollowed {
                follower_id,
                followee_id,
            } => self.backfill_follow(*follower_id, *followee_id).await,
            FeedEvent::UserUnfollowed {
                follower_id,
                followee_id,
            } => self.purge_unfollow(*follower_id, *followee_id).await,
        }
    }

    /// Unconditional fan-out: every current follower gets the item.
    async fn fan_out_post(&self, author_id: Uuid, post_id: Uuid) -> Result<()> {
        let follower_ids = self.graph.list_follower_ids(author_id).await?;

        if follower_ids.is_empty() {
            info!(%author_id, %post_id, "post has no followers to fan out to");
            return Ok(());
        }

        let total = follower_ids.len();
        let failed = stream::iter(follower_ids)
            .map(|follower_id| {
                let feed = Arc::clone(&self.feed);
                let unit_timeout = self.policy.unit_timeout;
                async move {
                    match timeout(unit_timeout, feed.append(follower_id, post_id)).await {
                        Ok(Ok(_)) => 0usize,
                        Ok(Err(e)) => {
                            warn!(%follower_id, %post_id, error = %e, "feed append failed, skipping follower");
                            1
                        }
                        Err(_) => {
                            warn!(%follower_id, %post_id, "feed append timed out, skipping follower");
                            1
                        }
                    }
                }
            })
            .buffer_unordered(self.policy.fanout_concurrency)
            .fold(0usize, |acc, failures| async move { acc + failures })
            .await;

        info!(
            %author_id,
            %post_id,
            followers = total,
            failed,
            "post fanned out to followers"
        );
        Ok(())
    }

    /// Bounded backfill: at most `backfill_limit` of the followee's most
    /// recent posts land in the new follower's feed.
    ///
    /// The edge is re-checked at delivery time: an unfollow racing this event
    /// through the outbox must not resurrect the followee's posts.
    async fn backfill_follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<()> {
        if !self.graph.exists(follower_id, followee_id).await? {
            info!(%follower_id, %followee_id, "follow edge gone before backfill, skipping");
            return Ok(());
        }

        let recent = self
            .posts
            .most_recent_by_author(followee_id, self.policy.backfill_limit)
            .await?;

        if recent.is_empty() {
            info!(%follower_id, %followee_id, "followee has no posts to backfill");
            return Ok(());
        }

        let items: Vec<(Uuid, Uuid)> = recent
            .iter()
            .map(|post| (follower_id, post.id))
            .collect();

        let inserted = self.feed.bulk_append(&items).await?;

        info!(
            %follower_id,
            %followee_id,
            backfilled = inserted,
            "backfilled recent posts into follower's feed"
        );
        Ok(())
    }

    /// Targeted fan-in: every item by the followee leaves the follower's
    /// feed, including items from earlier follow periods.
    async fn purge_unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<()> {
        let deleted = self
            .feed
            .bulk_delete_by_owner_and_author(follower_id, followee_id)
            .await?;

        info!(
            %follower_id,
            %followee_id,
            deleted,
            "purged unfollowed author's posts from feed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeedItem, Post};
    use crate::error::AppError;
    use crate::repository::{MockFeedItemStore, MockPostStore, MockSocialGraphStore};
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn feed_item(owner_id: Uuid, post_id: Uuid) -> FeedItem {
        FeedItem {
            id: Uuid::new_v4(),
            feed_owner_id: owner_id,
            post_id,
            created_at: Utc::now(),
        }
    }

    fn post(author_id: Uuid) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id,
            caption: "caption".to_string(),
            media_urls: vec![],
            created_at: Utc::now(),
        }
    }

    fn coordinator(
        graph: MockSocialGraphStore,
        posts: MockPostStore,
        feed: MockFeedItemStore,
    ) -> FeedMutationCoordinator<MockSocialGraphStore, MockPostStore, MockFeedItemStore> {
        FeedMutationCoordinator::new(
            Arc::new(graph),
            Arc::new(posts),
            Arc::new(feed),
            FanoutPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_post_created_fans_out_to_every_follower() {
        let author_id = Uuid::new_v4();
        let post_id = Uuid::new_v4();
        let followers: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let expected: HashSet<Uuid> = followers.iter().copied().collect();

        let mut graph = MockSocialGraphStore::new();
        let followers_clone = followers.clone();
        graph
            .expect_list_follower_ids()
            .withf(move |id| *id == author_id)
            .times(1)
            .returning(move |_| Ok(followers_clone.clone()));

        let appended = Arc::new(Mutex::new(Vec::new()));
        let appended_clone = Arc::clone(&appended);

        let mut feed = MockFeedItemStore::new();
        feed.expect_append()
            .times(3)
            .returning(move |owner, post| {
                appended_clone.lock().unwrap().push(owner);
                Ok(feed_item(owner, post))
            });

        let c = coordinator(graph, MockPostStore::new(), feed);
        c.apply(&FeedEvent::PostCreated { author_id, post_id })
            .await
            .unwrap();

        let appended: HashSet<Uuid> = appended.lock().unwrap().iter().copied().collect();
        assert_eq!(appended, expected);
    }

    #[tokio::test]
    async fn test_post_created_continues_past_failed_followers() {
        let author_id = Uuid::new_v4();
        let post_id = Uuid::new_v4();
        let unlucky = Uuid::new_v4();
        let followers = vec![Uuid::new_v4(), unlucky, Uuid::new_v4()];

        let mut graph = MockSocialGraphStore::new();
        let followers_clone = followers.clone();
        graph
            .expect_list_follower_ids()
            .returning(move |_| Ok(followers_clone.clone()));

        let mut feed = MockFeedItemStore::new();
        feed.expect_append()
            .times(3)
            .returning(move |owner, post| {
                if owner == unlucky {
                    Err(AppError::Internal("insert refused".to_string()))
                } else {
                    Ok(feed_item(owner, post))
                }
            });

        let c = coordinator(graph, MockPostStore::new(), feed);

        // One failed unit must not fail the event.
        c.apply(&FeedEvent::PostCreated { author_id, post_id })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_post_created_fails_when_follower_lookup_fails() {
        let mut graph = MockSocialGraphStore::new();
        graph
            .expect_list_follower_ids()
            .returning(|_| Err(AppError::Internal("graph store down".to_string())));

        let c = coordinator(graph, MockPostStore::new(), MockFeedItemStore::new());

        let result = c
            .apply(&FeedEvent::PostCreated {
                author_id: Uuid::new_v4(),
                post_id: Uuid::new_v4(),
            })
            .await;
        assert!(result.is_err());
    }

    fn graph_with_edge() -> MockSocialGraphStore {
        let mut graph = MockSocialGraphStore::new();
        graph.expect_exists().returning(|_, _| Ok(true));
        graph
    }

    #[tokio::test]
    async fn test_follow_backfills_at_most_five_recent_posts() {
        let follower_id = Uuid::new_v4();
        let followee_id = Uuid::new_v4();

        let mut posts = MockPostStore::new();
        posts
            .expect_most_recent_by_author()
            .withf(move |author, limit| *author == followee_id && *limit == 5)
            .times(1)
            .returning(move |author, limit| {
                // Store honours the limit; seven posts exist but five come back.
                assert_eq!(limit, 5);
                Ok((0..5).map(|_| post(author)).collect())
            });

        let mut feed = MockFeedItemStore::new();
        feed.expect_bulk_append()
            .withf(move |items| {
                items.len() == 5 && items.iter().all(|(owner, _)| *owner == follower_id)
            })
            .times(1)
            .returning(|items| Ok(items.len() as u64));

        let c = coordinator(graph_with_edge(), posts, feed);
        c.apply(&FeedEvent::UserFollowed {
            follower_id,
            followee_id,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_follow_backfill_exhaustion_with_fewer_posts() {
        let follower_id = Uuid::new_v4();
        let followee_id = Uuid::new_v4();

        let mut posts = MockPostStore::new();
        posts
            .expect_most_recent_by_author()
            .returning(|author, _| Ok((0..2).map(|_| post(author)).collect()));

        let mut feed = MockFeedItemStore::new();
        feed.expect_bulk_append()
            .withf(|items| items.len() == 2)
            .times(1)
            .returning(|items| Ok(items.len() as u64));

        let c = coordinator(graph_with_edge(), posts, feed);
        c.apply(&FeedEvent::UserFollowed {
            follower_id,
            followee_id,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_follow_with_no_posts_skips_bulk_append() {
        let mut posts = MockPostStore::new();
        posts
            .expect_most_recent_by_author()
            .returning(|_, _| Ok(vec![]));

        let mut feed = MockFeedItemStore::new();
        feed.expect_bulk_append().times(0);

        let c = coordinator(graph_with_edge(), posts, feed);
        c.apply(&FeedEvent::UserFollowed {
            follower_id: Uuid::new_v4(),
            followee_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_follow_backfill_skipped_when_edge_already_removed() {
        let follower_id = Uuid::new_v4();
        let followee_id = Uuid::new_v4();

        let mut graph = MockSocialGraphStore::new();
        graph
            .expect_exists()
            .withf(move |follower, followee| {
                *follower == follower_id && *followee == followee_id
            })
            .times(1)
            .returning(|_, _| Ok(false));

        let mut posts = MockPostStore::new();
        posts.expect_most_recent_by_author().times(0);

        let mut feed = MockFeedItemStore::new();
        feed.expect_bulk_append().times(0);

        let c = coordinator(graph, posts, feed);
        c.apply(&FeedEvent::UserFollowed {
            follower_id,
            followee_id,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_unfollow_purges_exactly_the_target_author() {
        let follower_id = Uuid::new_v4();
        let followee_id = Uuid::new_v4();

        let mut feed = MockFeedItemStore::new();
        feed.expect_bulk_delete_by_owner_and_author()
            .withf(move |owner, author| *owner == follower_id && *author == followee_id)
            .times(1)
            .returning(|_, _| Ok(6));

        let c = coordinator(MockSocialGraphStore::new(), MockPostStore::new(), feed);
        c.apply(&FeedEvent::UserUnfollowed {
            follower_id,
            followee_id,
        })
        .await
        .unwrap();
    }
}
