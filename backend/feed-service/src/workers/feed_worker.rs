//! Outbox worker that drives the feed coordinator.
//!
//! The outbox processor polls for committed events and hands each one to
//! [`FeedEventPublisher`], which dispatches it in-process to the feed
//! mutation coordinator. Failures surface as publish errors so the
//! processor's retry and backoff machinery applies.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use transactional_outbox::{
    metrics::OutboxMetrics, OutboxError, OutboxEvent, OutboxProcessor, OutboxPublisher,
    OutboxResult, SqlxOutboxRepository,
};

use crate::events::FeedEvent;
use crate::repository::{FeedItemStore, PostStore, SocialGraphStore};
use crate::services::FeedMutationCoordinator;

const BATCH_SIZE: i32 = 100;
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_RETRIES: i32 = 5;

/// In-process publisher: delivery means applying the event to the feed table.
pub struct FeedEventPublisher<G, P, F> {
    coordinator: Arc<FeedMutationCoordinator<G, P, F>>,
}

impl<G, P, F> FeedEventPublisher<G, P, F> {
    pub fn new(coordinator: Arc<FeedMutationCoordinator<G, P, F>>) -> Self {
        Self { coordinator }
    }
}

#[async_trait::async_trait]
impl<G, P, F> OutboxPublisher for FeedEventPublisher<G, P, F>
where
    G: SocialGraphStore + Send + Sync,
    P: PostStore + Send + Sync,
    F: FeedItemStore + Send + Sync,
{
    async fn publish(&self, event: &OutboxEvent) -> OutboxResult<()> {
        match FeedEvent::from_outbox(event)? {
            Some(feed_event) => self
                .coordinator
                .apply(&feed_event)
                .await
                .map_err(|e| OutboxError::PublishFailed(e.to_string())),
            None => {
                // Unknown event types are acked, not retried forever.
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "skipping outbox event with unknown type"
                );
                Ok(())
            }
        }
    }
}

/// Start the background outbox processor that drains feed events.
pub async fn run<G, P, F>(
    repo: Arc<SqlxOutboxRepository>,
    coordinator: Arc<FeedMutationCoordinator<G, P, F>>,
) -> anyhow::Result<()>
where
    G: SocialGraphStore + Send + Sync + 'static,
    P: PostStore + Send + Sync + 'static,
    F: FeedItemStore + Send + Sync + 'static,
{
    info!("Starting feed outbox worker");

    let publisher = Arc::new(FeedEventPublisher::new(coordinator));
    let metrics = OutboxMetrics::new("feed_service");
    let processor = OutboxProcessor::new_with_metrics(
        repo,
        publisher,
        metrics,
        BATCH_SIZE,
        POLL_INTERVAL,
        MAX_RETRIES,
    );

    processor.start().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MockFeedItemStore, MockPostStore, MockSocialGraphStore};
    use crate::services::FanoutPolicy;
    use uuid::Uuid;

    fn publisher(
        graph: MockSocialGraphStore,
        posts: MockPostStore,
        feed: MockFeedItemStore,
    ) -> FeedEventPublisher<MockSocialGraphStore, MockPostStore, MockFeedItemStore> {
        let coordinator = FeedMutationCoordinator::new(
            Arc::new(graph),
            Arc::new(posts),
            Arc::new(feed),
            FanoutPolicy::default(),
        );
        FeedEventPublisher::new(Arc::new(coordinator))
    }

    #[tokio::test]
    async fn test_publish_applies_feed_event() {
        let follower_id = Uuid::new_v4();
        let followee_id = Uuid::new_v4();

        let mut feed = MockFeedItemStore::new();
        feed.expect_bulk_delete_by_owner_and_author()
            .withf(move |owner, author| *owner == follower_id && *author == followee_id)
            .times(1)
            .returning(|_, _| Ok(2));

        let p = publisher(MockSocialGraphStore::new(), MockPostStore::new(), feed);
        let outbox_event = FeedEvent::UserUnfollowed {
            follower_id,
            followee_id,
        }
        .to_outbox();

        p.publish(&outbox_event).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_acked() {
        let p = publisher(
            MockSocialGraphStore::new(),
            MockPostStore::new(),
            MockFeedItemStore::new(),
        );

        let outbox_event = OutboxEvent::new(
            "post",
            Uuid::new_v4(),
            "feed.post.archived",
            serde_json::json!({}),
        );

        // Never reaches the coordinator, never errors.
        p.publish(&outbox_event).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_payload_is_a_publish_error() {
        let p = publisher(
            MockSocialGraphStore::new(),
            MockPostStore::new(),
            MockFeedItemStore::new(),
        );

        let outbox_event = OutboxEvent::new(
            "post",
            Uuid::new_v4(),
            crate::events::POST_CREATED,
            serde_json::json!({"unexpected": "shape"}),
        );

        let result = p.publish(&outbox_event).await;
        assert!(matches!(result, Err(OutboxError::SerializationError(_))));
    }

    #[tokio::test]
    async fn test_coordinator_failure_is_a_publish_error() {
        let mut graph = MockSocialGraphStore::new();
        graph
            .expect_list_follower_ids()
            .returning(|_| Err(crate::error::AppError::Internal("db down".to_string())));

        let p = publisher(graph, MockPostStore::new(), MockFeedItemStore::new());
        let outbox_event = FeedEvent::PostCreated {
            author_id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
        }
        .to_outbox();

        let result = p.publish(&outbox_event).await;
        assert!(matches!(result, Err(OutboxError::PublishFailed(_))));
    }
}
