//! Domain events that drive feed maintenance.
//!
//! Events are written to the outbox in the same transaction as the write that
//! produced them, so the feed worker only ever sees committed state. Payloads
//! carry bare IDs; the stores insert by ID without loading full entities.

use serde::{Deserialize, Serialize};
use transactional_outbox::OutboxEvent;
use uuid::Uuid;

pub const POST_CREATED: &str = "feed.post.created";
pub const USER_FOLLOWED: &str = "feed.user.followed";
pub const USER_UNFOLLOWED: &str = "feed.user.unfollowed";

/// The three events the feed mutation coordinator reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    PostCreated {
        author_id: Uuid,
        post_id: Uuid,
    },
    UserFollowed {
        follower_id: Uuid,
        followee_id: Uuid,
    },
    UserUnfollowed {
        follower_id: Uuid,
        followee_id: Uuid,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct PostPayload {
    author_id: Uuid,
    post_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
struct FollowPayload {
    follower_id: Uuid,
    followee_id: Uuid,
}

impl FeedEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::PostCreated { .. } => POST_CREATED,
            FeedEvent::UserFollowed { .. } => USER_FOLLOWED,
            FeedEvent::UserUnfollowed { .. } => USER_UNFOLLOWED,
        }
    }

    /// Aggregate (type, id) used for outbox bookkeeping and partitioning.
    pub fn aggregate(&self) -> (&'static str, Uuid) {
        match self {
            FeedEvent::PostCreated { post_id, .. } => ("post", *post_id),
            FeedEvent::UserFollowed { follower_id, .. } => ("follow", *follower_id),
            FeedEvent::UserUnfollowed { follower_id, .. } => ("follow", *follower_id),
        }
    }

    fn payload(&self) -> serde_json::Value {
        match self {
            FeedEvent::PostCreated { author_id, post_id } => serde_json::json!(PostPayload {
                author_id: *author_id,
                post_id: *post_id,
            }),
            FeedEvent::UserFollowed {
                follower_id,
                followee_id,
            } => serde_json::json!(FollowPayload {
                follower_id: *follower_id,
                followee_id: *followee_id,
            }),
            FeedEvent::UserUnfollowed {
                follower_id,
                followee_id,
            } => serde_json::json!(FollowPayload {
                follower_id: *follower_id,
                followee_id: *followee_id,
            }),
        }
    }

    /// Build the outbox row for this event.
    pub fn to_outbox(&self) -> OutboxEvent {
        let (aggregate_type, aggregate_id) = self.aggregate();
        OutboxEvent::new(aggregate_type, aggregate_id, self.event_type(), self.payload())
    }

    /// Parse an outbox row back into a feed event.
    ///
    /// Returns `Ok(None)` for event types this consumer does not handle, so
    /// unrelated events flowing through the same outbox are skipped rather
    /// than dead-lettered.
    pub fn from_outbox(event: &OutboxEvent) -> Result<Option<Self>, serde_json::Error> {
        match event.event_type.as_str() {
            POST_CREATED => {
                let p: PostPayload = serde_json::from_value(event.payload.clone())?;
                Ok(Some(FeedEvent::PostCreated {
                    author_id: p.author_id,
                    post_id: p.post_id,
                }))
            }
            USER_FOLLOWED => {
                let p: FollowPayload = serde_json::from_value(event.payload.clone())?;
                Ok(Some(FeedEvent::UserFollowed {
                    follower_id: p.follower_id,
                    followee_id: p.followee_id,
                }))
            }
            USER_UNFOLLOWED => {
                let p: FollowPayload = serde_json::from_value(event.payload.clone())?;
                Ok(Some(FeedEvent::UserUnfollowed {
                    follower_id: p.follower_id,
                    followee_id: p.followee_id,
                }))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_roundtrip() {
        let event = FeedEvent::PostCreated {
            author_id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
        };
        let outbox = event.to_outbox();
        assert_eq!(outbox.event_type, POST_CREATED);
        assert_eq!(outbox.aggregate_type, "post");

        let parsed = FeedEvent::from_outbox(&outbox).unwrap();
        assert_eq!(parsed, Some(event));
    }

    #[test]
    fn test_follow_events_aggregate_on_follower() {
        let follower_id = Uuid::new_v4();
        let event = FeedEvent::UserUnfollowed {
            follower_id,
            followee_id: Uuid::new_v4(),
        };
        assert_eq!(event.aggregate(), ("follow", follower_id));
    }

    #[test]
    fn test_unknown_event_type_is_skipped() {
        let outbox = OutboxEvent::new(
            "user",
            Uuid::new_v4(),
            "identity.user.created",
            serde_json::json!({"user_id": Uuid::new_v4()}),
        );
        assert_eq!(FeedEvent::from_outbox(&outbox).unwrap(), None);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let outbox = OutboxEvent::new(
            "post",
            Uuid::new_v4(),
            POST_CREATED,
            serde_json::json!({"author_id": "not-a-uuid"}),
        );
        assert!(FeedEvent::from_outbox(&outbox).is_err());
    }
}
