pub mod fanout;
pub mod feed;

pub use fanout::{FanoutPolicy, FeedMutationCoordinator};
pub use feed::FeedReadService;

use crate::repository::{FeedItemRepository, FollowRepository, LikeRepository, PostRepository};

/// Concrete wiring used by the running service; tests substitute mocks.
pub type FeedCoordinator =
    FeedMutationCoordinator<FollowRepository, PostRepository, FeedItemRepository>;
pub type FollowingFeedReader = FeedReadService<FeedItemRepository, LikeRepository>;
