pub mod models;

pub use models::{
    FeedItem, FeedPost, FollowEdge, Page, PageRequest, Post, PostWithLiked, User,
};
