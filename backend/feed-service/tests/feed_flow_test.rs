//! End-to-end feed flow against a live PostgreSQL instance.
//!
//! Requires DATABASE_URL pointing at a disposable database:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/feed_test cargo test -p feed-service -- --ignored
//! ```

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use feed_service::domain::{PageRequest, Post, User};
use feed_service::error::AppError;
use feed_service::repository::{
    FeedItemRepository, FeedItemStore, FollowRepository, LikeRepository, PostRepository,
    UserRepository,
};
use feed_service::services::{
    FanoutPolicy, FeedCoordinator, FeedMutationCoordinator, FeedReadService, FollowingFeedReader,
};
use feed_service::workers::FeedEventPublisher;
use transactional_outbox::{OutboxPublisher, OutboxRepository, SqlxOutboxRepository};

struct TestEnv {
    outbox: Arc<SqlxOutboxRepository>,
    follows: FollowRepository,
    posts: PostRepository,
    likes: LikeRepository,
    users: UserRepository,
    feed_items: FeedItemRepository,
    reader: FollowingFeedReader,
    coordinator: Arc<FeedCoordinator>,
}

async fn setup() -> TestEnv {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool: PgPool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let outbox = Arc::new(SqlxOutboxRepository::new(pool.clone()));
    let follows = FollowRepository::new(pool.clone(), outbox.clone());
    let posts = PostRepository::new(pool.clone(), outbox.clone());
    let likes = LikeRepository::new(pool.clone());
    let feed_items = FeedItemRepository::new(pool.clone());
    let users = UserRepository::new(pool.clone());

    let coordinator = Arc::new(FeedMutationCoordinator::new(
        Arc::new(follows.clone()),
        Arc::new(posts.clone()),
        Arc::new(feed_items.clone()),
        FanoutPolicy::default(),
    ));

    let reader = FeedReadService::new(Arc::new(feed_items.clone()), Arc::new(likes.clone()));

    TestEnv {
        outbox,
        follows,
        posts,
        likes,
        users,
        feed_items,
        reader,
        coordinator,
    }
}

/// Dispatch every pending outbox event through the in-process publisher,
/// the same path the background worker takes.
async fn drain_outbox(env: &TestEnv) {
    let publisher = FeedEventPublisher::new(env.coordinator.clone());
    loop {
        let events = env
            .outbox
            .get_unpublished(100)
            .await
            .expect("failed to read outbox");
        if events.is_empty() {
            break;
        }
        for event in events {
            publisher.publish(&event).await.expect("publish failed");
            env.outbox
                .mark_published(event.id)
                .await
                .expect("mark_published failed");
        }
    }
}

async fn new_user(env: &TestEnv, name: &str) -> User {
    // Unique usernames let the test rerun against the same database.
    let username = format!("{}-{}", name, Uuid::new_v4());
    env.users
        .create_user(&username, None)
        .await
        .expect("failed to create user")
}

async fn new_post(env: &TestEnv, author: Uuid, caption: &str) -> Post {
    let post = env
        .posts
        .create_post(author, caption, &[])
        .await
        .expect("failed to create post");
    // Keep created_at strictly increasing across posts.
    tokio::time::sleep(Duration::from_millis(5)).await;
    post
}

#[tokio::test]
#[ignore]
async fn test_follow_backfill_fanout_and_unfollow_flow() {
    let env = setup().await;

    let alice = new_user(&env, "alice").await;
    let bob = new_user(&env, "bob").await;

    // Alice has seven posts before anyone follows her.
    let mut alice_posts = Vec::new();
    for i in 0..7 {
        alice_posts.push(new_post(&env, alice.id, &format!("post {}", i)).await);
    }
    drain_outbox(&env).await;

    // Bob's feed starts empty.
    let empty = env
        .reader
        .get_following_feed(bob.id, PageRequest::default())
        .await;
    assert!(matches!(empty, Err(AppError::NotFound(_))));

    // Following backfills the five most recent posts only.
    assert!(env.follows.follow(bob.id, alice.id).await.unwrap());
    drain_outbox(&env).await;

    let page = env
        .reader
        .get_following_feed(bob.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.total_count, 5);
    // Newest first, and the two oldest posts are not in the feed.
    assert_eq!(page.items[0].post.id, alice_posts[6].id);
    assert_eq!(page.items[4].post.id, alice_posts[2].id);

    // A new post fans out on top of the backfilled items.
    let p8 = new_post(&env, alice.id, "post 8").await;
    drain_outbox(&env).await;

    let page = env
        .reader
        .get_following_feed(bob.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 6);
    assert_eq!(page.items[0].post.id, p8.id);

    // Liked annotation reflects Bob's likes on the page.
    assert!(env.likes.like(bob.id, p8.id).await.unwrap());
    let page = env
        .reader
        .get_following_feed(bob.id, PageRequest::default())
        .await
        .unwrap();
    assert!(page.items[0].liked);
    assert!(!page.items[1].liked);

    // Unfollow purges every item by Alice, including backfilled ones.
    assert!(env.follows.unfollow(bob.id, alice.id).await.unwrap());
    drain_outbox(&env).await;

    let after = env
        .reader
        .get_following_feed(bob.id, PageRequest::default())
        .await;
    assert!(matches!(after, Err(AppError::NotFound(_))));
}

#[tokio::test]
#[ignore]
async fn test_post_delete_removes_item_from_feeds() {
    let env = setup().await;

    let author = new_user(&env, "author").await;
    let fan = new_user(&env, "fan").await;

    assert!(env.follows.follow(fan.id, author.id).await.unwrap());
    let post = new_post(&env, author.id, "soon deleted").await;
    drain_outbox(&env).await;

    let page = env
        .reader
        .get_following_feed(fan.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);

    assert!(env.posts.delete_by_id(post.id).await.unwrap());

    // Feed cleanup is transactional with the delete, no outbox drain needed.
    let after = env
        .reader
        .get_following_feed(fan.id, PageRequest::default())
        .await;
    assert!(matches!(after, Err(AppError::NotFound(_))));
}

#[tokio::test]
#[ignore]
async fn test_redelivered_event_collapses_to_one_post_at_read() {
    let env = setup().await;

    let author = new_user(&env, "author").await;
    let fan = new_user(&env, "fan").await;

    assert!(env.follows.follow(fan.id, author.id).await.unwrap());
    drain_outbox(&env).await;

    let post = new_post(&env, author.id, "delivered twice").await;

    // Deliver the pending event twice before acking, the way a crash between
    // publish and mark_published replays it.
    let publisher = FeedEventPublisher::new(env.coordinator.clone());
    let events = env.outbox.get_unpublished(100).await.unwrap();
    assert_eq!(events.len(), 1);
    for event in &events {
        publisher.publish(event).await.unwrap();
        publisher.publish(event).await.unwrap();
        env.outbox.mark_published(event.id).await.unwrap();
    }

    // Two physical feed rows, one post on the page, distinct total.
    let page = env
        .reader
        .get_following_feed(fan.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].post.id, post.id);
    assert_eq!(page.total_count, 1);

    // Purging by post removes every duplicate row.
    let removed = env.feed_items.delete_all_for_post(post.id).await.unwrap();
    assert_eq!(removed, 2);

    let after = env
        .reader
        .get_following_feed(fan.id, PageRequest::default())
        .await;
    assert!(matches!(after, Err(AppError::NotFound(_))));
}

#[tokio::test]
#[ignore]
async fn test_pagination_window_is_stable() {
    let env = setup().await;

    let author = new_user(&env, "prolific").await;
    let reader_user = new_user(&env, "reader").await;

    assert!(env.follows.follow(reader_user.id, author.id).await.unwrap());
    drain_outbox(&env).await;

    let mut post_ids = Vec::new();
    for i in 0..8 {
        post_ids.push(new_post(&env, author.id, &format!("p{}", i)).await.id);
    }
    drain_outbox(&env).await;

    let first = env
        .reader
        .get_following_feed(reader_user.id, PageRequest::new(0, 3))
        .await
        .unwrap();
    let second = env
        .reader
        .get_following_feed(reader_user.id, PageRequest::new(1, 3))
        .await
        .unwrap();

    assert_eq!(first.items.len(), 3);
    assert_eq!(second.items.len(), 3);
    assert!(first.has_more);
    assert_eq!(first.total_count, 8);

    // Pages are disjoint and globally newest-first.
    let combined: Vec<Uuid> = first
        .items
        .iter()
        .chain(second.items.iter())
        .map(|p| p.post.id)
        .collect();
    let expected: Vec<Uuid> = post_ids.iter().rev().take(6).copied().collect();
    assert_eq!(combined, expected);
}
