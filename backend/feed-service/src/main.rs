use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::info;

use feed_service::config::Config;
use feed_service::handlers;
use feed_service::repository::{
    FeedItemRepository, FollowRepository, LikeRepository, PostRepository, UserRepository,
};
use feed_service::services::{FanoutPolicy, FeedMutationCoordinator, FeedReadService};
use feed_service::workers::feed_worker;
use transactional_outbox::SqlxOutboxRepository;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}

async fn outbox_stats(repo: web::Data<Arc<SqlxOutboxRepository>>) -> impl Responder {
    match repo.pending_stats().await {
        Ok((count, age)) => HttpResponse::Ok().json(serde_json::json!({
            "pending_count": count,
            "oldest_pending_age_seconds": age,
        })),
        Err(e) => HttpResponse::InternalServerError().body(format!("error: {}", e)),
    }
}

#[derive(serde::Deserialize)]
struct ReplaySinceQuery {
    /// RFC3339 timestamp
    ts: String,
}

async fn outbox_replay_since(
    repo: web::Data<Arc<SqlxOutboxRepository>>,
    query: web::Query<ReplaySinceQuery>,
) -> impl Responder {
    match DateTime::parse_from_rfc3339(&query.ts).map(|dt| dt.with_timezone(&Utc)) {
        Ok(ts) => match repo.replay_since(ts).await {
            Ok(affected) => HttpResponse::Ok().json(serde_json::json!({
                "replayed": affected,
                "since": query.ts,
            })),
            Err(e) => HttpResponse::InternalServerError().body(format!("error: {}", e)),
        },
        Err(e) => HttpResponse::BadRequest().body(format!("invalid ts: {}", e)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    info!("Starting feed-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Configuration loaded: env={}, http_port={}",
        config.app.env, config.app.http_port
    );

    let db_config = db_pool::DbConfig {
        service_name: "feed-service".to_string(),
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        ..db_pool::DbConfig::default()
    };
    db_config.log_config();
    let pg_pool = db_pool::create_pool(db_config)
        .await
        .context("Failed to create database pool")?;

    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let outbox_repo = Arc::new(SqlxOutboxRepository::new(pg_pool.clone()));

    let follows = FollowRepository::new(pg_pool.clone(), outbox_repo.clone());
    let posts = PostRepository::new(pg_pool.clone(), outbox_repo.clone());
    let likes = LikeRepository::new(pg_pool.clone());
    let feed_items = FeedItemRepository::new(pg_pool.clone());
    let users = UserRepository::new(pg_pool.clone());

    let coordinator = Arc::new(FeedMutationCoordinator::new(
        Arc::new(follows.clone()),
        Arc::new(posts.clone()),
        Arc::new(feed_items.clone()),
        FanoutPolicy::from(&config.feed),
    ));

    let feed_reader = web::Data::new(FeedReadService::new(
        Arc::new(feed_items.clone()),
        Arc::new(likes.clone()),
    ));
    let follows_data = web::Data::new(follows);
    let posts_data = web::Data::new(posts);
    let likes_data = web::Data::new(likes);
    let users_data = web::Data::new(users);

    let outbox_admin_enabled = std::env::var("FEED_OUTBOX_ADMIN_ENABLED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(true);

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    info!("HTTP server listening on http://{}", http_addr);

    let admin_repo = outbox_repo.clone();
    let http_server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(feed_reader.clone())
            .app_data(follows_data.clone())
            .app_data(posts_data.clone())
            .app_data(likes_data.clone())
            .app_data(users_data.clone())
            .configure(handlers::configure_routes);

        if outbox_admin_enabled {
            app = app
                .app_data(web::Data::new(admin_repo.clone()))
                .route("/admin/outbox/stats", web::get().to(outbox_stats))
                .route(
                    "/admin/outbox/replay_since",
                    web::post().to(outbox_replay_since),
                );
        }

        app
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .run();

    let mut join_set = JoinSet::new();

    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });

    join_set.spawn(feed_worker::run(outbox_repo, coordinator));

    info!("feed-service is running");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        Some(result) = join_set.join_next() => {
            match result {
                Ok(Ok(())) => info!("Task completed"),
                Ok(Err(e)) => {
                    tracing::error!("Task failed: {:#}", e);
                    join_set.shutdown().await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Task panicked: {:#}", e);
                    join_set.shutdown().await;
                    return Err(anyhow::anyhow!("Task panicked: {}", e));
                }
            }
        }
    }

    join_set.shutdown().await;
    info!("feed-service shutting down");
    Ok(())
}
