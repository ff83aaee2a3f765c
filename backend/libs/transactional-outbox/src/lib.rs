//! # Transactional Outbox Pattern Implementation
//!
//! This library guarantees that a business write and the domain event it emits
//! are persisted atomically, and that the event is delivered to its consumer
//! only after the triggering transaction has durably committed.
//!
//! How it works:
//! 1. Business logic inserts its rows and the event into an `outbox_events`
//!    table within the same transaction
//! 2. A background processor polls for unpublished events and hands them to the
//!    configured [`OutboxPublisher`]
//! 3. Events are marked as published only after the publisher accepts them
//!
//! This gives **at-least-once delivery** even if:
//! - The service crashes after the database commit but before dispatch
//! - The consumer is temporarily failing
//!
//! Consumers must therefore tolerate redelivery. The publisher is pluggable: it
//! can hand events to an in-process worker, a message broker, or anything else
//! that implements the trait.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use transactional_outbox::{OutboxEvent, OutboxRepository, SqlxOutboxRepository};
//! use sqlx::PgPool;
//! use uuid::Uuid;
//! use chrono::Utc;
//!
//! async fn create_post(
//!     pool: &PgPool,
//!     outbox_repo: &SqlxOutboxRepository,
//!     author_id: Uuid,
//!     caption: String,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!
//!     let post_id = Uuid::new_v4();
//!     sqlx::query("INSERT INTO posts (id, author_id, caption) VALUES ($1, $2, $3)")
//!         .bind(post_id)
//!         .bind(author_id)
//!         .bind(&caption)
//!         .execute(&mut *tx)
//!         .await?;
//!
//!     // Same transaction: the event exists iff the post exists.
//!     let event = OutboxEvent::new(
//!         "post",
//!         post_id,
//!         "feed.post.created",
//!         serde_json::json!({ "post_id": post_id, "author_id": author_id }),
//!     );
//!     outbox_repo.insert(&mut tx, &event).await?;
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

mod error;
pub mod metrics;

pub use error::{OutboxError, OutboxResult};

/// Represents an event stored in the outbox table.
///
/// Events are created within a database transaction alongside business logic
/// changes, ensuring atomicity. They are later dispatched by the background
/// processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// Type of aggregate this event relates to (e.g., "post", "follow")
    pub aggregate_type: String,

    /// ID of the entity this event relates to
    pub aggregate_id: Uuid,

    /// Fully qualified event type (e.g., "feed.post.created")
    pub event_type: String,

    /// Event payload as JSON
    pub payload: serde_json::Value,

    /// Timestamp when event was created
    pub created_at: DateTime<Utc>,

    /// Timestamp when event was successfully dispatched (None = unpublished)
    pub published_at: Option<DateTime<Utc>>,

    /// Number of failed dispatch attempts
    pub retry_count: i32,

    /// Last error message from a failed dispatch attempt
    pub last_error: Option<String>,
}

impl OutboxEvent {
    /// Build a fresh, unpublished event.
    pub fn new(
        aggregate_type: &str,
        aggregate_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
            published_at: None,
            retry_count: 0,
            last_error: None,
        }
    }
}

/// Repository trait for managing outbox events in the database.
///
/// Abstracts database operations to allow for testing and alternative
/// implementations.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert a new event into the outbox within a transaction.
    ///
    /// MUST be called within the transaction of the triggering business write.
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> OutboxResult<()>;

    /// Get unpublished events ordered by creation time (oldest first).
    async fn get_unpublished(&self, limit: i32) -> OutboxResult<Vec<OutboxEvent>>;

    /// Mark an event as successfully dispatched.
    async fn mark_published(&self, event_id: Uuid) -> OutboxResult<()>;

    /// Mark an event as failed, incrementing its retry count.
    async fn mark_failed(&self, event_id: Uuid, error: &str) -> OutboxResult<()>;

    /// Compute pending count and oldest pending age (seconds). Returns age=0 if none pending.
    async fn pending_stats(&self) -> OutboxResult<(i64, i64)>;
}

/// SQLx-based implementation of OutboxRepository using PostgreSQL.
pub struct SqlxOutboxRepository {
    pool: PgPool,
}

impl SqlxOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Return pending count and oldest pending age (seconds). If no pending, age = 0.
    pub async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        let rec = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS pending,
                COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(created_at)))::BIGINT, 0) AS age_seconds
            FROM outbox_events
            WHERE published_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute pending stats")?;

        let pending: i64 = rec.try_get("pending").unwrap_or(0);
        let age: i64 = rec.try_get("age_seconds").unwrap_or(0);
        Ok((pending, age))
    }

    /// Replay events created since the given timestamp by resetting published_at
    /// and retry counters. Operational backfill tool; consumers must dedupe.
    pub async fn replay_since(&self, ts: DateTime<Utc>) -> OutboxResult<u64> {
        let res = sqlx::query(
            r#"
            UPDATE outbox_events
            SET published_at = NULL,
                retry_count = 0,
                last_error = NULL
            WHERE created_at >= $1
            "#,
        )
        .bind(ts)
        .execute(&self.pool)
        .await
        .context("Failed to replay events since timestamp")?;

        Ok(res.rows_affected())
    }
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> OutboxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (
                id,
                aggregate_type,
                aggregate_id,
                event_type,
                payload,
                created_at,
                published_at,
                retry_count,
                last_error
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .bind(event.published_at)
        .bind(event.retry_count)
        .bind(&event.last_error)
        .execute(&mut **tx)
        .await
        .context("Failed to insert event into outbox")?;

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "Event inserted into outbox"
        );

        Ok(())
    }

    async fn get_unpublished(&self, limit: i32) -> OutboxResult<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                aggregate_type,
                aggregate_id,
                event_type,
                payload,
                created_at,
                published_at,
                retry_count,
                last_error
            FROM outbox_events
            WHERE published_at IS NULL
            ORDER BY created_at ASC, retry_count ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch unpublished events")?;

        let events: Vec<OutboxEvent> = rows
            .into_iter()
            .map(|row| {
                Ok(OutboxEvent {
                    id: row.try_get("id")?,
                    aggregate_type: row.try_get("aggregate_type")?,
                    aggregate_id: row.try_get("aggregate_id")?,
                    event_type: row.try_get("event_type")?,
                    payload: row.try_get("payload")?,
                    created_at: row.try_get("created_at")?,
                    published_at: row.try_get("published_at")?,
                    retry_count: row.try_get("retry_count")?,
                    last_error: row.try_get("last_error")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("Failed to parse events")?;

        debug!(count = events.len(), "Fetched unpublished events");

        Ok(events)
    }

    async fn mark_published(&self, event_id: Uuid) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET published_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark event as published")?;

        if result.rows_affected() == 0 {
            warn!(event_id = %event_id, "Event not found when marking as published");
            return Err(OutboxError::EventNotFound(event_id));
        }

        debug!(event_id = %event_id, "Event marked as published");

        Ok(())
    }

    async fn mark_failed(&self, event_id: Uuid, error: &str) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET
                retry_count = retry_count + 1,
                last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to mark event as failed")?;

        if result.rows_affected() == 0 {
            warn!(event_id = %event_id, "Event not found when marking as failed");
            return Err(OutboxError::EventNotFound(event_id));
        }

        warn!(
            event_id = %event_id,
            error = %error,
            "Event marked as failed"
        );

        Ok(())
    }

    async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        SqlxOutboxRepository::pending_stats(self).await
    }
}

/// Publisher trait for handing events to their consumer.
///
/// Implementations must be idempotent: redelivery after a crash between
/// publish and mark_published is expected.
#[async_trait]
pub trait OutboxPublisher: Send + Sync {
    /// Deliver an event to its consumer.
    async fn publish(&self, event: &OutboxEvent) -> OutboxResult<()>;
}

/// Background processor for dispatching outbox events.
///
/// - Polls the database for unpublished events at regular intervals
/// - Dispatches events through the configured publisher
/// - Retries failed events with exponential backoff
/// - Skips events that exceeded max_retries (manual intervention needed)
///
/// # Processing Guarantees
///
/// - **At-least-once delivery**: events may be dispatched multiple times if
///   crashes occur between publish and mark_published
/// - **Ordering per aggregate**: events for the same aggregate_id are fetched
///   oldest-first
pub struct OutboxProcessor<R: OutboxRepository, P: OutboxPublisher> {
    repository: Arc<R>,
    publisher: Arc<P>,
    batch_size: i32,
    poll_interval: Duration,
    max_retries: i32,
    metrics: Option<crate::metrics::OutboxMetrics>,
}

impl<R: OutboxRepository, P: OutboxPublisher> OutboxProcessor<R, P> {
    pub fn new(
        repository: Arc<R>,
        publisher: Arc<P>,
        batch_size: i32,
        poll_interval: Duration,
        max_retries: i32,
    ) -> Self {
        Self {
            repository,
            publisher,
            batch_size,
            poll_interval,
            max_retries,
            metrics: None,
        }
    }

    /// Create a processor that also updates Prometheus metrics each polling cycle.
    pub fn new_with_metrics(
        repository: Arc<R>,
        publisher: Arc<P>,
        metrics: crate::metrics::OutboxMetrics,
        batch_size: i32,
        poll_interval: Duration,
        max_retries: i32,
    ) -> Self {
        Self {
            repository,
            publisher,
            batch_size,
            poll_interval,
            max_retries,
            metrics: Some(metrics),
        }
    }

    /// Start the processor loop.
    ///
    /// Runs indefinitely, polling for events and dispatching them. Should be
    /// spawned as a background task. All per-event errors are logged and
    /// handled gracefully.
    pub async fn start(&self) -> Result<()> {
        info!(
            batch_size = self.batch_size,
            poll_interval_secs = self.poll_interval.as_secs(),
            max_retries = self.max_retries,
            "Outbox processor starting"
        );

        loop {
            match self.process_batch().await {
                Ok(count) => {
                    if count > 0 {
                        info!(published_count = count, "Dispatched events from outbox");
                    } else {
                        debug!("No events to dispatch");
                    }
                }
                Err(e) => {
                    error!(error = ?e, "Outbox processor error");
                }
            }

            if let Some(metrics) = &self.metrics {
                if let Ok((pending, age)) = self.repository.pending_stats().await {
                    metrics.pending.set(pending);
                    metrics.oldest_pending_age_seconds.set(age);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Process a single batch of events.
    ///
    /// Returns the number of successfully dispatched events.
    async fn process_batch(&self) -> OutboxResult<i32> {
        let events = self.repository.get_unpublished(self.batch_size).await?;
        let mut published_count = 0;

        for event in events {
            // Skip events that exceeded max retries (manual intervention needed)
            if event.retry_count >= self.max_retries {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    retry_count = event.retry_count,
                    max_retries = self.max_retries,
                    last_error = ?event.last_error,
                    "Event exceeded max retries, skipping (requires manual intervention)"
                );
                continue;
            }

            let backoff_delay = self.calculate_backoff(event.retry_count);
            if event.retry_count > 0 && backoff_delay.as_secs() > 0 {
                debug!(
                    event_id = %event.id,
                    retry_count = event.retry_count,
                    backoff_secs = backoff_delay.as_secs(),
                    "Applying exponential backoff"
                );
                tokio::time::sleep(backoff_delay).await;
            }

            match self.publisher.publish(&event).await {
                Ok(_) => {
                    if let Err(e) = self.repository.mark_published(event.id).await {
                        error!(
                            event_id = %event.id,
                            error = ?e,
                            "Failed to mark event as published (event was delivered)"
                        );
                        // The event was delivered but marking failed, so it will
                        // be redelivered next cycle. Consumers dedupe.
                    } else {
                        published_count += 1;
                        if let Some(metrics) = &self.metrics {
                            metrics.published.inc();
                        }
                    }
                }
                Err(e) => {
                    error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        retry_count = event.retry_count,
                        error = ?e,
                        "Failed to dispatch event"
                    );

                    if let Err(mark_err) =
                        self.repository.mark_failed(event.id, &e.to_string()).await
                    {
                        error!(
                            event_id = %event.id,
                            error = ?mark_err,
                            "Failed to mark event as failed"
                        );
                    }
                }
            }
        }

        Ok(published_count)
    }

    /// Calculate exponential backoff delay based on retry count.
    ///
    /// Strategy: 2^retry_count seconds, capped at 5 minutes.
    fn calculate_backoff(&self, retry_count: i32) -> Duration {
        const MAX_BACKOFF_SECS: u64 = 300;

        let backoff_secs = 2u64
            .checked_pow(retry_count.max(0) as u32)
            .unwrap_or(MAX_BACKOFF_SECS)
            .min(MAX_BACKOFF_SECS);
        Duration::from_secs(backoff_secs)
    }
}
