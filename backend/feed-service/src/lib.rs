//! Following-feed service.
//!
//! Maintains a materialized per-user feed of posts from followed authors.
//! Writes (posts, follows, likes) commit alongside outbox events; a
//! background worker drains those events and applies fan-out, backfill and
//! purge to the feed table. Reads serve newest-first pages annotated with
//! the caller's like status.

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod repository;
pub mod services;
pub mod workers;

pub use config::Config;
pub use error::{AppError, Result};
