/// Configuration management for the feed service
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Feed maintenance tuning
    pub feed: FeedConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port
    pub http_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Tuning knobs for feed fan-out and backfill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// How many of a followee's most recent posts to copy into a new
    /// follower's feed
    #[serde(default = "default_backfill_limit")]
    pub backfill_limit: i64,
    /// Max in-flight per-follower inserts during post fan-out
    #[serde(default = "default_fanout_concurrency")]
    pub fanout_concurrency: usize,
    /// Per-follower insert timeout during fan-out, seconds
    #[serde(default = "default_fanout_timeout_secs")]
    pub fanout_timeout_secs: u64,
}

// Default values
fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_backfill_limit() -> i64 {
    5
}

fn default_fanout_concurrency() -> usize {
    16
}

fn default_fanout_timeout_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8004), // feed-service default HTTP port
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_max_connections),
            min_connections: std::env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_min_connections),
        };

        let feed = FeedConfig {
            backfill_limit: std::env::var("FEED_BACKFILL_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_backfill_limit),
            fanout_concurrency: std::env::var("FEED_FANOUT_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_fanout_concurrency),
            fanout_timeout_secs: std::env::var("FEED_FANOUT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_fanout_timeout_secs),
        };

        Ok(Config {
            app,
            database,
            feed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_default_values() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::remove_var("PORT");
        std::env::remove_var("FEED_BACKFILL_LIMIT");
        std::env::remove_var("FEED_FANOUT_CONCURRENCY");

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.host, "0.0.0.0");
        assert_eq!(config.app.http_port, 8004);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.database.min_connections, 5);
        assert_eq!(config.feed.backfill_limit, 5);
        assert_eq!(config.feed.fanout_concurrency, 16);
        assert_eq!(config.feed.fanout_timeout_secs, 5);

        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial_test::serial]
    fn test_missing_database_url_is_an_error() {
        std::env::remove_var("DATABASE_URL");

        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_feed_overrides() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("FEED_BACKFILL_LIMIT", "10");
        std::env::set_var("FEED_FANOUT_CONCURRENCY", "4");

        let config = Config::from_env().unwrap();
        assert_eq!(config.feed.backfill_limit, 10);
        assert_eq!(config.feed.fanout_concurrency, 4);

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("FEED_BACKFILL_LIMIT");
        std::env::remove_var("FEED_FANOUT_CONCURRENCY");
    }
}
