//! Typed configuration consumed by the runtimes.
//!
//! Loading these values (files, environment) is the binary's job; the core only
//! defines their shape, defaults and validation.

use crate::{BackoffStrategy, HandlerError, HandlerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where and what the consumer subscribes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerEndpoint {
    /// Comma-separated bootstrap broker addresses
    pub bootstrap_servers: String,

    /// Topics to subscribe to
    pub topic_names: Vec<String>,

    /// Consumer group identifier
    #[serde(default = "default_group_id")]
    pub consumer_group_id: String,
}

fn default_group_id() -> String {
    "data-reader".to_string()
}

impl BrokerEndpoint {
    /// Validate the endpoint
    pub fn validate(&self) -> HandlerResult<()> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(HandlerError::config("bootstrap_servers cannot be empty"));
        }

        if self.topic_names.is_empty() {
            return Err(HandlerError::config(
                "topic_names must contain at least one topic",
            ));
        }

        if self.topic_names.iter().any(|t| t.trim().is_empty()) {
            return Err(HandlerError::config("topic names cannot be empty"));
        }

        if self.consumer_group_id.trim().is_empty() {
            return Err(HandlerError::config("consumer_group_id cannot be empty"));
        }

        Ok(())
    }

    /// Topic names joined for display
    pub fn topics_display(&self) -> String {
        self.topic_names.join(", ")
    }
}

/// Sizing of the relational store connection pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Connections kept open at all times
    #[serde(default = "default_pool_size")]
    pub min_size: u32,

    /// Upper bound on open connections
    #[serde(default = "default_pool_size")]
    pub max_size: u32,

    /// Seconds an idle connection may live before it is closed
    #[serde(default = "default_max_idle_secs")]
    pub max_inactive_connection_lifetime: u64,

    /// Seconds to wait for the first connection or for a pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_pool_size() -> u32 {
    1
}

fn default_max_idle_secs() -> u64 {
    300
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

impl PoolConfig {
    /// Idle lifetime as a duration
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_inactive_connection_lifetime)
    }

    /// Bound on a single connection attempt and on waiting for a pooled connection
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Validate the pool sizing
    pub fn validate(&self) -> HandlerResult<()> {
        if self.acquire_timeout_secs == 0 {
            return Err(HandlerError::config("pool acquire_timeout_secs must be > 0"));
        }

        if self.max_size == 0 {
            return Err(HandlerError::config("pool max_size must be > 0"));
        }

        if self.min_size > self.max_size {
            return Err(HandlerError::config(format!(
                "pool min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: default_pool_size(),
            max_size: default_pool_size(),
            max_inactive_connection_lifetime: default_max_idle_secs(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

/// Pacing of the producer loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Delay between two committed batches
    #[serde(default = "default_batch_spacing")]
    pub batch_spacing: BackoffStrategy,

    /// Delay after a batch failed with a storage error
    #[serde(default = "default_error_backoff")]
    pub error_backoff: BackoffStrategy,

    /// Log progress every time the inserted total crosses a multiple of this value
    #[serde(default = "default_progress_log_every")]
    pub progress_log_every: u64,
}

fn default_batch_spacing() -> BackoffStrategy {
    BackoffStrategy::jittered(Duration::from_millis(150), Duration::from_millis(350))
}

fn default_error_backoff() -> BackoffStrategy {
    BackoffStrategy::jittered(Duration::from_secs(1), Duration::from_secs(3))
}

fn default_progress_log_every() -> u64 {
    15
}

impl ProducerConfig {
    /// Validate the producer pacing
    pub fn validate(&self) -> HandlerResult<()> {
        self.batch_spacing.validate()?;
        self.error_backoff.validate()?;

        if self.progress_log_every == 0 {
            return Err(HandlerError::config("progress_log_every must be > 0"));
        }

        Ok(())
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            batch_spacing: default_batch_spacing(),
            error_backoff: default_error_backoff(),
            progress_log_every: default_progress_log_every(),
        }
    }
}

/// Connection and pacing settings of the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Upper bound on a single connection attempt, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Delay between two connection attempts
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff: BackoffStrategy,

    /// Pause after rendering each message, in milliseconds
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Where to start when the group has no committed offset
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,

    /// Group session timeout, in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Group heartbeat interval, in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Maximum time between two polls before the member leaves the group, in milliseconds
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,

    /// Timeout of a single network request to the broker, in milliseconds
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_reconnect_backoff() -> BackoffStrategy {
    BackoffStrategy::fixed(Duration::from_secs(2))
}

fn default_throttle_ms() -> u64 {
    200
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

fn default_max_poll_interval_ms() -> u64 {
    300_000
}

fn default_socket_timeout_ms() -> u64 {
    40_000
}

impl ConsumerConfig {
    /// Connection attempt timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-message throttle as a duration
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Validate the consumer settings
    pub fn validate(&self) -> HandlerResult<()> {
        if self.connect_timeout_secs == 0 {
            return Err(HandlerError::config("connect_timeout_secs must be > 0"));
        }

        self.reconnect_backoff.validate()?;

        match self.auto_offset_reset.as_str() {
            "earliest" | "latest" => {}
            other => {
                return Err(HandlerError::config(format!(
                    "invalid auto_offset_reset '{}': must be 'earliest' or 'latest'",
                    other
                )));
            }
        }

        if self.heartbeat_interval_ms >= self.session_timeout_ms {
            return Err(HandlerError::config(
                "heartbeat_interval_ms must be lower than session_timeout_ms",
            ));
        }

        Ok(())
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_backoff: default_reconnect_backoff(),
            throttle_ms: default_throttle_ms(),
            auto_offset_reset: default_auto_offset_reset(),
            session_timeout_ms: default_session_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            socket_timeout_ms: default_socket_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> BrokerEndpoint {
        BrokerEndpoint {
            bootstrap_servers: "localhost:9092".to_string(),
            topic_names: vec!["users".to_string(), "orders".to_string()],
            consumer_group_id: default_group_id(),
        }
    }

    #[test]
    fn test_defaults() {
        let pool = PoolConfig::default();
        assert_eq!(pool.min_size, 1);
        assert_eq!(pool.max_size, 1);
        assert_eq!(pool.max_idle(), Duration::from_secs(300));
        assert_eq!(pool.acquire_timeout(), Duration::from_secs(5));

        let consumer = ConsumerConfig::default();
        assert_eq!(consumer.connect_timeout(), Duration::from_secs(10));
        assert_eq!(consumer.throttle(), Duration::from_millis(200));
        assert_eq!(
            consumer.reconnect_backoff,
            BackoffStrategy::fixed(Duration::from_secs(2))
        );

        assert_eq!(ProducerConfig::default().progress_log_every, 15);
    }

    #[test]
    fn test_endpoint_validation() {
        let mut endpoint = endpoint();
        assert!(endpoint.validate().is_ok());
        assert_eq!(endpoint.topics_display(), "users, orders");

        endpoint.topic_names.clear();
        assert!(endpoint.validate().is_err());

        endpoint.topic_names = vec!["  ".to_string()];
        assert!(endpoint.validate().is_err());

        let mut endpoint = self::endpoint();
        endpoint.bootstrap_servers = " ".to_string();
        assert!(endpoint.validate().is_err());
    }

    #[test]
    fn test_endpoint_default_group() {
        let endpoint: BrokerEndpoint = serde_json::from_str(
            r#"{"bootstrap_servers":"kafka:9092","topic_names":["a"]}"#,
        )
        .unwrap();
        assert_eq!(endpoint.consumer_group_id, "data-reader");
    }

    #[test]
    fn test_pool_validation() {
        let mut pool = PoolConfig::default();
        assert!(pool.validate().is_ok());

        pool.min_size = 5;
        assert!(pool.validate().is_err());

        pool.max_size = 0;
        pool.min_size = 0;
        assert!(pool.validate().is_err());

        let pool = PoolConfig {
            acquire_timeout_secs: 0,
            ..PoolConfig::default()
        };
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_consumer_validation() {
        let mut consumer = ConsumerConfig::default();
        assert!(consumer.validate().is_ok());

        consumer.auto_offset_reset = "middle".to_string();
        assert!(consumer.validate().is_err());

        let mut consumer = ConsumerConfig::default();
        consumer.heartbeat_interval_ms = consumer.session_timeout_ms;
        assert!(consumer.validate().is_err());
    }

    #[test]
    fn test_producer_validation() {
        let mut producer = ProducerConfig::default();
        assert!(producer.validate().is_ok());

        producer.progress_log_every = 0;
        assert!(producer.validate().is_err());
    }
}
