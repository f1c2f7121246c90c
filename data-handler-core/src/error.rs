//! Error types for the data handler.
//!
//! Errors are grouped by how the runtimes react to them:
//!
//! - **Retryable connection**: `BrokerConnect`, `ConnectTimeout` (retried with a fixed backoff)
//! - **Retryable storage**: `Storage` (batch rolled back, loop backs off and continues)
//! - **Fatal storage**: `PoolUnavailable` (the producer run aborts)
//! - **Terminal stream**: `Stream` (the consumer loop exits and closes its session)
//! - **Everything else**: `Config`, `Fatal` (propagated to the caller)

use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type used throughout the crate
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Error type for producer and consumer operations
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A statement or transaction failed while writing one batch
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The connection pool could not be created
    #[error("Database unavailable: {message}")]
    PoolUnavailable {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The broker rejected or failed a connection attempt
    #[error("Broker connection error: {message}")]
    BrokerConnect {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A connection attempt did not complete in time
    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Iterating an established broker session failed
    #[error("Stream error: {message}")]
    Stream {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Unexpected failure that must not be retried
    #[error("Fatal error: {message}")]
    Fatal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl HandlerError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a retryable storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a retryable storage error with a source
    pub fn storage_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a fatal pool error
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::PoolUnavailable {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a fatal pool error with a source
    pub fn pool_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::PoolUnavailable {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a retryable broker connection error
    pub fn broker(msg: impl Into<String>) -> Self {
        Self::BrokerConnect {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a retryable broker connection error with a source
    pub fn broker_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::BrokerConnect {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a terminal stream error with a source
    pub fn stream_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Stream {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a terminal stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a fatal error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a fatal error with a source
    pub fn fatal_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Fatal {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Connection failures that the broker connect loop retries
    pub fn is_retryable_connection(&self) -> bool {
        matches!(self, Self::BrokerConnect { .. } | Self::ConnectTimeout(_))
    }

    /// Batch failures that the producer loop rolls back and retries
    pub fn is_retryable_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

impl From<sqlx::Error> for HandlerError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage_with_source("database operation failed", err)
    }
}
