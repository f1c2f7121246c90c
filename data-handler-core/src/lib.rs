//! # Data Handler Core
//!
//! Connection lifecycle and cancellation-aware loops for a two-mode streaming data
//! harness.
//!
//! ## Overview
//!
//! - **Produce**: generate synthetic users with one or two orders each and write every
//!   user together with its orders in a single Postgres transaction
//! - **Consume**: subscribe to a fixed set of Kafka topics and render every record to
//!   the console
//!
//! Both modes share one [`ShutdownCoordinator`]. SIGINT and SIGTERM set it, every loop
//! observes it between operations, and every connection resource is released exactly
//! once when a run ends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use data_handler_core::{PgRecordStore, PoolConfig, ProducerConfig, ProducerRuntime, ShutdownCoordinator};
//!
//! # async fn run() -> data_handler_core::HandlerResult<()> {
//! let shutdown = ShutdownCoordinator::new();
//! shutdown.install_signal_handlers();
//!
//! let pool = PoolConfig::default();
//! let acquire = PgRecordStore::connect("postgres://postgres@localhost/data", &pool);
//! let total = ProducerRuntime::new(ProducerConfig::default())
//!     .run(acquire, &shutdown)
//!     .await?;
//! println!("inserted {:?} rows", total);
//! # Ok(())
//! # }
//! ```

mod broker;
mod config;
mod error;
mod generator;
mod message;
mod metrics;
mod retry;
mod runtime;
mod shutdown;
mod traits;

pub mod kafka;
pub mod postgres;

#[cfg(test)]
mod testing;

// Re-export public API
pub use broker::connect;
pub use config::{BrokerEndpoint, ConsumerConfig, PoolConfig, ProducerConfig};
pub use error::{HandlerError, HandlerResult};
pub use generator::{NewOrder, NewUser, RecordGenerator, UserBatch};
pub use kafka::{KafkaConnector, KafkaSession};
pub use message::{ConsoleRenderer, ConsumedMessage};
pub use crate::metrics::HandlerMetrics;
pub use postgres::PgRecordStore;
pub use retry::BackoffStrategy;
pub use runtime::{ConsumerLoop, ConsumerRuntime, InsertionCounter, ProducerLoop, ProducerRuntime};
pub use shutdown::ShutdownCoordinator;
pub use traits::{BrokerConnector, BrokerSession, MessageRenderer, RecordStore, StoreTransaction};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
