//! Runtimes driving the two modes.
//!
//! Both runtimes follow the same lifecycle:
//! - Take the shutdown coordinator registered by the caller
//! - Acquire their connection resource (pool or broker session)
//! - Run their loop until the coordinator signals stop
//! - Release the resource exactly once, on every exit path

mod consumer_runtime;
mod producer_runtime;

pub use consumer_runtime::{ConsumerLoop, ConsumerRuntime};
pub use producer_runtime::{InsertionCounter, ProducerLoop, ProducerRuntime};
