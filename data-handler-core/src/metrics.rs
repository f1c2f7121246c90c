//! Runtime metrics recorded through the `metrics` facade.
//!
//! Nothing is exported unless the binary installs a recorder.

use metrics::{counter, gauge};

/// Counters for one producer or consumer run
#[derive(Debug, Clone)]
pub struct HandlerMetrics {
    mode: &'static str,
}

impl HandlerMetrics {
    pub fn new(mode: &'static str) -> Self {
        Self { mode }
    }

    pub fn set_health(&self, healthy: bool) {
        gauge!("data_handler_up", "mode" => self.mode).set(if healthy { 1.0 } else { 0.0 });
    }

    pub fn record_committed_batch(&self, rows: u64) {
        counter!("data_handler_batches_committed_total", "mode" => self.mode).increment(1);
        counter!("data_handler_records_inserted_total", "mode" => self.mode).increment(rows);
    }

    pub fn record_rolled_back_batch(&self) {
        counter!("data_handler_batches_rolled_back_total", "mode" => self.mode).increment(1);
    }

    /// A batch that failed before its transaction was opened
    pub fn record_failed_batch(&self) {
        counter!("data_handler_batches_failed_total", "mode" => self.mode).increment(1);
    }

    pub fn record_connect_attempt(&self) {
        counter!("data_handler_connect_attempts_total", "mode" => self.mode).increment(1);
    }

    pub fn record_connect_failure(&self) {
        counter!("data_handler_connect_failures_total", "mode" => self.mode).increment(1);
    }

    pub fn record_rendered(&self) {
        counter!("data_handler_messages_rendered_total", "mode" => self.mode).increment(1);
    }
}
