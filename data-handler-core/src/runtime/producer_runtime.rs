//! Producer runtime: synthetic batches written transactionally until shutdown.
//!
//! Generation runs in a background task owned by [`ProducerLoop::run`], which joins
//! it before returning. The task checks the stop signal between statements, so a
//! transaction open when the stop arrives is always resolved (committed when all of
//! its statements already ran, rolled back otherwise) before the join completes.

use crate::{
    HandlerError, HandlerMetrics, HandlerResult, ProducerConfig, RecordGenerator, RecordStore,
    ShutdownCoordinator, StoreTransaction, UserBatch,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

/// Running total of rows inserted by committed batches
#[derive(Debug, Clone)]
pub struct InsertionCounter {
    total: u64,
    log_every: u64,
}

impl InsertionCounter {
    pub fn new(log_every: u64) -> Self {
        Self {
            total: 0,
            log_every: log_every.max(1),
        }
    }

    /// Add the rows of one committed batch, logging whenever a multiple of
    /// `log_every` is reached or crossed
    pub fn add(&mut self, rows: u64) {
        let before = self.total;
        self.total += rows;
        if self.total / self.log_every > before / self.log_every {
            info!(total = self.total, "Inserted: {}", self.total);
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// What happened to one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchOutcome {
    Committed(u64),
    /// Stop arrived mid-batch; the transaction was rolled back
    Interrupted,
}

/// Why a batch was not committed
#[derive(Debug)]
enum BatchFailure {
    /// No transaction could be opened; nothing was written
    NotStarted(HandlerError),
    /// A statement or the commit failed; the transaction was rolled back
    RolledBack(HandlerError),
}

/// Generation + transactional insertion until stop
pub struct ProducerLoop<S: RecordStore> {
    store: Arc<S>,
    config: ProducerConfig,
    generator: RecordGenerator,
    metrics: HandlerMetrics,
}

impl<S: RecordStore> ProducerLoop<S> {
    pub fn new(store: Arc<S>, config: ProducerConfig) -> Self {
        Self {
            store,
            config,
            generator: RecordGenerator::from_os_rng(),
            metrics: HandlerMetrics::new("produce"),
        }
    }

    /// Replace the random source of generated batches
    pub fn with_generator(mut self, generator: RecordGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Run until `shutdown` fires and return the number of rows inserted.
    ///
    /// Storage errors never end the loop; only an unexpected error or a failure of
    /// the background task is returned as `Err`.
    pub async fn run(self, shutdown: &ShutdownCoordinator) -> HandlerResult<u64> {
        let worker_stop = shutdown.child();
        let worker = BatchWriter {
            store: self.store,
            config: self.config,
            metrics: self.metrics,
            stop: worker_stop.clone(),
        };

        let mut task = AbortOnDropHandle::new(tokio::spawn(worker.produce(self.generator)));

        let joined = tokio::select! {
            _ = shutdown.wait_for_stop() => {
                worker_stop.signal_stop();
                (&mut task).await
            }
            joined = &mut task => joined,
        };

        match joined {
            Ok(result) => result,
            Err(e) => Err(HandlerError::fatal_with_source(
                "Producer task terminated abnormally",
                e,
            )),
        }
    }
}

/// State moved into the background task
struct BatchWriter<S: RecordStore> {
    store: Arc<S>,
    config: ProducerConfig,
    metrics: HandlerMetrics,
    stop: ShutdownCoordinator,
}

impl<S: RecordStore> BatchWriter<S> {
    async fn produce(self, mut generator: RecordGenerator) -> HandlerResult<u64> {
        let mut counter = InsertionCounter::new(self.config.progress_log_every);

        while !self.stop.is_stopped() {
            let batch = generator.next_batch();

            let delay = match self.write_batch(&batch).await {
                Ok(BatchOutcome::Committed(rows)) => {
                    counter.add(rows);
                    self.metrics.record_committed_batch(rows);
                    self.config.batch_spacing.next_delay()
                }
                Ok(BatchOutcome::Interrupted) => {
                    self.metrics.record_rolled_back_batch();
                    debug!("Batch rolled back on shutdown");
                    break;
                }
                Err(BatchFailure::NotStarted(e)) if e.is_retryable_storage() => {
                    self.metrics.record_failed_batch();
                    error!(error = %e, "Database error, batch not started");
                    self.config.error_backoff.next_delay()
                }
                Err(BatchFailure::RolledBack(e)) if e.is_retryable_storage() => {
                    self.metrics.record_rolled_back_batch();
                    error!(error = %e, "Database error, batch rolled back");
                    self.config.error_backoff.next_delay()
                }
                Err(BatchFailure::NotStarted(e) | BatchFailure::RolledBack(e)) => return Err(e),
            };

            if !self.stop.sleep(delay).await {
                break;
            }
        }

        Ok(counter.total())
    }

    /// Write one batch in its own transaction
    async fn write_batch(&self, batch: &UserBatch) -> Result<BatchOutcome, BatchFailure> {
        let mut tx = self.store.begin().await.map_err(BatchFailure::NotStarted)?;

        let inserted = self.insert_batch(tx.as_mut(), batch).await;
        match inserted {
            // a failed commit leaves nothing behind
            Ok(true) => tx
                .commit()
                .await
                .map(|_| BatchOutcome::Committed(batch.row_count()))
                .map_err(BatchFailure::RolledBack),
            Ok(false) => tx
                .rollback()
                .await
                .map(|_| BatchOutcome::Interrupted)
                .map_err(BatchFailure::RolledBack),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(BatchFailure::RolledBack(e))
            }
        }
    }

    /// Returns `false` if stop was observed before every statement ran
    async fn insert_batch(
        &self,
        tx: &mut dyn StoreTransaction,
        batch: &UserBatch,
    ) -> HandlerResult<bool> {
        let user_id = tx.insert_user(&batch.user).await?;

        for order in &batch.orders {
            if self.stop.is_stopped() {
                return Ok(false);
            }
            tx.insert_order(user_id, order).await?;
        }

        Ok(true)
    }
}

/// Full producer lifecycle: acquire the store, run the loop, close the store
pub struct ProducerRuntime {
    config: ProducerConfig,
    generator: Option<RecordGenerator>,
}

impl ProducerRuntime {
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            config,
            generator: None,
        }
    }

    pub fn with_generator(mut self, generator: RecordGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Acquire the store with `acquire`, produce until stop, then close the store.
    ///
    /// `acquire` runs once; its error is returned as-is without retry. Returns
    /// `Ok(None)` if stop fires before the store is acquired, otherwise the total
    /// number of rows inserted.
    pub async fn run<S, F>(
        self,
        acquire: F,
        shutdown: &ShutdownCoordinator,
    ) -> HandlerResult<Option<u64>>
    where
        S: RecordStore,
        F: Future<Output = HandlerResult<S>>,
    {
        self.config.validate()?;

        if shutdown.is_stopped() {
            info!("Shutdown requested before the database was connected");
            return Ok(None);
        }

        let store = tokio::select! {
            biased;
            _ = shutdown.wait_for_stop() => {
                info!("Shutdown requested before the database was connected");
                return Ok(None);
            }
            acquired = acquire => acquired.inspect_err(|e| {
                error!(error = %e, "Failed to connect to the database");
            })?,
        };

        let store = Arc::new(store);
        let metrics = HandlerMetrics::new("produce");
        metrics.set_health(true);

        let mut producer = ProducerLoop::new(Arc::clone(&store), self.config);
        if let Some(generator) = self.generator {
            producer = producer.with_generator(generator);
        }
        let result = producer.run(shutdown).await;

        store.close().await;
        metrics.set_health(false);

        match &result {
            Ok(total) => info!(total, "Total records inserted in this run: {}", total),
            Err(e) => error!(error = %e, "Producer stopped with an error"),
        }

        result.map(Some)
    }
}
