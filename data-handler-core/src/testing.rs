//! In-memory doubles for the storage and broker seams.

use crate::{
    BrokerConnector, BrokerEndpoint, BrokerSession, ConsumedMessage, HandlerError, HandlerResult,
    NewOrder, NewUser, RecordStore, ShutdownCoordinator, StoreTransaction,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A batch as it became visible after commit
#[derive(Debug, Clone)]
pub(crate) struct CommittedBatch {
    pub user_id: i64,
    pub orders: Vec<(i64, NewOrder)>,
}

#[derive(Default)]
struct StoreState {
    next_id: i64,
    batches: Vec<CommittedBatch>,
    stop_on_insert: Option<ShutdownCoordinator>,
}

#[derive(Default)]
struct StoreInner {
    state: Mutex<StoreState>,
    failing_begins: AtomicUsize,
    failing_user_inserts: AtomicUsize,
    acquired: AtomicBool,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
}

/// Store that only makes rows visible on commit
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `begin` fail with a storage error
    pub fn fail_next_begins(&self, n: usize) {
        self.inner.failing_begins.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` user inserts fail with a storage error
    pub fn fail_next_user_inserts(&self, n: usize) {
        self.inner.failing_user_inserts.store(n, Ordering::SeqCst);
    }

    /// Signal `shutdown` from inside the next user insert
    pub fn stop_on_user_insert(&self, shutdown: ShutdownCoordinator) {
        self.inner.state.lock().unwrap().stop_on_insert = Some(shutdown);
    }

    pub fn mark_acquired(&self) {
        self.inner.acquired.store(true, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> bool {
        self.inner.acquired.load(Ordering::SeqCst)
    }

    pub fn committed_batches(&self) -> Vec<CommittedBatch> {
        self.inner.state.lock().unwrap().batches.clone()
    }

    /// Users plus orders made visible by commits
    pub fn row_count(&self) -> u64 {
        self.committed_batches()
            .iter()
            .map(|b| 1 + b.orders.len() as u64)
            .sum()
    }

    pub fn begins(&self) -> usize {
        self.inner.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn begin(&self) -> HandlerResult<Box<dyn StoreTransaction>> {
        self.inner.begins.fetch_add(1, Ordering::SeqCst);

        let failing =
            self.inner
                .failing_begins
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(HandlerError::storage("pool timed out while waiting for a connection"));
        }

        Ok(Box::new(MemoryTransaction {
            store: Arc::clone(&self.inner),
            user_id: None,
            orders: Vec::new(),
        }))
    }

    async fn close(&self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct MemoryTransaction {
    store: Arc<StoreInner>,
    user_id: Option<i64>,
    orders: Vec<(i64, NewOrder)>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_user(&mut self, _user: &NewUser) -> HandlerResult<i64> {
        let failing = self.store.failing_user_inserts.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| n.checked_sub(1),
        );
        if failing.is_ok() {
            return Err(HandlerError::storage("connection reset by peer"));
        }

        let mut state = self.store.state.lock().unwrap();
        if let Some(shutdown) = state.stop_on_insert.take() {
            shutdown.signal_stop();
        }
        state.next_id += 1;
        self.user_id = Some(state.next_id);
        Ok(state.next_id)
    }

    async fn insert_order(&mut self, user_id: i64, order: &NewOrder) -> HandlerResult<()> {
        if self.user_id != Some(user_id) {
            return Err(HandlerError::storage("foreign key violation on orders.user_id"));
        }
        self.orders.push((user_id, order.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> HandlerResult<()> {
        let this = *self;
        let user_id = this
            .user_id
            .ok_or_else(|| HandlerError::storage("empty transaction"))?;

        this.store.state.lock().unwrap().batches.push(CommittedBatch {
            user_id,
            orders: this.orders,
        });
        this.store.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> HandlerResult<()> {
        self.store.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// How [`BrokerSession::start`] behaves on a scripted session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartOutcome {
    Ok,
    /// Never completes within any connect timeout
    Hang,
    BrokerError,
    ConfigError,
}

/// What the next call to [`BrokerSession::next_message`] yields
#[derive(Debug, Clone)]
pub(crate) enum StreamEvent {
    Message(ConsumedMessage),
    /// Signal the coordinator, then deliver the message
    StopThenMessage(ShutdownCoordinator, ConsumedMessage),
    Error,
    End,
}

#[derive(Default)]
struct ConnectorStats {
    open_calls: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    successful_starts: AtomicUsize,
    delivered: AtomicUsize,
}

/// Connector whose sessions follow a fixed script
pub(crate) struct ScriptedConnector {
    outcomes: Mutex<VecDeque<StartOutcome>>,
    open_failures: AtomicUsize,
    events: Mutex<Vec<StreamEvent>>,
    stats: Arc<ConnectorStats>,
}

impl ScriptedConnector {
    /// One start outcome per opened session; sessions beyond the list start fine
    pub fn new(outcomes: Vec<StartOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            open_failures: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
            stats: Arc::new(ConnectorStats::default()),
        }
    }

    /// Fail the first `n` calls to `open` with a broker error
    pub fn with_open_failures(self, n: usize) -> Self {
        self.open_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Events delivered by every session once started. Once exhausted, a session
    /// waits forever.
    pub fn with_events(self, events: Vec<StreamEvent>) -> Self {
        *self.events.lock().unwrap() = events;
        self
    }

    pub fn open_calls(&self) -> usize {
        self.stats.open_calls.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }

    pub fn successful_starts(&self) -> usize {
        self.stats.successful_starts.load(Ordering::SeqCst)
    }

    /// Messages handed out by `next_message`
    pub fn delivered(&self) -> usize {
        self.stats.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerConnector for ScriptedConnector {
    type Session = ScriptedSession;

    async fn open(&self, _endpoint: &BrokerEndpoint) -> HandlerResult<ScriptedSession> {
        self.stats.open_calls.fetch_add(1, Ordering::SeqCst);

        let failing =
            self.open_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(HandlerError::broker("broker transport failure"));
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let start = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StartOutcome::Ok);

        Ok(ScriptedSession {
            start,
            events: self.events.lock().unwrap().clone().into(),
            stats: Arc::clone(&self.stats),
        })
    }
}

pub(crate) struct ScriptedSession {
    start: StartOutcome,
    events: VecDeque<StreamEvent>,
    stats: Arc<ConnectorStats>,
}

#[async_trait]
impl BrokerSession for ScriptedSession {
    async fn start(&mut self) -> HandlerResult<()> {
        match self.start {
            StartOutcome::Ok => {
                self.stats.successful_starts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            StartOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(HandlerError::broker("start never completed"))
            }
            StartOutcome::BrokerError => Err(HandlerError::broker("no brokers available")),
            StartOutcome::ConfigError => Err(HandlerError::config("unknown group.id")),
        }
    }

    async fn next_message(&mut self) -> Option<HandlerResult<ConsumedMessage>> {
        let event = match self.events.pop_front() {
            Some(event) => event,
            None => std::future::pending().await,
        };

        match event {
            StreamEvent::Message(message) => {
                self.stats.delivered.fetch_add(1, Ordering::SeqCst);
                Some(Ok(message))
            }
            StreamEvent::StopThenMessage(shutdown, message) => {
                shutdown.signal_stop();
                self.stats.delivered.fetch_add(1, Ordering::SeqCst);
                Some(Ok(message))
            }
            StreamEvent::Error => Some(Err(HandlerError::stream("broker transport failure"))),
            StreamEvent::End => None,
        }
    }

    async fn close(self) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A JSON record on `topic`
pub(crate) fn message(topic: &str, offset: i64) -> ConsumedMessage {
    ConsumedMessage::from_raw(
        topic,
        0,
        offset,
        Some(b"key".as_slice()),
        Some(format!(r#"{{"id": {}}}"#, offset).as_bytes()),
    )
}
