//! Seams between the runtimes and the external systems they drive.
//!
//! The runtimes only talk to storage and to the broker through these traits. The
//! Postgres and Kafka implementations live in [`crate::postgres`] and
//! [`crate::kafka`]; tests plug in in-memory doubles.

use crate::{BrokerEndpoint, ConsumedMessage, HandlerResult, NewOrder, NewUser};
use async_trait::async_trait;

/// A pooled relational store that hands out transactions
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Acquire a pooled connection and open a transaction on it
    async fn begin(&self) -> HandlerResult<Box<dyn StoreTransaction>>;

    /// Close the pool. Called exactly once, when the producer run ends.
    async fn close(&self);
}

/// An open transaction holding one pooled connection.
///
/// Dropping a transaction without calling [`StoreTransaction::commit`] must discard
/// every statement executed through it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Insert a user and return its store-generated id
    async fn insert_user(&mut self, user: &NewUser) -> HandlerResult<i64>;

    /// Insert an order referencing `user_id`
    async fn insert_order(&mut self, user_id: i64, order: &NewOrder) -> HandlerResult<()>;

    /// Commit and release the connection
    async fn commit(self: Box<Self>) -> HandlerResult<()>;

    /// Roll back and release the connection
    async fn rollback(self: Box<Self>) -> HandlerResult<()>;
}

/// Creates broker sessions
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    type Session: BrokerSession;

    /// Create a session handle for `endpoint`.
    ///
    /// The handle is not usable until [`BrokerSession::start`] succeeds.
    async fn open(&self, endpoint: &BrokerEndpoint) -> HandlerResult<Self::Session>;
}

#[async_trait]
impl<T: BrokerConnector + ?Sized> BrokerConnector for &T {
    type Session = T::Session;

    async fn open(&self, endpoint: &BrokerEndpoint) -> HandlerResult<Self::Session> {
        (**self).open(endpoint).await
    }
}

/// A consumer session on a fixed topic set
#[async_trait]
pub trait BrokerSession: Send {
    /// Join the consumer group and reach the broker
    async fn start(&mut self) -> HandlerResult<()>;

    /// Next record of the subscription.
    ///
    /// The sequence is lazy and unbounded; `None` means the session can produce no
    /// more records.
    async fn next_message(&mut self) -> Option<HandlerResult<ConsumedMessage>>;

    /// Release the session and everything it holds
    async fn close(self);
}

/// Presents consumed messages
pub trait MessageRenderer: Send {
    fn render(&mut self, message: &ConsumedMessage) -> HandlerResult<()>;
}
