//! Kafka-backed [`BrokerConnector`] built on `rdkafka`.
//!
//! Opening a session only builds the client handle. [`BrokerSession::start`]
//! subscribes and waits for the cluster metadata, which is the point where an
//! unreachable broker surfaces as a retryable [`HandlerError::BrokerConnect`].

use crate::{
    BrokerConnector, BrokerEndpoint, BrokerSession, ConsumedMessage, ConsumerConfig, HandlerError,
    HandlerResult,
};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Builds Kafka consumer sessions
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    config: ConsumerConfig,
}

impl KafkaConnector {
    pub fn new(config: ConsumerConfig) -> Self {
        Self { config }
    }

    /// Client properties for `endpoint`
    pub fn client_config(&self, endpoint: &BrokerEndpoint) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &endpoint.bootstrap_servers)
            .set("group.id", &endpoint.consumer_group_id)
            .set("auto.offset.reset", &self.config.auto_offset_reset)
            .set(
                "session.timeout.ms",
                self.config.session_timeout_ms.to_string(),
            )
            .set(
                "heartbeat.interval.ms",
                self.config.heartbeat_interval_ms.to_string(),
            )
            .set(
                "max.poll.interval.ms",
                self.config.max_poll_interval_ms.to_string(),
            )
            .set(
                "socket.timeout.ms",
                self.config.socket_timeout_ms.to_string(),
            )
            .set("enable.partition.eof", "false");
        client
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    type Session = KafkaSession;

    async fn open(&self, endpoint: &BrokerEndpoint) -> HandlerResult<KafkaSession> {
        let consumer: StreamConsumer = self
            .client_config(endpoint)
            .create()
            .map_err(|e| match e {
                KafkaError::ClientConfig(..) => {
                    HandlerError::config(format!("Invalid Kafka client configuration: {}", e))
                }
                other => HandlerError::broker_with_source("Failed to create Kafka consumer", other),
            })?;

        Ok(KafkaSession {
            consumer: Arc::new(consumer),
            topics: endpoint.topic_names.clone(),
            metadata_timeout: metadata_timeout(self.config.connect_timeout()),
            started: false,
        })
    }
}

/// Bound of the blocking metadata fetch.
///
/// Kept below the connect timeout so the fetch gives up, and releases its handle to
/// the consumer, before the connect attempt times out.
fn metadata_timeout(connect_timeout: Duration) -> Duration {
    connect_timeout.saturating_sub(connect_timeout / 10)
}

/// A subscribed Kafka consumer
pub struct KafkaSession {
    consumer: Arc<StreamConsumer>,
    topics: Vec<String>,
    metadata_timeout: Duration,
    started: bool,
}

#[async_trait]
impl BrokerSession for KafkaSession {
    async fn start(&mut self) -> HandlerResult<()> {
        let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();
        self.consumer
            .subscribe(&topics)
            .map_err(|e| HandlerError::broker_with_source("Failed to subscribe to topics", e))?;

        // metadata fetch blocks on the network
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.metadata_timeout;
        tokio::task::spawn_blocking(move || consumer.fetch_metadata(None, timeout).map(|_| ()))
            .await
            .map_err(|e| HandlerError::fatal_with_source("Metadata fetch task failed", e))?
            .map_err(|e| HandlerError::broker_with_source("Can't connect to broker", e))?;

        self.started = true;
        Ok(())
    }

    async fn next_message(&mut self) -> Option<HandlerResult<ConsumedMessage>> {
        let received = match self.consumer.recv().await {
            Ok(message) => Ok(ConsumedMessage::from_raw(
                message.topic(),
                message.partition(),
                message.offset(),
                message.key(),
                message.payload(),
            )),
            Err(e) => Err(HandlerError::stream_with_source(
                "Failed to receive message",
                e,
            )),
        };
        Some(received)
    }

    async fn close(self) {
        self.consumer.unsubscribe();
        drop(self.consumer);

        if self.started {
            info!("Kafka consumer stopped successfully");
        } else {
            debug!("Discarded unstarted Kafka consumer");
        }
    }
}
