//! Consumer runtime: connect to the broker, render messages until shutdown.

use crate::broker::connect;
use crate::{
    BrokerConnector, BrokerEndpoint, BrokerSession, ConsumerConfig, HandlerMetrics,
    HandlerResult, MessageRenderer, ShutdownCoordinator,
};
use std::time::Duration;
use tracing::{error, info};

/// Renders messages from an established session until stop or a terminal error
pub struct ConsumerLoop<R: MessageRenderer> {
    renderer: R,
    throttle: Duration,
    metrics: HandlerMetrics,
}

impl<R: MessageRenderer> ConsumerLoop<R> {
    pub fn new(renderer: R, throttle: Duration) -> Self {
        Self {
            renderer,
            throttle,
            metrics: HandlerMetrics::new("consume"),
        }
    }

    /// Consume `session` and return the number of rendered messages.
    ///
    /// Stream and render errors are logged and end the loop. The session is closed
    /// before returning in every case.
    pub async fn run<S: BrokerSession>(
        &mut self,
        mut session: S,
        shutdown: &ShutdownCoordinator,
    ) -> u64 {
        let mut rendered: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.wait_for_stop() => break,
                next = session.next_message() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    error!(error = %e, "Error consuming messages");
                    break;
                }
                None => {
                    info!("Broker stream ended");
                    break;
                }
            };

            // a message received after stop is dropped unrendered
            if shutdown.is_stopped() {
                break;
            }

            if let Err(e) = self.renderer.render(&message) {
                error!(error = %e, "Failed to render message");
                break;
            }
            rendered += 1;
            self.metrics.record_rendered();

            if !shutdown.sleep(self.throttle).await {
                break;
            }
        }

        session.close().await;
        rendered
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }
}

/// Full consumer lifecycle: connect with retries, consume, close
pub struct ConsumerRuntime<C: BrokerConnector, R: MessageRenderer> {
    connector: C,
    endpoint: BrokerEndpoint,
    config: ConsumerConfig,
    renderer: R,
}

impl<C: BrokerConnector, R: MessageRenderer> ConsumerRuntime<C, R> {
    pub fn new(connector: C, endpoint: BrokerEndpoint, config: ConsumerConfig, renderer: R) -> Self {
        Self {
            connector,
            endpoint,
            config,
            renderer,
        }
    }

    /// Run until stop, returning the number of rendered messages.
    ///
    /// Connection failures are retried; only non-retryable errors are returned.
    pub async fn run(self, shutdown: &ShutdownCoordinator) -> HandlerResult<u64> {
        self.endpoint.validate()?;
        self.config.validate()?;

        let metrics = HandlerMetrics::new("consume");
        let Some(session) = connect(
            &self.connector,
            &self.endpoint,
            &self.config,
            &metrics,
            shutdown,
        )
        .await?
        else {
            return Ok(0);
        };

        metrics.set_health(true);
        info!(
            topics = %self.endpoint.topics_display(),
            "Listening to topics: {}",
            self.endpoint.topics_display()
        );

        let mut consumer = ConsumerLoop::new(self.renderer, self.config.throttle());
        let rendered = consumer.run(session, shutdown).await;

        metrics.set_health(false);
        info!(rendered, "Consumer stopped");
        Ok(rendered)
    }
}
