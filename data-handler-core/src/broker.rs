//! Resilient broker session establishment.
//!
//! Each attempt is bounded by the configured connect timeout. Timeouts and broker
//! errors are retried after the reconnect backoff for as long as the run is not
//! stopped; every failed handle is closed before the next attempt. Any other error
//! is returned to the caller.

use crate::{
    BrokerConnector, BrokerEndpoint, BrokerSession, ConsumerConfig, HandlerError, HandlerMetrics,
    HandlerResult, ShutdownCoordinator,
};
use tracing::{error, info, warn};

/// Outcome of a single attempt
enum Attempt<S> {
    Connected(S),
    Failed(HandlerError),
    Stopped,
}

/// Connect to the broker, retrying until success or stop.
///
/// Returns `Ok(None)` when the stop signal fires before a session is established;
/// the caller must not consume in that case.
pub async fn connect<C: BrokerConnector>(
    connector: &C,
    endpoint: &BrokerEndpoint,
    config: &ConsumerConfig,
    metrics: &HandlerMetrics,
    shutdown: &ShutdownCoordinator,
) -> HandlerResult<Option<C::Session>> {
    let mut attempt: u64 = 0;

    while !shutdown.is_stopped() {
        attempt += 1;
        metrics.record_connect_attempt();
        info!(attempt, servers = %endpoint.bootstrap_servers, "Connecting to broker...");

        match try_connect(connector, endpoint, config, shutdown).await {
            Attempt::Connected(session) => {
                info!(attempt, "Successfully connected to broker");
                return Ok(Some(session));
            }
            Attempt::Stopped => break,
            Attempt::Failed(e) if e.is_retryable_connection() => {
                metrics.record_connect_failure();
                match e {
                    HandlerError::ConnectTimeout(_) => {
                        error!(attempt, "Connection timeout, cleaning up and retrying...")
                    }
                    e => error!(attempt, error = %e, "Can't connect to broker"),
                }
            }
            Attempt::Failed(e) => {
                metrics.record_connect_failure();
                return Err(e);
            }
        }

        let backoff = config.reconnect_backoff.next_delay();
        if !shutdown.sleep(backoff).await {
            break;
        }
    }

    warn!("Shutdown requested before a broker session was established");
    Ok(None)
}

/// One bounded attempt. Any handle that does not end up connected is closed here.
async fn try_connect<C: BrokerConnector>(
    connector: &C,
    endpoint: &BrokerEndpoint,
    config: &ConsumerConfig,
    shutdown: &ShutdownCoordinator,
) -> Attempt<C::Session> {
    let timeout = config.connect_timeout();

    let mut session = tokio::select! {
        biased;
        _ = shutdown.wait_for_stop() => return Attempt::Stopped,
        opened = tokio::time::timeout(timeout, connector.open(endpoint)) => match opened {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Attempt::Failed(e),
            Err(_) => return Attempt::Failed(HandlerError::ConnectTimeout(timeout)),
        },
    };

    let started = tokio::select! {
        biased;
        _ = shutdown.wait_for_stop() => None,
        started = tokio::time::timeout(timeout, session.start()) => Some(started),
    };

    match started {
        Some(Ok(Ok(()))) => Attempt::Connected(session),
        Some(Ok(Err(e))) => {
            session.close().await;
            Attempt::Failed(e)
        }
        Some(Err(_)) => {
            session.close().await;
            Attempt::Failed(HandlerError::ConnectTimeout(timeout))
        }
        None => {
            session.close().await;
            Attempt::Stopped
        }
    }
}
