//! Data Handler
//!
//! Runs in one of two modes until SIGINT or SIGTERM:
//! - `produce`: writes synthetic users and orders to Postgres
//! - `consume`: prints records from a set of Kafka topics

mod config;

use crate::config::Settings;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use data_handler_core::{
    ConsoleRenderer, ConsumerRuntime, KafkaConnector, PgRecordStore, ProducerRuntime,
    ShutdownCoordinator,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "data-handler", version, about)]
struct Cli {
    /// Which side of the pipeline to run
    #[arg(value_enum)]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Insert synthetic users and orders into Postgres
    Produce,
    /// Render messages from the configured Kafka topics
    Consume,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load configuration")?;

    init_tracing(&settings.log_level);

    tracing::info!("Starting data handler in {:?} mode", cli.mode);
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let shutdown = ShutdownCoordinator::new();
    let _signals = shutdown.install_signal_handlers();

    let result = match cli.mode {
        Mode::Produce => produce(&settings, &shutdown).await,
        Mode::Consume => consume(&settings, &shutdown).await,
    };

    if let Err(e) = &result {
        tracing::error!("Data handler failed: {:#}", e);
    }
    result
}

async fn produce(settings: &Settings, shutdown: &ShutdownCoordinator) -> anyhow::Result<()> {
    let (postgres, producer) = settings.producer_settings()?;

    let total = ProducerRuntime::new(producer.clone())
        .run(PgRecordStore::connect(&postgres.dsn, &postgres.pool), shutdown)
        .await?;

    if total.is_none() {
        tracing::info!("Stopped before the database was connected");
    }
    Ok(())
}

async fn consume(settings: &Settings, shutdown: &ShutdownCoordinator) -> anyhow::Result<()> {
    let (endpoint, consumer) = settings.consumer_settings()?;

    let runtime = ConsumerRuntime::new(
        KafkaConnector::new(consumer.clone()),
        endpoint.clone(),
        consumer.clone(),
        ConsoleRenderer::stdout(),
    );
    runtime.run(shutdown).await?;

    tracing::info!("Data handler stopped");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(default_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
