//! Settings loading for the data handler binary.
//!
//! Sources, lowest priority first:
//! - the TOML file named by `CONFIG_FILE`, if set
//! - environment variables prefixed with `DATA_APP_` (a `.env` file is loaded into
//!   the environment first)
//!
//! Nested keys use a double underscore (`DATA_APP_POSTGRES__DSN`) and
//! `DATA_APP_BROKER__TOPIC_NAMES` is a comma-separated list.

use data_handler_core::{BrokerEndpoint, ConsumerConfig, PoolConfig, ProducerConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the settings file
const CONFIG_FILE_VAR: &str = "CONFIG_FILE";

const ENV_PREFIX: &str = "DATA_APP";
const ENV_PREFIX_SEPARATOR: &str = "_";
const ENV_SEPARATOR: &str = "__";
const LIST_SEPARATOR: &str = ",";

/// Keys parsed as lists when read from the environment
const LIST_PARSE_KEYS: &[&str] = &["broker.topic_names"];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[source] config::ConfigError),

    #[error("failed to deserialize settings: {0}")]
    Deserialization(#[source] config::ConfigError),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error(transparent)]
    Invalid(#[from] data_handler_core::HandlerError),
}

/// Relational store settings
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresSettings {
    pub dsn: String,

    #[serde(default)]
    pub pool: PoolConfig,
}

/// All settings of one process
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub postgres: Option<PostgresSettings>,

    #[serde(default)]
    pub broker: Option<BrokerEndpoint>,

    #[serde(default)]
    pub producer: ProducerConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,

    /// Default log filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load from `.env`, `CONFIG_FILE` and the process environment
    pub fn load() -> Result<Self, SettingsError> {
        // a missing .env file is fine
        let _ = dotenvy::dotenv();

        let file = std::env::var_os(CONFIG_FILE_VAR).map(PathBuf::from);
        Self::from_sources(file.as_deref(), None)
    }

    /// Load from an optional file and an environment map.
    ///
    /// `env` replaces the process environment when given.
    pub fn from_sources(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, SettingsError> {
        let mut environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_PREFIX_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR)
            .source(env);

        for key in LIST_PARSE_KEYS {
            environment = environment.with_list_parse_key(key);
        }

        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(environment)
            .build()
            .map_err(SettingsError::Load)?
            .try_deserialize()
            .map_err(SettingsError::Deserialization)
    }

    /// Settings needed by produce mode, validated
    pub fn producer_settings(&self) -> Result<(&PostgresSettings, &ProducerConfig), SettingsError> {
        let postgres = self
            .postgres
            .as_ref()
            .ok_or(SettingsError::Missing("postgres.dsn"))?;

        if postgres.dsn.trim().is_empty() {
            return Err(SettingsError::Missing("postgres.dsn"));
        }
        postgres.pool.validate()?;
        self.producer.validate()?;

        Ok((postgres, &self.producer))
    }

    /// Settings needed by consume mode, validated
    pub fn consumer_settings(&self) -> Result<(&BrokerEndpoint, &ConsumerConfig), SettingsError> {
        let broker = self
            .broker
            .as_ref()
            .ok_or(SettingsError::Missing("broker.bootstrap_servers"))?;

        broker.validate()?;
        self.consumer.validate()?;

        Ok((broker, &self.consumer))
    }
}
