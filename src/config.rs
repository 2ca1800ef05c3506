//! Process settings read from the environment (after `.env`, if present).

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::application::outbox_publisher::PublisherConfig;
use crate::bus::KafkaConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub kafka: KafkaConfig,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: i64,
    pub outbox_max_retries: i32,
    pub outbox_claim_lease: Duration,
    pub search_consumer_group: String,
    pub dlq_consumer_group: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let kafka_defaults = KafkaConfig::default();

        let settings = Self {
            database_url: vars.required("DATABASE_URL")?,
            host: vars.string("HOST", "0.0.0.0"),
            port: vars.parsed("PORT", 8080)?,
            kafka: KafkaConfig {
                brokers: vars.string("KAFKA_BROKERS", &kafka_defaults.brokers),
                client_id: vars.string("KAFKA_CLIENT_ID", &kafka_defaults.client_id),
                compression: vars.string("KAFKA_COMPRESSION", &kafka_defaults.compression),
                send_timeout: Duration::from_millis(vars.parsed("KAFKA_SEND_TIMEOUT_MS", 5000)?),
                ..kafka_defaults
            },
            outbox_poll_interval: Duration::from_millis(vars.positive("OUTBOX_POLL_INTERVAL_MS", 1000)?),
            outbox_batch_size: vars.positive("OUTBOX_BATCH_SIZE", 100)?,
            outbox_max_retries: vars.positive("OUTBOX_MAX_RETRIES", 5)?,
            outbox_claim_lease: Duration::from_secs(vars.positive("OUTBOX_CLAIM_LEASE_SECS", 30)?),
            search_consumer_group: vars.string("SEARCH_CONSUMER_GROUP", "search-indexer"),
            dlq_consumer_group: vars.string("DLQ_CONSUMER_GROUP", "dlq-processor"),
        };

        // A lease no longer than one send could expire before any row is marked.
        if settings.outbox_claim_lease <= settings.kafka.send_timeout {
            return Err(ConfigError::Invalid {
                name: "OUTBOX_CLAIM_LEASE_SECS",
                value: settings.outbox_claim_lease.as_secs().to_string(),
            });
        }
        Ok(settings)
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            poll_interval: self.outbox_poll_interval,
            batch_size: self.outbox_batch_size,
            claim_lease: self.outbox_claim_lease,
            publish_timeout: self.kafka.send_timeout,
            ..PublisherConfig::default()
        }
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name,
                value,
            }),
        }
    }

    fn positive<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + ToString,
    {
        let value = self.parsed(name, default)?;
        if value <= T::default() {
            return Err(ConfigError::Invalid {
                name,
                value: value.to_string(),
            });
        }
        Ok(value)
    }
}
