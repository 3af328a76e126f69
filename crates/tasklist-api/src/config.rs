//! Startup configuration read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tasklist_core::broker::BatchLimits;
use tasklist_outbox::SweepConfig;

use crate::error::AppError;

/// Which broker the service publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokerKind {
    /// Keeps deliveries in process memory.
    Memory,
    /// Writes every message to the log.
    #[default]
    Log,
}

impl FromStr for BrokerKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "log" => Ok(Self::Log),
            other => Err(format!("unknown broker `{other}`, expected `memory` or `log`")),
        }
    }
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub broker: BrokerKind,
    pub batch_limits: BatchLimits,
    /// A zero interval turns the background sweep off.
    pub sweep: SweepConfig,
    /// OTLP collector endpoint. Span export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns a variable's
    /// value or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first missing or invalid variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("DATABASE_URL environment variable must be set".to_string())
            })?;

        let defaults = SweepConfig::default();
        let max_batch_bytes = parse_or(
            &lookup,
            "BROKER_MAX_BATCH_BYTES",
            BatchLimits::DEFAULT_MAX_BYTES,
        )?;
        let mut batch_limits = BatchLimits::bytes(max_batch_bytes);
        let max_messages = parse_optional::<usize>(&lookup, "BROKER_MAX_BATCH_MESSAGES")?;
        if let Some(max_messages) = max_messages {
            batch_limits = batch_limits.with_max_messages(max_messages);
        }

        let sweep = SweepConfig {
            interval: Duration::from_secs(parse_or(
                &lookup,
                "OUTBOX_SWEEP_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?),
            min_age: Duration::from_secs(parse_or(
                &lookup,
                "OUTBOX_SWEEP_MIN_AGE_SECS",
                defaults.min_age.as_secs(),
            )?),
            max_attempts: parse_or(&lookup, "OUTBOX_SWEEP_MAX_ATTEMPTS", defaults.max_attempts)?,
            batch_size: parse_or(&lookup, "OUTBOX_SWEEP_BATCH_SIZE", defaults.batch_size)?,
        };
        sweep
            .validate()
            .map_err(|e| AppError::Config(format!("outbox sweep settings are invalid: {e}")))?;

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            broker: parse_or(&lookup, "BROKER", BrokerKind::default())?,
            batch_limits,
            sweep,
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                .filter(|endpoint| !endpoint.trim().is_empty()),
        })
    }

    /// The address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse_optional<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| AppError::Config(format!("{name} is invalid: {e}")))
        })
        .transpose()
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(lookup, name)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        // Arrange / Act
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/tasks")]).unwrap();

        // Assert
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.broker, BrokerKind::Log);
        assert_eq!(config.batch_limits, BatchLimits::default());
        assert_eq!(config.sweep, SweepConfig::default());
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_missing_database_url_is_a_config_error() {
        let result = config_from(&[("PORT", "8080")]);

        match result {
            Err(AppError::Config(message)) => assert!(message.contains("DATABASE_URL")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_value_names_the_variable() {
        let result = config_from(&[
            ("DATABASE_URL", "postgres://localhost/tasks"),
            ("OUTBOX_SWEEP_MAX_ATTEMPTS", "many"),
        ]);

        match result {
            Err(AppError::Config(message)) => {
                assert!(message.contains("OUTBOX_SWEEP_MAX_ATTEMPTS"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/tasks"),
            ("BROKER", "Memory"),
            ("BROKER_MAX_BATCH_BYTES", "1024"),
            ("BROKER_MAX_BATCH_MESSAGES", "10"),
            ("OUTBOX_SWEEP_INTERVAL_SECS", "0"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317"),
        ])
        .unwrap();

        assert_eq!(config.broker, BrokerKind::Memory);
        assert_eq!(
            config.batch_limits,
            BatchLimits::bytes(1024).with_max_messages(10)
        );
        assert!(config.sweep.interval.is_zero());
        assert_eq!(
            config.otlp_endpoint.as_deref(),
            Some("http://collector:4317")
        );
    }

    #[test]
    fn test_out_of_range_sweep_settings_are_rejected() {
        for (name, value) in [
            ("OUTBOX_SWEEP_BATCH_SIZE", "-5"),
            ("OUTBOX_SWEEP_MAX_ATTEMPTS", "0"),
            ("OUTBOX_SWEEP_MIN_AGE_SECS", "9000000000000"),
        ] {
            let vars = [("DATABASE_URL", "postgres://localhost/tasks"), (name, value)];

            let result = config_from(&vars);

            match result {
                Err(AppError::Config(message)) => assert!(message.contains("outbox sweep")),
                other => panic!("expected Config error for {name}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_socket_addr_rejects_bad_host() {
        let mut config = config_from(&[("DATABASE_URL", "postgres://localhost/tasks")]).unwrap();
        config.host = "not a host".to_string();

        assert!(matches!(config.socket_addr(), Err(AppError::Config(_))));
    }
}
