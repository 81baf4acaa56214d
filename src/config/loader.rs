//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: `defaults`, then the optional TOML file on top,
/// then process environment variables, then validation.
pub fn load_config(
    defaults: ServiceConfig,
    path: Option<&Path>,
) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            merge_toml(defaults, &content)?
        }
        None => defaults,
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay a TOML document on top of `base`. Keys missing from the document
/// keep the base value rather than the schema default.
pub fn merge_toml(base: ServiceConfig, content: &str) -> Result<ServiceConfig, ConfigError> {
    let mut merged = toml::Value::try_from(&base)?;
    let overlay: toml::Value = toml::from_str(content)?;
    deep_merge(&mut merged, overlay);
    Ok(merged.try_into()?)
}

fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply the documented environment variables. `lookup` abstracts
/// `std::env::var` so overrides can be tested without touching the process
/// environment.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let string = |var: &str, slot: &mut String| {
        if let Some(value) = lookup(var) {
            *slot = value;
        }
    };

    string("SERVICE_NAME", &mut config.service.name);
    string("SERVICE_VERSION", &mut config.service.version);
    string("ENVIRONMENT", &mut config.service.environment);
    string("HOSTNAME", &mut config.service.host_name);
    string("BIND_ADDRESS", &mut config.listener.bind_address);
    string("LOG_LEVEL", &mut config.observability.log_level);
    string("FRONTEND_SERVICE_URL", &mut config.upstream.base_url);
    string("OTEL_EXPORTER_OTLP_ENDPOINT", &mut config.tracing.otlp_endpoint);

    string("REDIS_HOST", &mut config.datastores.redis.host);
    string("POSTGRES_HOST", &mut config.datastores.postgres.host);
    string("POSTGRES_USER", &mut config.datastores.postgres.user);
    string("POSTGRES_PASSWORD", &mut config.datastores.postgres.password);
    string("POSTGRES_DB", &mut config.datastores.postgres.database);
    string("MYSQL_HOST", &mut config.datastores.mysql.host);
    string("MYSQL_USER", &mut config.datastores.mysql.user);
    string("MYSQL_PASSWORD", &mut config.datastores.mysql.password);
    string("MYSQL_DB", &mut config.datastores.mysql.database);
    string("MONGODB_HOST", &mut config.datastores.mongodb.host);
    string("MONGODB_USER", &mut config.datastores.mongodb.user);
    string("MONGODB_PASSWORD", &mut config.datastores.mongodb.password);
    string("KAFKA_BROKERS", &mut config.datastores.kafka.brokers);

    if let Some(value) = lookup("OTEL_TRACES_ENABLED") {
        config.tracing.enabled = match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => return Err(ConfigError::Env { var: "OTEL_TRACES_ENABLED", value }),
        };
    }

    let port = |var: &'static str, slot: &mut u16| -> Result<(), ConfigError> {
        if let Some(value) = lookup(var) {
            *slot = value
                .parse()
                .map_err(|_| ConfigError::Env { var, value: value.clone() })?;
        }
        Ok(())
    };

    port("REDIS_PORT", &mut config.datastores.redis.port)?;
    port("POSTGRES_PORT", &mut config.datastores.postgres.port)?;
    port("MYSQL_PORT", &mut config.datastores.mysql.port)?;
    port("MONGODB_PORT", &mut config.datastores.mongodb.port)?;

    Ok(())
}
