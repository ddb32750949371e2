use std::path::Path;
use crate::errors::PayraceError;
use super::types::PayraceConfig;
use super::security::validate_security_patterns;
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

const MAX_CONCURRENCY: usize = 100;

pub async fn parse_config(path: &Path) -> Result<PayraceConfig, PayraceError> {
    if !path.exists() {
        return Err(PayraceError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(PayraceError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

/// Parse and validate configuration text.
pub fn parse_config_str(content: &str) -> Result<PayraceConfig, PayraceError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;

    validate_security_patterns(&yaml)?;
    validate_schema(&yaml)?;

    let config: PayraceConfig = serde_yaml::from_value(yaml)?;

    validate_semantics(&config)?;

    Ok(config)
}

/// Validate config against the JSON schema. Violations are logged, not fatal;
/// the semantic pass below rejects the ones that matter.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), PayraceError> {
    let json_value: serde_json::Value = serde_json::to_value(yaml)
        .map_err(|e| PayraceError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| PayraceError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        for e in errors {
            warn!(validation_error = %e, path = %e.instance_path, "Config schema warning");
        }
    }

    Ok(())
}

pub fn validate_semantics(config: &PayraceConfig) -> Result<(), PayraceError> {
    let race = config.race();
    if race.concurrency == 0 || race.concurrency > MAX_CONCURRENCY {
        return Err(PayraceError::Config(format!(
            "race.concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, race.concurrency
        )));
    }
    if race.min_results < 2 {
        return Err(PayraceError::Config(
            "race.min_results must be at least 2; a single result cannot show a race".into(),
        ));
    }

    let idem = config.idempotency();
    if idem.concurrency == 0 || idem.concurrency > MAX_CONCURRENCY {
        return Err(PayraceError::Config(format!(
            "idempotency.concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, idem.concurrency
        )));
    }
    if idem.header.trim().is_empty() {
        return Err(PayraceError::Config("idempotency.header must not be empty".into()));
    }
    if idem.expiry_hours <= 24 {
        warn!(expiry_hours = idem.expiry_hours, "Expiry probe key is inside the usual 24h window");
    }

    let ws = config.websocket();
    if ws.concurrency == 0 || ws.concurrency > MAX_CONCURRENCY {
        return Err(PayraceError::Config(format!(
            "websocket.concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, ws.concurrency
        )));
    }
    if ws.poll_interval_ms == 0 {
        return Err(PayraceError::Config("websocket.poll_interval_ms must be at least 1".into()));
    }

    if config.scan().max_parallel_endpoints == 0 {
        return Err(PayraceError::Config("scan.max_parallel_endpoints must be at least 1".into()));
    }

    for endpoint in config.endpoints() {
        if !endpoint.url.starts_with("http://") && !endpoint.url.starts_with("https://") {
            return Err(PayraceError::InvalidTarget(format!(
                "Endpoint URL must be http(s): {}", endpoint.url
            )));
        }
    }

    if let Some(session) = &config.session {
        if !session.is_authenticated() {
            warn!("Session configured but carries no cookies or token");
        }
    }

    Ok(())
}
