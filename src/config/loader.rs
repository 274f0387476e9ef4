//! Configuration loading from disk and environment.

use std::path::Path;
use std::fs;
use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `listener.external_address`.
pub const ENV_EXTERNAL_ADDRESS: &str = "GATEWAY_EXTERNAL_ADDRESS";
/// Environment variable overriding `listener.internal_address`.
pub const ENV_INTERNAL_ADDRESS: &str = "GATEWAY_INTERNAL_ADDRESS";
/// Environment variable overriding `routing.snapshot_path`.
pub const ENV_ROUTES_FILE: &str = "GATEWAY_ROUTES_FILE";
/// Environment variable overriding `cookies.secret`.
pub const ENV_COOKIE_SECRET: &str = "GATEWAY_COOKIE_SECRET";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;
    finalize(config)
}

/// Defaults plus environment overrides, for running without a config file.
pub fn load_default() -> Result<GatewayConfig, ConfigError> {
    finalize(GatewayConfig::default())
}

fn finalize(mut config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply overrides from a key lookup (the process environment in production).
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = lookup(ENV_EXTERNAL_ADDRESS) {
        config.listener.external_address = addr;
    }
    if let Some(addr) = lookup(ENV_INTERNAL_ADDRESS) {
        config.listener.internal_address = addr;
    }
    if let Some(path) = lookup(ENV_ROUTES_FILE) {
        config.routing.snapshot_path = path;
    }
    if let Some(secret) = lookup(ENV_COOKIE_SECRET) {
        config.cookies.secret = Some(secret);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_EXTERNAL_ADDRESS, "0.0.0.0:9000"),
            (ENV_ROUTES_FILE, "/var/lib/gateway/routes.json"),
        ]);
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.listener.external_address, "0.0.0.0:9000");
        assert_eq!(config.listener.internal_address, "127.0.0.1:8889");
        assert_eq!(config.routing.snapshot_path, "/var/lib/gateway/routes.json");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\nrequest_secs = 0").unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.field == "timeouts.request_secs"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts\nrequest_secs = ").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }
}
