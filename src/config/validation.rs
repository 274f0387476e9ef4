//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Validate the instruction media type and snapshot location
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a loaded configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, addr) in [
        ("listener.external_address", &config.listener.external_address),
        ("listener.internal_address", &config.listener.internal_address),
    ] {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(field, format!("'{}' is not a socket address", addr)));
        }
    }

    if config.listener.external_address == config.listener.internal_address {
        errors.push(ValidationError::new(
            "listener.internal_address",
            "must differ from listener.external_address",
        ));
    }

    if config.routing.snapshot_path.trim().is_empty() {
        errors.push(ValidationError::new("routing.snapshot_path", "must not be empty"));
    }

    if let Some(domain) = &config.routing.primary_domain {
        if domain.trim().is_empty() || domain.starts_with('.') {
            errors.push(ValidationError::new(
                "routing.primary_domain",
                "must be a bare domain such as 'example.com'",
            ));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.control_secs == 0 {
        errors.push(ValidationError::new("timeouts.control_secs", "must be greater than 0"));
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }

    if !config.protocol.instruction_media_type.contains('/') {
        errors.push(ValidationError::new(
            "protocol.instruction_media_type",
            "must be a media type such as 'application/stream+json'",
        ));
    }

    if matches!(&config.cookies.secret, Some(secret) if secret.len() < 16) {
        errors.push(ValidationError::new("cookies.secret", "must be at least 16 bytes"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.listener.external_address = "nope".into();
        config.timeouts.connect_secs = 0;
        config.routing.snapshot_path = "  ".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["listener.external_address", "routing.snapshot_path", "timeouts.connect_secs"]
        );
    }

    #[test]
    fn test_short_cookie_secret_rejected() {
        let mut config = GatewayConfig::default();
        config.cookies.secret = Some("short".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "cookies.secret");
    }
}
