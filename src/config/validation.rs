//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses parse and value ranges (timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::BridgeConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("backend.address must not be empty")]
    EmptyBackendAddress,

    #[error("observability.log_level: unknown level '{0}'")]
    UnknownLogLevel(String),

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingAdminKey,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn check_socket_addr(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr("listener.bind_address", &config.listener.bind_address, &mut errors);

    // Backend may be a host name, so only reject the obviously broken cases.
    if config.backend.address.trim().is_empty() {
        errors.push(ValidationError::EmptyBackendAddress);
    }
    if config.backend.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("backend.connect_timeout_secs"));
    }
    if config.backend.max_line_bytes == 0 {
        errors.push(ValidationError::ZeroValue("backend.max_line_bytes"));
    }
    if config.backend.reply_timeout_secs == Some(0) {
        errors.push(ValidationError::ZeroValue("backend.reply_timeout_secs"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.request_secs"));
    }
    if config.http.max_body_size == 0 {
        errors.push(ValidationError::ZeroValue("http.max_body_size"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }
    if config.observability.metrics_enabled {
        check_socket_addr(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if config.admin.enabled {
        check_socket_addr("admin.bind_address", &config.admin.bind_address, &mut errors);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::MissingAdminKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
