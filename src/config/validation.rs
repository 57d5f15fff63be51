//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that service overrides name known services with usable endpoints
//! - Validate value ranges (timeouts > 0, attempts ≥ 1, limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs once at startup; the validated config is immutable afterwards

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::context::KeyRegistry;
use crate::resilience::retries::MAX_RETRIES;
use crate::services::{AddressBook, ServiceName};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a loaded configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !looks_like_socket_addr(&config.listener.bind_address) {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "expected host:port",
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }

    if config.auth.secret.is_empty() {
        errors.push(ValidationError::new("auth.secret", "required (JWT_SECRET)"));
    }

    if config.cache.connect_attempts == 0 {
        errors.push(ValidationError::new("cache.connect_attempts", "must be ≥ 1"));
    }
    for (field, value) in [
        ("cache.ping_timeout_ms", config.cache.ping_timeout_ms),
        ("cache.op_timeout_ms", config.cache.op_timeout_ms),
        ("timeouts.request_ms", config.timeouts.request_ms),
        ("timeouts.connect_ms", config.timeouts.connect_ms),
        ("timeouts.probe_ms", config.timeouts.probe_ms),
        ("rate_limit.window_secs", config.rate_limit.window_secs),
        ("health_check.interval_secs", config.health_check.interval_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    if config.retries.max_retries > MAX_RETRIES {
        errors.push(ValidationError::new(
            "retries.max_retries",
            format!("at most {} retry per call", MAX_RETRIES),
        ));
    }

    if config.rate_limit.default.rps == 0 {
        errors.push(ValidationError::new("rate_limit.default.rps", "must be > 0"));
    }
    for (scope, limit) in &config.rate_limit.scopes {
        if limit.rps == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.scopes.{}.rps", scope),
                "must be > 0",
            ));
        }
    }

    for name in config.services.keys() {
        if name.parse::<ServiceName>().is_err() {
            errors.push(ValidationError::new(
                format!("services.{}", name),
                "unknown service",
            ));
        }
    }
    if let Err(e) = AddressBook::resolve(&config.service_overrides()) {
        errors.push(ValidationError::new("services", e.to_string()));
    }

    if let Err(e) = KeyRegistry::with_extras(config.context.extra_keys.iter().cloned()) {
        errors.push(ValidationError::new("context.extra_keys", e.to_string()));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
        }
        if !looks_like_socket_addr(&config.admin.bind_address) {
            errors.push(ValidationError::new("admin.bind_address", "expected host:port"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn looks_like_socket_addr(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
