//! Configuration loading from disk and environment.
//!
//! Precedence: built-in defaults < TOML file < environment variables.
//! Each recognised environment variable is declared once in an explicit
//! field table (name, required, parser); nothing is bound by reflection.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{GatewayConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};
use crate::services::ServiceName;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {name}: {reason}")]
    Env { name: &'static str, reason: String },

    #[error("missing required configuration: {}", .0.join(", "))]
    MissingRequired(Vec<&'static str>),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Source of environment variables.
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.is_empty()).cloned()
    }
}

type Apply = fn(&mut GatewayConfig, &str) -> Result<(), String>;
type IsSet = fn(&GatewayConfig) -> bool;

/// One recognised environment variable.
struct EnvField {
    name: &'static str,
    required: bool,
    apply: Apply,
    /// For required fields: whether a value already came from the file.
    is_set: IsSet,
}

fn env_fields() -> Vec<EnvField> {
    let always: IsSet = |_| true;
    vec![
        EnvField {
            name: "GATEWAY_ADDR",
            required: false,
            apply: |c, v| {
                c.listener.bind_address = v.to_string();
                Ok(())
            },
            is_set: always,
        },
        EnvField {
            name: "CACHE_ADDR",
            required: false,
            apply: |c, v| {
                c.cache.address = v.to_string();
                Ok(())
            },
            is_set: always,
        },
        EnvField {
            name: "JWT_SECRET",
            required: true,
            apply: |c, v| {
                c.auth.secret = v.to_string();
                Ok(())
            },
            is_set: |c| !c.auth.secret.is_empty(),
        },
        EnvField {
            name: "DATABASE_URL",
            required: false,
            apply: |c, v| {
                c.passthrough.database_url = Some(v.to_string());
                Ok(())
            },
            is_set: always,
        },
        EnvField {
            name: "MIGRATE_PATH",
            required: false,
            apply: |c, v| {
                c.passthrough.migrate_path = Some(v.to_string());
                Ok(())
            },
            is_set: always,
        },
        EnvField {
            name: "ADMIN_ADDR",
            required: false,
            apply: |c, v| {
                c.admin.bind_address = v.to_string();
                c.admin.enabled = true;
                Ok(())
            },
            is_set: always,
        },
        EnvField {
            name: "ADMIN_API_KEY",
            required: false,
            apply: |c, v| {
                c.admin.api_key = v.to_string();
                Ok(())
            },
            is_set: always,
        },
        EnvField {
            name: "LOG_LEVEL",
            required: false,
            apply: |c, v| {
                c.observability.log_level = v.to_lowercase();
                Ok(())
            },
            is_set: always,
        },
        EnvField {
            name: "LOG_FORMAT",
            required: false,
            apply: |c, v| {
                c.observability.log_format = match v.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" | "text" => LogFormat::Pretty,
                    other => return Err(format!("unknown log format '{}'", other)),
                };
                Ok(())
            },
            is_set: always,
        },
        EnvField {
            name: "REQUEST_TIMEOUT_MS",
            required: false,
            apply: |c, v| {
                c.timeouts.request_ms = v.parse().map_err(|e| format!("{}", e))?;
                Ok(())
            },
            is_set: always,
        },
    ]
}

/// Load configuration from an optional TOML file plus the given environment.
pub fn load(path: Option<&Path>, env: &impl EnvSource) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => GatewayConfig::default(),
    };

    apply_env(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML file without environment overrides or validation.
pub fn load_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Apply every recognised environment variable on top of `config`.
pub fn apply_env(config: &mut GatewayConfig, env: &impl EnvSource) -> Result<(), ConfigError> {
    let mut missing = Vec::new();

    for field in env_fields() {
        match env.var(field.name) {
            Some(value) => (field.apply)(config, &value).map_err(|reason| ConfigError::Env {
                name: field.name,
                reason,
            })?,
            None if field.required && !(field.is_set)(config) => missing.push(field.name),
            None => {}
        }
    }

    for service in ServiceName::ALL {
        if let Some(addr) = env.var(service.env_var()) {
            config.services.insert(service.as_str().to_string(), addr);
        }
    }

    if !missing.is_empty() {
        return Err(ConfigError::MissingRequired(missing));
    }
    Ok(())
}
