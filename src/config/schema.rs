//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files;
//! environment overrides are applied afterwards by the loader.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::services::ServiceName;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener settings.
    pub listener: ListenerConfig,

    /// Cache connection and startup retry policy.
    pub cache: CacheConfig,

    /// Endpoint overrides keyed by logical service name.
    pub services: BTreeMap<String, String>,

    /// Bearer token verification.
    pub auth: AuthConfig,

    /// Request and lifecycle timeouts.
    pub timeouts: TimeoutConfig,

    /// Per-scope rate limits.
    pub rate_limit: RateLimitConfig,

    /// Downstream retry policy.
    pub retries: RetryConfig,

    /// Downstream reachability probing.
    pub health_check: HealthCheckConfig,

    /// Context keys propagated in addition to the common set.
    pub context: ContextConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Admin/debug listener.
    pub admin: AdminConfig,

    /// Values carried for downstream sidecars, never consumed here.
    pub passthrough: PassthroughConfig,
}

impl GatewayConfig {
    /// Endpoint overrides with names resolved to services.
    ///
    /// Unknown names are reported by validation, so they are skipped here.
    pub fn service_overrides(&self) -> HashMap<ServiceName, String> {
        self.services
            .iter()
            .filter_map(|(name, addr)| name.parse().ok().map(|s| (s, addr.clone())))
            .collect()
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "localhost:8081").
    pub bind_address: String,

    /// Default request body limit in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "localhost:8081".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache endpoint, `host:port` or `redis://` URL.
    pub address: String,

    /// Ping timeout during startup (T₁), in milliseconds.
    pub ping_timeout_ms: u64,

    /// Maximum connection attempts before startup fails (K).
    pub connect_attempts: u32,

    /// Base delay for exponential backoff between attempts.
    pub base_delay_ms: u64,

    /// Maximum delay between attempts.
    pub max_delay_ms: u64,

    /// Upper bound for any single cache operation.
    pub op_timeout_ms: u64,
}

impl CacheConfig {
    /// Connection URL understood by the redis client.
    pub fn url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("redis://{}", self.address)
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
            ping_timeout_ms: 500,
            connect_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            op_timeout_ms: 250,
        }
    }
}

/// Token verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Pre-shared HS256 key. Required.
    pub secret: String,

    /// Expected `iss` claim, if any.
    pub issuer: Option<String>,

    /// Clock skew tolerance for `exp`/`nbf`.
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: None,
            leeway_secs: 5,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default per-route deadline in milliseconds.
    pub request_ms: u64,

    /// Downstream connect timeout in milliseconds.
    pub connect_ms: u64,

    /// Reachability probe timeout in milliseconds.
    pub probe_ms: u64,

    /// Grace window for in-flight requests at shutdown (T_grace).
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 5_000,
            connect_ms: 1_000,
            probe_ms: 500,
            shutdown_grace_secs: 10,
        }
    }
}

/// Limit for a single rate-limit scope.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct ScopeLimit {
    /// Sustained requests per second.
    pub rps: u32,

    /// Extra requests admitted per window on top of `rps * window`.
    #[serde(default)]
    pub burst: u32,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Limits by scope name; scopes without an entry use `default`.
    pub scopes: BTreeMap<String, ScopeLimit>,

    /// Fallback limit.
    pub default: ScopeLimit,
}

impl RateLimitConfig {
    pub fn limit_for(&self, scope: &str) -> ScopeLimit {
        self.scopes.get(scope).copied().unwrap_or(self.default)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut scopes = BTreeMap::new();
        scopes.insert("login".to_string(), ScopeLimit { rps: 5, burst: 0 });
        scopes.insert("user".to_string(), ScopeLimit { rps: 10, burst: 0 });
        Self {
            enabled: true,
            window_secs: 1,
            scopes,
            default: ScopeLimit { rps: 50, burst: 10 },
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries of idempotent downstream calls.
    pub enabled: bool,

    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 1,
            base_delay_ms: 50,
            max_delay_ms: 500,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable periodic probing.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Number of consecutive failures before marking a service unreachable.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking a service ready.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            unhealthy_threshold: 3,
            healthy_threshold: 1,
        }
    }
}

/// Context propagation configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ContextConfig {
    /// Extra header names propagated end-to-end (e.g. "x-client-version").
    pub extra_keys: Vec<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Install the Prometheus recorder.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}

/// Admin dashboard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin listener.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin listener bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:9091".to_string(),
        }
    }
}

/// Settings owned by downstream services and migration sidecars.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PassthroughConfig {
    pub database_url: Option<String>,
    pub migrate_path: Option<String>,
}
