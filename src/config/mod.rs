//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (explicit environment field table)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to the lifecycle supervisor
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults except the token secret
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, ConfigError, EnvSource, ProcessEnv};
pub use schema::{
    AdminConfig, AuthConfig, CacheConfig, GatewayConfig, HealthCheckConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, RateLimitConfig, RetryConfig, ScopeLimit, TimeoutConfig,
};
