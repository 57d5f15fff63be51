//! Cache subsystem.
//!
//! # Data Flow
//! ```text
//! rate limiter / auth verifier
//!     → client.rs (CacheClient: typed ops, per-op deadline)
//!     → store.rs (KvStore trait)
//!         → redis.rs (RedisStore, reconnecting connection manager)
//!         → store.rs (MemoryStore, in-process, for tests and local runs)
//! ```
//!
//! # Design Decisions
//! - A single transport error kind; misses are a separate kind
//! - Atomicity of `incr_ex` is delegated to the store
//! - Every operation is bounded by the caller's remaining deadline

pub mod client;
pub mod redis;
pub mod store;

use thiserror::Error;

pub use client::CacheClient;
pub use self::redis::RedisStore;
pub use store::{KvStore, MemoryStore};

/// Errors returned by cache operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The store could not be reached or the operation did not complete in time.
    #[error("cache transport error: {0}")]
    Transport(String),

    /// The key does not exist (or has expired).
    #[error("cache key not found")]
    NotFound,

    /// A counter left the unsigned 64-bit range.
    #[error("cache counter overflow for key {0}")]
    Overflow(String),

    /// A structured value could not be encoded or decoded.
    #[error("cache codec error: {0}")]
    Codec(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
