//! Cross-service RPC fabric.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → clients.rs (UsersApi / PostsApi, typed calls)
//!     → registry.rs (per-service record, lazy channel)
//!     → metadata.rs (ClientContextInterceptor: context → metadata)
//!     → gRPC downstream
//!         → metadata.rs (ServerContextInterceptor: metadata → context)
//! ```
//!
//! # Design Decisions
//! - One channel per logical service, shared by every request
//! - Every call carries the request context and a deadline
//! - Idempotent calls are retried once on transport failure

pub mod clients;
pub mod error;
pub mod metadata;
pub mod proto;
pub mod registry;

pub use clients::{GrpcPosts, GrpcUsers, PostsApi, RpcClient, UsersApi};
pub use error::RpcError;
pub use metadata::{ClientContextInterceptor, ServerContextInterceptor};
pub use registry::{DownstreamRegistry, DownstreamStatus, RegistryConfig, RegistryError, Teardown};
