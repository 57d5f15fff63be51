//! Request context shared by every hop of a request.
//!
//! # Data Flow
//! ```text
//! HTTP ingress
//!     → keys.rs (which keys may travel)
//!     → request.rs (RequestContext: ids, principal, deadline, cancel)
//!     → rpc::metadata (context → metadata on every outbound call)
//!     → downstream server interceptor (metadata → context)
//! ```
//!
//! # Design Decisions
//! - The key set is closed; values for unregistered keys are refused
//! - Values are ASCII strings so they survive as header/metadata values
//! - Deadlines only ever shrink when a child context is derived

pub mod keys;
pub mod principal;
pub mod request;

pub use keys::{ContextKey, KeyError, KeyRegistry, KeySet};
pub use principal::Principal;
pub use request::RequestContext;
