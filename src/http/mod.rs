//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (root layers: panic recovery, request id, ingress context)
//!     → middleware/chain.rs (per-route stages)
//!     → handlers/ (typed downstream calls through rpc::clients)
//!     → response.rs (JSON body or error envelope)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{ApiJson, ApiQuery, Ctx, X_REQUEST_ID, X_TRACE_ID};
pub use response::{ApiError, ErrorCode};
pub use server::{build_router, AppState, HttpServer};
