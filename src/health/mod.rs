//! Downstream health subsystem.
//!
//! # Data Flow
//! ```text
//! Active checks (active.rs):
//!     Periodic timer
//!     → TCP probe per downstream record
//!     → Update state.rs
//!
//! Passive checks (passive.rs):
//!     RPC outcome observed
//!     → Classify as reachable / unreachable
//!     → Update state.rs
//!
//! State machine (state.rs):
//!     Idle → Connecting → Ready ←→ TransientFailure → Shutdown
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - State is observed, never used to refuse calls; the transport reconnects on its own
//! - Health state is per-service

pub mod active;
pub mod passive;
pub mod state;

pub use active::HealthMonitor;
pub use state::ConnectivityState;
