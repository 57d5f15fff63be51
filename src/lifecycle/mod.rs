//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Connect cache (K attempts) → Start clients + health monitor
//!     → Bind listeners → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal or trigger → Stop accepting → Drain (≤ T_grace)
//!     → Registry teardown → Close cache
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown; a second one forces it
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing is bound until every dependency is up
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has a timeout: in-flight work is abandoned after the grace window

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownOutcome, ShutdownState};
pub use signals::handle_signals;
pub use startup::{
    connect_cache, CacheConnector, MemoryConnector, Phase, RedisConnector, StartupError,
    Supervisor,
};
