//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGTERM and SIGINT
//! - Turn the first signal into a graceful shutdown, the second into a forced one
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Non-Unix targets fall back to Ctrl+C with the same two-step semantics

use std::sync::Arc;

use crate::lifecycle::Shutdown;

/// Drive `shutdown` from process signals. Returns after the shutdown was forced.
#[cfg(unix)]
pub async fn handle_signals(shutdown: Arc<Shutdown>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    loop {
        let name = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
        };
        if !escalate(&shutdown, name) {
            return Ok(());
        }
    }
}

#[cfg(not(unix))]
pub async fn handle_signals(shutdown: Arc<Shutdown>) -> std::io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        if !escalate(&shutdown, "ctrl-c") {
            return Ok(());
        }
    }
}

/// Returns false once there is nothing left to escalate.
fn escalate(shutdown: &Shutdown, signal: &str) -> bool {
    if shutdown.trigger() {
        tracing::info!(signal, "Shutdown signal received; draining in-flight requests");
        true
    } else {
        tracing::warn!(signal, "Second shutdown signal; forcing exit");
        shutdown.force();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::shutdown::ShutdownState;

    #[test]
    fn second_signal_forces() {
        let shutdown = Shutdown::new();
        assert!(escalate(&shutdown, "SIGTERM"));
        assert_eq!(shutdown.state(), ShutdownState::Draining);
        assert!(!escalate(&shutdown, "SIGINT"));
        assert_eq!(shutdown.state(), ShutdownState::Forced);
    }
}
