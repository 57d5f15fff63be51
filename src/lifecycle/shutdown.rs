//! Shutdown coordination for the gateway.

use tokio::sync::{broadcast, watch};

/// Where the process is in its shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownState {
    Running,
    /// Graceful shutdown requested; in-flight work may finish.
    Draining,
    /// A second request arrived; abandon in-flight work now.
    Forced,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished within the grace window.
    Clean,
    /// The grace window elapsed and in-flight work was aborted.
    Forced,
    /// A second signal cut the grace window short.
    Interrupted,
}

impl ShutdownOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            ShutdownOutcome::Clean => 0,
            ShutdownOutcome::Forced => 1,
            ShutdownOutcome::Interrupted => 130,
        }
    }
}

/// Coordinator for graceful shutdown.
///
/// Long-running tasks either subscribe to the broadcast channel or await
/// [`Shutdown::triggered`], which also resolves for late subscribers.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    state: watch::Sender<ShutdownState>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        let (state, _) = watch::channel(ShutdownState::Running);
        Self { tx, state }
    }

    /// Subscribe to the shutdown broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Request a graceful shutdown. Returns true on the first request.
    pub fn trigger(&self) -> bool {
        let first = self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining;
                true
            } else {
                false
            }
        });
        if first {
            let _ = self.tx.send(());
        }
        first
    }

    /// Escalate to an immediate shutdown.
    pub fn force(&self) {
        self.state.send_if_modified(|state| {
            if *state == ShutdownState::Forced {
                false
            } else {
                *state = ShutdownState::Forced;
                true
            }
        });
        let _ = self.tx.send(());
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn is_triggered(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    /// Resolves once shutdown has been requested.
    pub async fn triggered(&self) {
        self.wait_for(ShutdownState::Draining).await
    }

    /// Resolves once shutdown has been forced.
    pub async fn forced(&self) {
        self.wait_for(ShutdownState::Forced).await
    }

    async fn wait_for(&self, at_least: ShutdownState) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|state| *state >= at_least).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
