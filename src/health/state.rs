//! Downstream connectivity state machine.
//!
//! # States
//! - Idle: record created, no channel yet
//! - Connecting: channel opened, first probe pending
//! - Ready: last observations succeeded
//! - TransientFailure: last observations failed; the channel keeps reconnecting
//! - Shutdown: torn down, terminal
//!
//! # State Transitions
//! ```text
//! Idle → Connecting: channel opened
//! Connecting → Ready | TransientFailure: first probe result
//! Ready → TransientFailure: consecutive failures >= unhealthy_threshold
//! TransientFailure → Ready: consecutive successes >= healthy_threshold
//! any → Shutdown: teardown
//! ```
//!
//! # Design Decisions
//! - Hysteresis prevents flapping
//! - Counters reset on state transition
//! - Shutdown is never left

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use serde::Serialize;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Idle = 0,
    Connecting = 1,
    Ready = 2,
    TransientFailure = 3,
    Shutdown = 4,
}

impl From<u8> for ConnectivityState {
    fn from(val: u8) -> Self {
        match val {
            1 => ConnectivityState::Connecting,
            2 => ConnectivityState::Ready,
            3 => ConnectivityState::TransientFailure,
            4 => ConnectivityState::Shutdown,
            _ => ConnectivityState::Idle,
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectivityState::Idle => "idle",
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Ready => "ready",
            ConnectivityState::TransientFailure => "transient_failure",
            ConnectivityState::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// A state change, reported so the caller can log and export it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectivityState,
    pub to: ConnectivityState,
}

/// Lock-free state holder with success/failure thresholds.
#[derive(Debug)]
pub struct StateTracker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(ConnectivityState::Idle as u8),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
        }
    }
}

impl StateTracker {
    pub fn get(&self) -> ConnectivityState {
        self.state.load(Ordering::Acquire).into()
    }

    /// Move to `to` unconditionally, unless already shut down.
    pub fn force(&self, to: ConnectivityState) -> Option<Transition> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let from = ConnectivityState::from(current);
            if from == ConnectivityState::Shutdown || from == to {
                return None;
            }
            match self.state.compare_exchange_weak(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    self.consecutive_successes.store(0, Ordering::Relaxed);
                    return Some(Transition { from, to });
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Report a successful probe or call.
    pub fn mark_success(&self, healthy_threshold: u32) -> Option<Transition> {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        match self.get() {
            ConnectivityState::Ready | ConnectivityState::Shutdown => None,
            // The first observation after opening settles the state directly.
            ConnectivityState::Idle | ConnectivityState::Connecting => {
                self.force(ConnectivityState::Ready)
            }
            ConnectivityState::TransientFailure => {
                let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= healthy_threshold.max(1) {
                    self.force(ConnectivityState::Ready)
                } else {
                    None
                }
            }
        }
    }

    /// Report a failed probe or transport-level call failure.
    pub fn mark_failure(&self, unhealthy_threshold: u32) -> Option<Transition> {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        match self.get() {
            ConnectivityState::TransientFailure | ConnectivityState::Shutdown => None,
            ConnectivityState::Idle | ConnectivityState::Connecting => {
                self.force(ConnectivityState::TransientFailure)
            }
            ConnectivityState::Ready => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= unhealthy_threshold.max(1) {
                    self.force(ConnectivityState::TransientFailure)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_settles_state() {
        let tracker = StateTracker::default();
        tracker.force(ConnectivityState::Connecting);
        let t = tracker.mark_failure(3).unwrap();
        assert_eq!(t.from, ConnectivityState::Connecting);
        assert_eq!(t.to, ConnectivityState::TransientFailure);
    }

    #[test]
    fn ready_needs_consecutive_failures_to_degrade() {
        let tracker = StateTracker::default();
        tracker.force(ConnectivityState::Ready);
        assert!(tracker.mark_failure(3).is_none());
        assert!(tracker.mark_failure(3).is_none());
        // A success in between resets the streak.
        assert!(tracker.mark_success(1).is_none());
        assert!(tracker.mark_failure(3).is_none());
        assert!(tracker.mark_failure(3).is_none());
        assert!(tracker.mark_failure(3).is_some());
        assert_eq!(tracker.get(), ConnectivityState::TransientFailure);
    }

    #[test]
    fn recovers_after_healthy_threshold() {
        let tracker = StateTracker::default();
        tracker.force(ConnectivityState::TransientFailure);
        assert!(tracker.mark_success(2).is_none());
        assert_eq!(
            tracker.mark_success(2).map(|t| t.to),
            Some(ConnectivityState::Ready)
        );
    }

    #[test]
    fn shutdown_is_terminal() {
        let tracker = StateTracker::default();
        tracker.force(ConnectivityState::Shutdown);
        assert!(tracker.force(ConnectivityState::Ready).is_none());
        assert!(tracker.mark_success(1).is_none());
        assert_eq!(tracker.get(), ConnectivityState::Shutdown);
    }
}
