//! Per-request context: identifiers, principal, deadline and cancellation.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::keys::{ContextKey, KeySet};
use crate::context::principal::Principal;

/// Context created at the HTTP boundary and carried through every downstream call.
///
/// Cloning is cheap; clones share the cancellation token.
#[derive(Debug, Clone)]
pub struct RequestContext {
    keys: KeySet,
    values: BTreeMap<ContextKey, String>,
    principal: Option<Principal>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Empty context restricted to `keys`.
    pub fn new(keys: KeySet) -> Self {
        Self {
            keys,
            values: BTreeMap::new(),
            principal: None,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Context with freshly generated request and trace ids.
    pub fn ingress(keys: KeySet) -> Self {
        let mut ctx = Self::new(keys);
        ctx.ensure_ids();
        ctx
    }

    /// Generate request/trace ids if they are missing. Returns true if any was generated.
    pub fn ensure_ids(&mut self) -> bool {
        let mut generated = false;
        for key in [ContextKey::REQUEST_ID, ContextKey::TRACE_ID] {
            if self.get(&key).is_none() {
                self.values.insert(key, Uuid::new_v4().to_string());
                generated = true;
            }
        }
        generated
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    /// Replace the key set, dropping values whose key is no longer registered.
    pub fn with_keys(mut self, keys: KeySet) -> Self {
        self.values.retain(|k, _| keys.contains(k));
        self.keys = keys;
        self
    }

    pub fn get(&self, key: &ContextKey) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Install a value. Refused (returns false) for unregistered keys or values
    /// that cannot travel as a header.
    pub fn insert(&mut self, key: &ContextKey, value: impl Into<String>) -> bool {
        let value = value.into();
        if !self.keys.contains(key) || !is_transportable(&value) {
            return false;
        }
        self.values.insert(key.clone(), value);
        true
    }

    /// Registered key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&ContextKey, &str)> {
        self.values.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn request_id(&self) -> &str {
        self.get(&ContextKey::REQUEST_ID).unwrap_or_default()
    }

    pub fn trace_id(&self) -> &str {
        self.get(&ContextKey::TRACE_ID).unwrap_or_default()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Install the authenticated principal together with its identity keys.
    pub fn set_principal(&mut self, principal: Principal) {
        self.insert(&ContextKey::USER_ID, principal.user_id.to_string());
        self.insert(&ContextKey::SESSION_ID, principal.session_id.clone());
        self.principal = Some(principal);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Derive a child bounded by `timeout` from now. The child deadline never
    /// extends the parent's, and cancelling the parent cancels the child.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            keys: self.keys.clone(),
            values: self.values.clone(),
            principal: self.principal.clone(),
            deadline: Some(deadline),
            cancel: self.cancel.child_token(),
        }
    }

    /// Derive a child sharing the deadline, for a group of sibling calls that
    /// must be cancellable together without cancelling the parent.
    pub fn child(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            values: self.values.clone(),
            principal: self.principal.clone(),
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the context is cancelled or its deadline elapses.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(KeySet::common())
    }
}

fn is_transportable(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| (0x20..0x7f).contains(&b))
}
