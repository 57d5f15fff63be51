//! Registry of context keys that may cross service boundaries.
//!
//! # Responsibilities
//! - Define the always-propagated key set
//! - Validate extra keys (header-safe, no reserved prefixes)
//! - Produce per-call supersets without duplicates

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while registering keys.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// A named key whose string form doubles as its metadata header name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey(Cow<'static, str>);

impl ContextKey {
    pub const USER_ID: ContextKey = ContextKey(Cow::Borrowed("x-user-id"));
    pub const SESSION_ID: ContextKey = ContextKey(Cow::Borrowed("x-session-id"));
    pub const REQUEST_ID: ContextKey = ContextKey(Cow::Borrowed("x-request-id"));
    pub const TRACE_ID: ContextKey = ContextKey(Cow::Borrowed("x-trace-id"));

    /// Create an extra key, validating its string form.
    pub fn new(name: impl Into<String>) -> Result<Self, KeyError> {
        let name = name.into();
        if !is_valid_key(&name) {
            return Err(KeyError::InvalidKey(name));
        }
        Ok(Self(Cow::Owned(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Keys that only the gateway may set; never accepted from an HTTP client.
    pub fn is_identity(&self) -> bool {
        *self == Self::USER_ID || *self == Self::SESSION_ID
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_key(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with("grpc-")
        && !name.ends_with("-bin")
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_' || b == b'.')
}

/// An immutable, duplicate-free set of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    keys: Arc<[ContextKey]>,
}

impl KeySet {
    /// The always-propagated keys.
    pub fn common() -> Self {
        Self {
            keys: Arc::from(vec![
                ContextKey::USER_ID,
                ContextKey::SESSION_ID,
                ContextKey::REQUEST_ID,
                ContextKey::TRACE_ID,
            ]),
        }
    }

    pub fn contains(&self, key: &ContextKey) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Find a registered key by its string form.
    pub fn find(&self, name: &str) -> Option<&ContextKey> {
        self.keys.iter().find(|k| k.as_str() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Superset of `self` with `extras` appended.
    pub fn extend<I>(&self, extras: I) -> Result<KeySet, KeyError>
    where
        I: IntoIterator<Item = ContextKey>,
    {
        let mut keys: Vec<ContextKey> = self.keys.to_vec();
        for extra in extras {
            if keys.contains(&extra) {
                return Err(KeyError::DuplicateKey(extra.as_str().to_string()));
            }
            keys.push(extra);
        }
        Ok(Self { keys: Arc::from(keys) })
    }
}

impl Default for KeySet {
    fn default() -> Self {
        Self::common()
    }
}

/// Process-wide key registry: the common keys plus configured extras.
#[derive(Debug, Clone)]
pub struct KeyRegistry {
    common: KeySet,
    registered: KeySet,
}

impl KeyRegistry {
    /// Registry holding only the common keys.
    pub fn new() -> Self {
        let common = KeySet::common();
        Self {
            registered: common.clone(),
            common,
        }
    }

    /// Registry with additional process-wide keys, given by name.
    pub fn with_extras<I, S>(extras: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extras = extras
            .into_iter()
            .map(ContextKey::new)
            .collect::<Result<Vec<_>, _>>()?;
        let common = KeySet::common();
        let registered = common.extend(extras)?;
        Ok(Self { common, registered })
    }

    pub fn common_keys(&self) -> &KeySet {
        &self.common
    }

    /// Every key registered for this process.
    pub fn registered(&self) -> &KeySet {
        &self.registered
    }

    /// Per-call superset of the registered keys.
    pub fn extend<I>(&self, extras: I) -> Result<KeySet, KeyError>
    where
        I: IntoIterator<Item = ContextKey>,
    {
        self.registered.extend(extras)
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
