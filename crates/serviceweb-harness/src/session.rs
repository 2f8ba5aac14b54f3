// crates/serviceweb-harness/src/session.rs
// ============================================================================
// Module: Session Shadowing
// Description: Session store seam plus change-tracking decoration.
// Purpose: Recover opaque session values written during a simulated flow.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! The application under test stores an opaque OAuth `state` nonce in its
//! session between the login redirect and the provider callback. The
//! harness must read that value back to complete the callback, so the
//! session interface is a trait seam and [`ShadowSession`] decorates any
//! store with a local shadow of the keys written during the current flow.
//!
//! The shadow is an explicit value passed to collaborators, never ambient
//! process-global state.
//!
//! Invariants:
//! - Every write through the shadow is visible in both the inner store and
//!   the shadow record until the key is popped.
//! - Popping a key removes it from the shadow record as well.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

// ============================================================================
// SECTION: Session Store Seam
// ============================================================================

/// Key/value session interface exposed by the application under test.
pub trait SessionStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: Value);

    /// Removes and returns the value stored under `key`, if any.
    fn pop(&self, key: &str) -> Option<Value>;
}

/// In-memory session store shared between the harness and the application.
#[derive(Debug, Default)]
pub struct SharedSession {
    /// Session entries keyed by name.
    entries: Mutex<BTreeMap<String, Value>>,
}

impl SharedSession {
    /// Creates an empty session store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for SharedSession {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().ok().and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value);
        }
    }

    fn pop(&self, key: &str) -> Option<Value> {
        self.entries.lock().ok().and_then(|mut entries| entries.remove(key))
    }
}

// ============================================================================
// SECTION: Shadow Decoration
// ============================================================================

/// Decorator that forwards to an inner store while recording writes.
///
/// # Invariants
/// - `recorded` reflects only keys written through this decorator during
///   the current flow; pre-existing inner entries are not shadowed.
pub struct ShadowSession {
    /// The real session store of the application under test.
    inner: Arc<dyn SessionStore>,
    /// Shadow of keys written during the current flow.
    recorded: Mutex<BTreeMap<String, Value>>,
}

impl ShadowSession {
    /// Decorates `inner` with an empty shadow record.
    #[must_use]
    pub fn new(inner: Arc<dyn SessionStore>) -> Self {
        Self {
            inner,
            recorded: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the shadow copy of a key written during the current flow.
    pub fn recorded(&self, key: &str) -> Option<Value> {
        self.recorded.lock().ok().and_then(|recorded| recorded.get(key).cloned())
    }

    /// Returns the keys written during the current flow, in sorted order.
    pub fn recorded_keys(&self) -> Vec<String> {
        self.recorded
            .lock()
            .map_or_else(|_| Vec::new(), |recorded| recorded.keys().cloned().collect())
    }

    /// Clears the shadow record without touching the inner store.
    pub fn reset(&self) {
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.clear();
        }
    }
}

impl SessionStore for ShadowSession {
    fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) {
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.insert(key.to_string(), value.clone());
        }
        self.inner.set(key, value);
    }

    fn pop(&self, key: &str) -> Option<Value> {
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.remove(key);
        }
        self.inner.pop(key)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
