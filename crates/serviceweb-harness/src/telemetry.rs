// crates/serviceweb-harness/src/telemetry.rs
// ============================================================================
// Module: Harness Telemetry
// Description: Observability hooks for harness lifecycle events.
// Purpose: Provide typed events without hard logging dependencies.
// Dependencies: std
// ============================================================================

//! ## Overview
//! This module exposes a thin event interface for harness observability.
//! It is intentionally dependency-light so callers can plug in their own
//! logging or reporting without redesign; the default sink drops events.

use std::sync::Mutex;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Lifecycle events emitted by the harness.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessEvent {
    /// A server subprocess was spawned.
    ServerSpawned {
        /// OS process id of the child.
        pid: u32,
    },
    /// The spawned server answered its first readiness probe.
    ServerReady {
        /// Loopback port the server answered on.
        port: u16,
        /// Number of probe attempts before the first response.
        attempts: u32,
    },
    /// An intercepted request matched a registered mock rule.
    MockMatched {
        /// HTTP verb of the intercepted request.
        verb: String,
        /// Path and query of the intercepted request.
        target: String,
    },
    /// An intercepted request matched no registered mock rule.
    MockUnmatched {
        /// HTTP verb of the intercepted request.
        verb: String,
        /// Path and query of the intercepted request.
        target: String,
    },
    /// The simulated login flow completed the callback redirect.
    LoginCompleted {
        /// Login of the canned identity established in the session.
        login: String,
    },
    /// The logout endpoint was called during flow teardown.
    LogoutIssued,
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Receiver for harness lifecycle events.
pub trait TelemetrySink: Send + Sync {
    /// Records one event. Implementations must not block the harness.
    fn record(&self, event: &HarnessEvent);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: &HarnessEvent) {}
}

/// Sink that retains events in memory for assertions.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    /// Recorded events in arrival order.
    events: Mutex<Vec<HarnessEvent>>,
}

impl RecordingTelemetry {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded events.
    pub fn events(&self) -> Vec<HarnessEvent> {
        self.events.lock().map_or_else(|_| Vec::new(), |events| events.clone())
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record(&self, event: &HarnessEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
