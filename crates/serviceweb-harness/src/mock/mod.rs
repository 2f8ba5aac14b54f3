// crates/serviceweb-harness/src/mock/mod.rs
// ============================================================================
// Module: HTTP Mock Interception
// Description: Ordered mock registry and loopback interceptor server.
// Purpose: Replay canned responses for outbound HTTP dependencies.
// Dependencies: axum, regex, reqwest, tokio
// ============================================================================

//! ## Overview
//! Outbound HTTP calls made by the application under test are routed to a
//! loopback interceptor whose registry is an ordered list of
//! `(verb, URL pattern, canned response)` rules consulted in registration
//! order, first match wins. Built-in rules are registered before caller
//! extras; that ordering is an explicit contract, not an accident.
//!
//! Unmatched calls fail loudly in strict mode so tests can never depend
//! on real network access by accident. Passthrough mode forwards
//! unmatched calls to a configured real base URL; it exists solely for
//! deliberately permissive windows.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod registry;
mod server;

// ============================================================================
// SECTION: Tests
// ============================================================================


// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use registry::CannedResponse;
pub use registry::MockError;
pub use registry::MockRegistry;
pub use registry::MockRule;
pub use registry::RecordedCall;
pub use server::MockMode;
pub use server::MockServer;
