// crates/serviceweb-harness/src/lib.rs
// ============================================================================
// Module: Serviceweb Harness Library
// Description: Test-support scaffolding for the serviceweb frontend.
// Purpose: Spawn the upstream servicebook process, mock outbound HTTP
//          dependencies, and drive the simulated login/logout flow.
// Dependencies: axum, reqwest, tokio, regex, serde, thiserror
// ============================================================================

//! ## Overview
//! This crate hosts the test-support scaffolding used to verify the
//! serviceweb frontend against a real upstream process and fully mocked
//! third-party HTTP dependencies. It provides:
//!
//! - [`coserver`]: spawn the servicebook server in an isolated subprocess,
//!   confirm loopback reachability within a bounded timeout, and tear it
//!   down afterwards.
//! - [`mock`]: an ordered first-match-wins registry of canned HTTP
//!   responses served from a loopback interceptor.
//! - [`session`]: explicit session decoration so the opaque OAuth `state`
//!   nonce written by the application can be recovered by the harness.
//! - [`login`]: the simulated identity-provider login/logout flow.
//! - [`fixtures`]: copy-aside/restore discipline for on-disk fixtures.
//!
//! Invariants:
//! - A spawned server is never considered started until a real TCP
//!   response was observed on its port.
//! - Teardown steps run even when setup or the test body failed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod coserver;
pub mod fixtures;
pub mod login;
pub mod mock;
pub mod process;
pub mod session;
pub mod telemetry;
pub mod timeouts;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use coserver::CoServer;
pub use coserver::CoServerError;
pub use coserver::CoServerOptions;
pub use fixtures::FixtureGuard;
pub use login::LoginFlow;
pub use login::LoginFlowBuilder;
pub use mock::CannedResponse;
pub use mock::MockMode;
pub use mock::MockRegistry;
pub use mock::MockRule;
pub use mock::MockServer;
pub use session::SessionStore;
pub use session::SharedSession;
pub use session::ShadowSession;
