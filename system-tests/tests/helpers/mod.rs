// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared helpers for serviceweb system-tests.
// Purpose: Provide backend staging, frontend wiring, and HTML scraping.
// Dependencies: system-tests, serviceweb-harness
// ============================================================================

//! ## Overview
//! Shared helpers for serviceweb system-tests.
//! Purpose: Provide backend staging, frontend wiring, and HTML scraping.
//! Invariants:
//! - Every test stages its own fixture copy in a temporary directory.
//! - Ports are allocated per test so suites can run in parallel.

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

pub mod infra;
