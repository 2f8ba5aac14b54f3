// system-tests/src/lib.rs
// ============================================================================
// Module: Serviceweb System Tests Library
// Description: Shared configuration, fixture data, and the app under test.
// Purpose: Provide common utilities for serviceweb system-test binaries.
// Dependencies: serviceweb-harness, axum, serde
// ============================================================================

//! ## Overview
//! This crate hosts the pieces shared by the serviceweb system-test
//! binaries in `system-tests/tests`: typed environment configuration, the
//! fixture book database, the frontend test application, and the
//! `servicebook_server` binary the harness spawns as a subprocess.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod book;
pub mod config;
pub mod testapp;
