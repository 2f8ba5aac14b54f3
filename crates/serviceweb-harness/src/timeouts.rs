// crates/serviceweb-harness/src/timeouts.rs
// ============================================================================
// Module: Harness Timeouts
// Description: Centralized timeout configuration with env overrides.
// Purpose: Keep harness waits bounded and consistent across suites.
// ============================================================================

//! ## Overview
//! Every wait in the harness is bounded: readiness polling has a hard
//! timeout and process termination uses a short bounded join. The
//! environment override acts as a minimum so explicitly longer timeouts
//! are never shortened on slow machines.

use std::env;
use std::time::Duration;

/// Environment variable raising the readiness timeout floor, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "SERVICEWEB_SYSTEM_TEST_TIMEOUT_SEC";

/// Total budget for the server readiness poll.
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between readiness probe attempts.
pub const READINESS_INTERVAL: Duration = Duration::from_millis(100);

/// Bounded wait for a signalled child process to exit.
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(1);

/// Interval between child exit checks during the bounded shutdown wait.
pub const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Per-request timeout for harness HTTP clients.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns the effective timeout, honoring [`ENV_TIMEOUT_SECS`] when set.
///
/// The override acts as a minimum; an unparsable or non-positive value is
/// ignored rather than shortening the requested timeout.
#[must_use]
pub fn resolve_timeout(requested: Duration) -> Duration {
    match env::var(ENV_TIMEOUT_SECS) {
        Ok(raw) => match parse_timeout_secs(&raw) {
            Some(override_timeout) => requested.max(override_timeout),
            None => requested,
        },
        Err(_) => requested,
    }
}

/// Parses a positive integer number of seconds.
fn parse_timeout_secs(raw: &str) -> Option<Duration> {
    let secs: u64 = raw.trim().parse().ok()?;
    if secs == 0 {
        return None;
    }
    Some(Duration::from_secs(secs))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
