// crates/serviceweb-harness/src/process.rs
// ============================================================================
// Module: Process Control
// Description: Signal delivery and liveness checks for spawned servers.
// Purpose: Keep signal logic behind a seam so it is testable without
//          spawning real processes.
// Dependencies: libc
// ============================================================================

//! ## Overview
//! The ephemeral server harness terminates its child with SIGTERM and
//! escalates to SIGKILL after a bounded wait. Both operations go through
//! [`ProcessController`] so unit tests can exercise the shutdown ladder
//! with a mock instead of live processes.

use std::io;

// ============================================================================
// SECTION: Signals and Status
// ============================================================================

/// Signals the harness may deliver to a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Graceful termination request (SIGTERM).
    Term,
    /// Forced termination (SIGKILL).
    Kill,
}

/// Observed liveness of a process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process exists and is signalable.
    Running,
    /// No process exists for the pid.
    NotFound,
    /// A process exists but this user may not signal it.
    NoPermission,
}

// ============================================================================
// SECTION: Controller Seam
// ============================================================================

/// Signal delivery and liveness seam.
pub trait ProcessController: Send + Sync {
    /// Reports whether a process with `pid` is running.
    ///
    /// # Errors
    /// Returns an error for OS failures other than a missing process or a
    /// permission refusal, which are reported as statuses.
    fn check_process(&self, pid: u32) -> io::Result<ProcessStatus>;

    /// Delivers `signal` to `pid`.
    ///
    /// # Errors
    /// Returns the underlying OS error when delivery fails; a missing
    /// process surfaces as [`io::ErrorKind::NotFound`] so callers can
    /// treat an already-gone child as success.
    fn send_signal(&self, pid: u32, signal: Signal) -> io::Result<()>;
}

/// Controller backed by `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixProcessController;

impl UnixProcessController {
    /// Converts a pid into the libc representation.
    fn pid_t(pid: u32) -> io::Result<libc::pid_t> {
        pid.try_into().map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))
    }
}

impl ProcessController for UnixProcessController {
    #[allow(unsafe_code, reason = "kill(2) with signal 0 is the portable liveness probe.")]
    fn check_process(&self, pid: u32) -> io::Result<ProcessStatus> {
        let pid_t = Self::pid_t(pid)?;
        // SAFETY: kill with signal 0 performs permission and existence
        // checks only; no signal is delivered.
        let result = unsafe { libc::kill(pid_t, 0) };
        if result == 0 {
            return Ok(ProcessStatus::Running);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Ok(ProcessStatus::NotFound),
            Some(libc::EPERM) => Ok(ProcessStatus::NoPermission),
            _ => Err(err),
        }
    }

    #[allow(unsafe_code, reason = "Graceful SIGTERM is not expressible via std::process.")]
    fn send_signal(&self, pid: u32, signal: Signal) -> io::Result<()> {
        let pid_t = Self::pid_t(pid)?;
        let sig = match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        // SAFETY: pid_t and sig are validated values; kill has no memory
        // safety requirements beyond valid arguments.
        let result = unsafe { libc::kill(pid_t, sig) };
        if result == 0 {
            Ok(())
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such process"))
            } else {
                Err(err)
            }
        }
    }
}

// ============================================================================
// SECTION: Test Support
// ============================================================================


// ============================================================================
// SECTION: Tests
// ============================================================================
