// crates/serviceweb-harness/src/coserver.rs
// ============================================================================
// Module: Ephemeral Server Harness
// Description: Spawn, readiness-poll, and tear down the servicebook child.
// Purpose: Deterministically bring up one isolated instance of the
//          upstream service per test case.
// Dependencies: reqwest, tokio, process controller
// ============================================================================

//! ## Overview
//! The application under test mutates process-wide state (working
//! directory, standard streams), so it runs in a separate OS process,
//! never a thread. The harness redirects the child's stdout/stderr to
//! capture files in the fixture directory, polls a health path until the
//! child accepts a connection, and tears the child down with SIGTERM plus
//! a bounded wait.
//!
//! Invariants:
//! - [`CoServer::start`] returns only after a real TCP response was
//!   observed on the target port.
//! - A child that never becomes reachable is terminated before the error
//!   is returned; a half-started server is never left behind silently.
//! - All waits are bounded; a wedged child cannot hang the suite.
//!
//! The health probe deliberately accepts any HTTP status as "reachable";
//! a stricter probe would require a success status. See DESIGN.md for
//! the recorded trade-off.

use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;
use tokio::time::sleep;

use crate::process::ProcessController;
use crate::process::ProcessStatus;
use crate::process::Signal;
use crate::process::UnixProcessController;
use crate::telemetry::HarnessEvent;
use crate::telemetry::NoopTelemetry;
use crate::telemetry::TelemetrySink;
use crate::timeouts;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default loopback port for the spawned servicebook instance.
pub const DEFAULT_PORT: u16 = 8888;

/// Capture file for the child's standard output.
pub const STDOUT_CAPTURE: &str = "coserver.stdout";

/// Capture file for the child's standard error.
pub const STDERR_CAPTURE: &str = "coserver.stderr";

/// Environment variable carrying the config file path to the child.
pub const CONFIG_ENV: &str = "SERVICEBOOK_CONFIG";

/// Health path polled until the child becomes reachable.
pub const HEALTH_PATH: &str = "/api/";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by the ephemeral server harness.
///
/// # Invariants
/// - Variants are stable for programmatic handling; in particular the
///   ghost case is distinct from the unreachable case.
#[derive(Debug, Error)]
pub enum CoServerError {
    /// The capture files could not be created.
    #[error("failed to create capture file {path}: {source}")]
    Capture {
        /// Capture file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The child process could not be spawned.
    #[error("failed to spawn coserver: {0}")]
    Spawn(std::io::Error),
    /// The child exited before ever answering a probe.
    #[error("coserver is born-dead; captured stdout:\n{stdout}\ncaptured stderr:\n{stderr}")]
    BornDead {
        /// Captured standard output of the dead child.
        stdout: String,
        /// Captured standard error of the dead child.
        stderr: String,
    },
    /// The child stayed alive but never accepted a connection.
    #[error("could not connect to coserver on port {port} before the timeout")]
    Unreachable {
        /// Port that never became reachable.
        port: u16,
    },
    /// The port answered but the child is not running.
    #[error("there's a ghost coserver on port {port}")]
    Ghost {
        /// Port that answered without a live child.
        port: u16,
    },
    /// Waiting on the child failed at the OS level.
    #[error("failed to wait on coserver: {0}")]
    Wait(std::io::Error),
    /// Signal delivery failed for a reason other than a missing process.
    #[error("failed to signal coserver: {0}")]
    Signal(std::io::Error),
    /// The child survived SIGTERM and SIGKILL within the bounded wait.
    #[error("coserver pid {pid} still running after bounded shutdown wait")]
    StillRunning {
        /// Pid of the surviving child.
        pid: u32,
    },
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Options for spawning the servicebook child.
#[derive(Debug, Clone)]
pub struct CoServerOptions {
    /// Server binary to execute.
    pub binary: PathBuf,
    /// Extra arguments passed to the binary.
    pub args: Vec<String>,
    /// Config file path handed to the child via [`CONFIG_ENV`].
    pub config_path: PathBuf,
    /// Fixture directory used as the child's working directory and the
    /// destination of the capture files.
    pub fixture_dir: PathBuf,
    /// Loopback port the child is expected to serve on.
    pub port: u16,
    /// Override for the readiness budget; `None` uses
    /// [`timeouts::READINESS_TIMEOUT`] with the env floor applied.
    pub readiness_timeout: Option<Duration>,
}

impl CoServerOptions {
    /// Builds options with the default port and readiness budget.
    #[must_use]
    pub fn new(binary: PathBuf, config_path: PathBuf, fixture_dir: PathBuf) -> Self {
        Self {
            binary,
            args: Vec::new(),
            config_path,
            fixture_dir,
            port: DEFAULT_PORT,
            readiness_timeout: None,
        }
    }

    /// Overrides the target port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Handle for one spawned servicebook instance.
pub struct CoServer {
    /// The spawned child process.
    child: Child,
    /// Pid recorded at spawn time.
    pid: u32,
    /// Port the child serves on.
    port: u16,
    /// Base URL of the child.
    base_url: String,
    /// Capture file for the child's stdout.
    stdout_path: PathBuf,
    /// Capture file for the child's stderr.
    stderr_path: PathBuf,
    /// Signal delivery seam.
    controller: Arc<dyn ProcessController>,
    /// Whether the explicit stop path already ran.
    stopped: bool,
}

impl CoServer {
    /// Spawns the child and waits until it is reachable.
    ///
    /// # Errors
    /// Returns [`CoServerError`] per the startup taxonomy: `BornDead`
    /// with captured output when the child exited, `Unreachable` when it
    /// stayed alive without accepting a connection (the child is
    /// terminated first), and `Ghost` when the port answered but the
    /// child is gone.
    pub async fn start(options: CoServerOptions) -> Result<Self, CoServerError> {
        Self::start_with(options, Arc::new(UnixProcessController), Arc::new(NoopTelemetry)).await
    }

    /// Spawns the child with explicit controller and telemetry seams.
    ///
    /// # Errors
    /// See [`CoServer::start`].
    pub async fn start_with(
        options: CoServerOptions,
        controller: Arc<dyn ProcessController>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, CoServerError> {
        let stdout_path = options.fixture_dir.join(STDOUT_CAPTURE);
        let stderr_path = options.fixture_dir.join(STDERR_CAPTURE);
        let stdout_file = capture_file(&stdout_path)?;
        let stderr_file = capture_file(&stderr_path)?;

        let mut command = Command::new(&options.binary);
        command
            .args(&options.args)
            .current_dir(&options.fixture_dir)
            .env(CONFIG_ENV, &options.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file));
        let mut child = command.spawn().map_err(CoServerError::Spawn)?;
        let pid = child.id();
        telemetry.record(&HarnessEvent::ServerSpawned {
            pid,
        });

        let base_url = format!("http://127.0.0.1:{}", options.port);
        let budget = timeouts::resolve_timeout(
            options.readiness_timeout.unwrap_or(timeouts::READINESS_TIMEOUT),
        );
        let attempts = poll_health(&base_url, budget).await;

        let Some(attempts) = attempts else {
            return Err(startup_failure(
                &mut child,
                &controller,
                pid,
                options.port,
                &stdout_path,
                &stderr_path,
            ));
        };

        // A successful probe paired with a dead child is its own failure.
        match child.try_wait() {
            Ok(Some(_)) => {
                return Err(CoServerError::Ghost {
                    port: options.port,
                });
            }
            Ok(None) => {}
            Err(err) => return Err(CoServerError::Wait(err)),
        }

        telemetry.record(&HarnessEvent::ServerReady {
            port: options.port,
            attempts,
        });
        Ok(Self {
            child,
            pid,
            port: options.port,
            base_url,
            stdout_path,
            stderr_path,
            controller,
            stopped: false,
        })
    }

    /// Returns the child's base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the port the child serves on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the child's pid.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Reads back the captured stdout/stderr for postmortem inspection.
    #[must_use]
    pub fn captured_output(&self) -> (String, String) {
        (read_capture(&self.stdout_path), read_capture(&self.stderr_path))
    }

    /// Terminates the child: SIGTERM, bounded wait, then SIGKILL.
    ///
    /// An already-exited child is success, not an error.
    ///
    /// # Errors
    /// Returns [`CoServerError::StillRunning`] when the child survives
    /// the full shutdown ladder, or a signal/wait error from the OS.
    pub async fn stop(mut self) -> Result<(), CoServerError> {
        self.stopped = true;
        let child = &mut self.child;
        shutdown_ladder(self.controller.as_ref(), self.pid, async || {
            wait_bounded(child, timeouts::SHUTDOWN_WAIT).await
        })
        .await
    }
}

impl Drop for CoServer {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.try_wait();
    }
}

// ============================================================================
// SECTION: Shutdown Ladder
// ============================================================================

/// Runs the SIGTERM, bounded wait, SIGKILL, bounded wait escalation.
///
/// `wait_for_exit` reports whether the child exited within its bounded
/// wait; it is a parameter so the ladder can be driven with a scripted
/// controller and no live process. A child that is already gone at any
/// step is success, not an error.
async fn shutdown_ladder<W>(
    controller: &dyn ProcessController,
    pid: u32,
    mut wait_for_exit: W,
) -> Result<(), CoServerError>
where
    W: AsyncFnMut() -> Result<bool, CoServerError>,
{
    match controller.check_process(pid) {
        Ok(ProcessStatus::NotFound) => return Ok(()),
        Ok(_) => {}
        Err(err) => return Err(CoServerError::Signal(err)),
    }
    match controller.send_signal(pid, Signal::Term) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(CoServerError::Signal(err)),
    }
    if wait_for_exit().await? {
        return Ok(());
    }
    match controller.send_signal(pid, Signal::Kill) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(CoServerError::Signal(err)),
    }
    if wait_for_exit().await? {
        return Ok(());
    }
    // Accepted limitation: the leak is reported, never waited on
    // indefinitely.
    Err(CoServerError::StillRunning {
        pid,
    })
}

// ============================================================================
// SECTION: Startup Internals
// ============================================================================

/// Creates one capture file, truncating a previous run's leftovers.
fn capture_file(path: &Path) -> Result<std::fs::File, CoServerError> {
    let mut file = std::fs::File::create(path).map_err(|source| CoServerError::Capture {
        path: path.to_path_buf(),
        source,
    })?;
    file.flush().map_err(|source| CoServerError::Capture {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file)
}

/// Polls the health path until any HTTP response arrives.
///
/// Returns the number of attempts on success, or `None` when the budget
/// is exhausted without a response.
async fn poll_health(base_url: &str, budget: Duration) -> Option<u32> {
    let client = reqwest::Client::builder()
        .timeout(timeouts::HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    let url = format!("{base_url}{HEALTH_PATH}");
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts = attempts.saturating_add(1);
        if client.get(&url).send().await.is_ok() {
            return Some(attempts);
        }
        if start.elapsed() > budget {
            return None;
        }
        sleep(timeouts::READINESS_INTERVAL).await;
    }
}

/// Classifies a failed startup and cleans up the child.
fn startup_failure(
    child: &mut Child,
    controller: &Arc<dyn ProcessController>,
    pid: u32,
    port: u16,
    stdout_path: &Path,
    stderr_path: &Path,
) -> CoServerError {
    match child.try_wait() {
        Ok(Some(_)) => CoServerError::BornDead {
            stdout: read_capture(stdout_path),
            stderr: read_capture(stderr_path),
        },
        _ => {
            // Still running but never reachable: terminate forcibly and
            // reap with a bounded wait before failing.
            let _ = controller.send_signal(pid, Signal::Kill);
            let deadline = Instant::now() + timeouts::SHUTDOWN_WAIT;
            while Instant::now() < deadline {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    break;
                }
                std::thread::sleep(timeouts::SHUTDOWN_POLL);
            }
            CoServerError::Unreachable {
                port,
            }
        }
    }
}

/// Reads a capture file, substituting a marker when unreadable.
fn read_capture(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|_| "<capture unavailable>".to_string())
}

/// Polls `try_wait` until exit or the bounded deadline.
async fn wait_bounded(child: &mut Child, budget: Duration) -> Result<bool, CoServerError> {
    let deadline = Instant::now() + budget;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return Ok(true),
            Ok(None) => {}
            Err(err) => return Err(CoServerError::Wait(err)),
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(timeouts::SHUTDOWN_POLL).await;
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
