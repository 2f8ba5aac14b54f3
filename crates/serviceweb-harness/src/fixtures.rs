// crates/serviceweb-harness/src/fixtures.rs
// ============================================================================
// Module: Fixture Guard
// Description: Copy-aside/restore discipline for on-disk test fixtures.
// Purpose: Guarantee tests never permanently mutate shared fixture files.
// Dependencies: serde_yaml, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Config files and the fixture database are copied aside before each
//! test and restored afterwards, so a failed test never leaves modified
//! fixtures behind for the next one. Restoration runs on [`Drop`] as
//! well as through the explicit [`FixtureGuard::restore`] path.
//!
//! Invariants:
//! - After restore, guarded files are byte-identical to the pre-test
//!   saved copies.
//! - The saved copy lives next to the original with a `.saved` suffix.

use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

/// Suffix appended to a guarded file's saved copy.
const SAVED_SUFFIX: &str = ".saved";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by fixture handling.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// A fixture file could not be copied, read, or written.
    #[error("fixture io failure on {path}: {source}")]
    Io {
        /// Path the operation failed on.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// A YAML fixture document failed to parse.
    #[error("invalid yaml fixture {path}: {message}")]
    Yaml {
        /// Path of the fixture document.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
}

impl FixtureError {
    /// Wraps an IO error with the path it occurred on.
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ============================================================================
// SECTION: Fixture Guard
// ============================================================================

/// Guard that saves fixture files on creation and restores them on exit.
#[derive(Debug)]
pub struct FixtureGuard {
    /// Original path and saved-copy path for each guarded file.
    entries: Vec<(PathBuf, PathBuf)>,
    /// Whether the explicit restore path already ran.
    restored: bool,
}

impl FixtureGuard {
    /// Copies each file aside and returns the guard.
    ///
    /// # Errors
    /// Returns [`FixtureError::Io`] when any copy fails; files saved
    /// before the failure are restored by the guard being dropped.
    pub fn save(paths: &[PathBuf]) -> Result<Self, FixtureError> {
        let mut guard = Self {
            entries: Vec::with_capacity(paths.len()),
            restored: false,
        };
        for path in paths {
            let saved = saved_path(path);
            std::fs::copy(path, &saved).map_err(|source| FixtureError::io(path, source))?;
            guard.entries.push((path.clone(), saved));
        }
        Ok(guard)
    }

    /// Restores every guarded file and removes the saved copies.
    ///
    /// # Errors
    /// Returns the first [`FixtureError::Io`] encountered; remaining
    /// files are still restored best-effort.
    pub fn restore(mut self) -> Result<(), FixtureError> {
        self.restored = true;
        let mut first_error = None;
        for (original, saved) in &self.entries {
            if let Err(source) = restore_one(original, saved) {
                if first_error.is_none() {
                    first_error = Some(FixtureError::io(original, source));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for FixtureGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        for (original, saved) in &self.entries {
            let _ = restore_one(original, saved);
        }
    }
}

/// Copies one saved file back over its original and removes the copy.
fn restore_one(original: &Path, saved: &Path) -> std::io::Result<()> {
    std::fs::copy(saved, original)?;
    std::fs::remove_file(saved)
}

/// Returns the saved-copy path for a guarded file.
fn saved_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(SAVED_SUFFIX);
    PathBuf::from(name)
}

// ============================================================================
// SECTION: Templating and YAML Fixtures
// ============================================================================

/// Rewrites a config file in place, replacing `{key}` placeholders.
///
/// Fixture configs carry placeholders for values only known at test
/// time, such as the database path and the allocated port.
///
/// # Errors
/// Returns [`FixtureError::Io`] when the file cannot be read or written.
pub fn render_placeholder(path: &Path, key: &str, value: &str) -> Result<(), FixtureError> {
    let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::io(path, source))?;
    let rendered = raw.replace(&format!("{{{key}}}"), value);
    std::fs::write(path, rendered).map_err(|source| FixtureError::io(path, source))
}

/// Loads a YAML fixture document describing canned API responses.
///
/// # Errors
/// Returns [`FixtureError`] when the file is unreadable or not valid
/// YAML.
pub fn load_yaml_fixture(path: &Path) -> Result<serde_json::Value, FixtureError> {
    let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::io(path, source))?;
    serde_yaml::from_str(&raw).map_err(|err| FixtureError::Yaml {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
