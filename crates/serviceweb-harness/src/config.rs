// crates/serviceweb-harness/src/config.rs
// ============================================================================
// Module: Service Configuration
// Description: Typed on-disk configuration for both services under test.
// Purpose: Load and validate the serviceweb and servicebook config files.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Two configuration files exist in the fixture directory: one for the
//! serviceweb frontend and one for the upstream servicebook service the
//! harness spawns. Both are TOML, loaded into typed structures and
//! validated before use. Loading fails closed on unknown or missing
//! fields rather than guessing defaults.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned while loading service configuration.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for the expected schema.
    #[error("failed to parse config {path}: {message}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// A field value failed validation.
    #[error("invalid config {path}: {message}")]
    Invalid {
        /// Path of the config file.
        path: PathBuf,
        /// Validation diagnostic.
        message: String,
    },
}

// ============================================================================
// SECTION: Servicebook Config
// ============================================================================

/// Configuration for the spawned servicebook process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServicebookConfig {
    /// Loopback port the server listens on.
    pub port: u16,
    /// Path to the fixture database file, relative to the working
    /// directory the server was started in.
    pub database: PathBuf,
}

impl ServicebookConfig {
    /// Loads and validates a servicebook config file.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file is unreadable, unparsable,
    /// or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_toml(path)?;
        if config.port == 0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: "port must be non-zero".to_string(),
            });
        }
        Ok(config)
    }
}

// ============================================================================
// SECTION: Serviceweb Config
// ============================================================================

/// Configuration for the serviceweb frontend under test.
///
/// # Invariants
/// - All base URLs are non-empty; tests point them at the interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServicewebConfig {
    /// OAuth client id presented to the identity provider.
    pub client_id: String,
    /// Base URL of the identity provider.
    pub idp_url: String,
    /// Base URL of the bug-tracker search API.
    pub bugzilla_url: String,
    /// Base URL of the generic search-index API.
    pub search_url: String,
    /// Base URL of the upstream servicebook API.
    pub book_url: String,
}

impl ServicewebConfig {
    /// Loads and validates a serviceweb config file.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file is unreadable, unparsable,
    /// or any base URL is empty.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_toml(path)?;
        let urls = [
            ("idp_url", &config.idp_url),
            ("bugzilla_url", &config.bugzilla_url),
            ("search_url", &config.search_url),
            ("book_url", &config.book_url),
        ];
        for (field, value) in urls {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    path: path.to_path_buf(),
                    message: format!("{field} must not be empty"),
                });
            }
        }
        Ok(config)
    }
}

/// Reads and deserializes a TOML file.
fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
