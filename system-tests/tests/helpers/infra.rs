// system-tests/tests/helpers/infra.rs
// ============================================================================
// Module: System Test Infrastructure
// Description: Backend staging and frontend wiring for system-tests.
// Purpose: Bring up one isolated servicebook plus frontend per test.
// Dependencies: serviceweb-harness, system-tests, tempfile
// ============================================================================

//! ## Overview
//! Backend staging and frontend wiring for system-tests. Each test stages
//! its own copy of the fixture files in a temporary directory, renders
//! the placeholder config values, and spawns an isolated servicebook
//! instance on a freshly allocated loopback port.

use std::path::Path;
use std::path::PathBuf;

use serviceweb_harness::CoServer;
use serviceweb_harness::CoServerOptions;
use serviceweb_harness::config::ServicewebConfig;
use serviceweb_harness::fixtures::render_placeholder;
use system_tests::config::SystemTestConfig;

/// Fixture database file name inside the staged directory.
pub const DB_FILE: &str = "projects.json";

/// Servicebook config file name inside the staged directory.
pub const BOOK_CONFIG_FILE: &str = "servicebook.toml";

/// Serviceweb config file name inside the staged directory.
pub const WEB_CONFIG_FILE: &str = "serviceweb.toml";

/// A staged servicebook fixture directory, ready to spawn from.
pub struct StagedBackend {
    /// Rendered servicebook config path.
    pub config_path: PathBuf,
    /// Staged database path.
    pub db_path: PathBuf,
    /// Port allocated for this instance.
    pub port: u16,
}

/// Per-test scratch directory.
///
/// Deleted on drop unless artifact retention is requested, in which case
/// the directory (capture files included) survives for postmortems.
pub struct ScratchDir {
    /// Directory path, valid for the guard's lifetime.
    path: PathBuf,
    /// Deletion handle; `None` when artifacts are kept.
    _temp: Option<tempfile::TempDir>,
}

impl ScratchDir {
    /// Creates a scratch directory honoring the keep-artifacts setting.
    pub fn new() -> Result<Self, String> {
        let config = SystemTestConfig::load()?;
        Self::with_retention(config.keep_artifacts)
    }

    /// Creates a scratch directory with explicit retention.
    pub fn with_retention(keep: bool) -> Result<Self, String> {
        let temp =
            tempfile::TempDir::new().map_err(|err| format!("scratch dir failed: {err}"))?;
        if keep {
            Ok(Self {
                path: temp.into_path(),
                _temp: None,
            })
        } else {
            Ok(Self {
                path: temp.path().to_path_buf(),
                _temp: Some(temp),
            })
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Returns the fixture source directory, honoring the env override.
pub fn fixture_root() -> Result<PathBuf, String> {
    let config = SystemTestConfig::load()?;
    Ok(config
        .fixture_root
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")))
}

/// Allocates an ephemeral loopback port.
///
/// The listener is dropped before the child binds; the window between
/// the two is small enough in practice for test isolation.
pub fn allocate_port() -> Result<u16, String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("port allocation failed: {err}"))?;
    let port =
        listener.local_addr().map_err(|err| format!("port allocation failed: {err}"))?.port();
    Ok(port)
}

/// Copies the servicebook fixtures into `dir` and renders the config.
pub fn stage_backend(dir: &Path) -> Result<StagedBackend, String> {
    let root = fixture_root()?;
    let config_path = dir.join(BOOK_CONFIG_FILE);
    let db_path = dir.join(DB_FILE);
    copy_fixture(&root.join(BOOK_CONFIG_FILE), &config_path)?;
    copy_fixture(&root.join(DB_FILE), &db_path)?;

    let port = allocate_port()?;
    render_placeholder(&config_path, "port", &port.to_string())
        .map_err(|err| format!("config render failed: {err}"))?;
    render_placeholder(&config_path, "db", DB_FILE)
        .map_err(|err| format!("config render failed: {err}"))?;
    Ok(StagedBackend {
        config_path,
        db_path,
        port,
    })
}

/// Stages the fixtures and spawns a reachable servicebook instance.
pub async fn start_backend(dir: &Path) -> Result<CoServer, String> {
    let staged = stage_backend(dir)?;
    let options = CoServerOptions::new(
        PathBuf::from(env!("CARGO_BIN_EXE_servicebook_server")),
        staged.config_path,
        dir.to_path_buf(),
    )
    .with_port(staged.port);
    CoServer::start(options).await.map_err(|err| format!("backend start failed: {err}"))
}

/// Builds a frontend config for anonymous browsing.
///
/// The outbound provider URLs point at a closed loopback port; browsing
/// pages never call them, and a regression that does fails fast.
pub fn browsing_config(book_url: &str) -> ServicewebConfig {
    ServicewebConfig {
        client_id: "serviceweb-tests".to_string(),
        idp_url: "http://127.0.0.1:9".to_string(),
        bugzilla_url: "http://127.0.0.1:9".to_string(),
        search_url: "http://127.0.0.1:9".to_string(),
        book_url: book_url.to_string(),
    }
}

/// Stages the serviceweb config fixture, renders every URL placeholder,
/// and loads it back through the typed config path.
pub fn stage_frontend_config(
    dir: &Path,
    book_url: &str,
    idp_url: &str,
    bugzilla_url: &str,
    search_url: &str,
) -> Result<ServicewebConfig, String> {
    let root = fixture_root()?;
    let config_path = dir.join(WEB_CONFIG_FILE);
    copy_fixture(&root.join(WEB_CONFIG_FILE), &config_path)?;
    for (key, value) in [
        ("idp", idp_url),
        ("bugzilla", bugzilla_url),
        ("search", search_url),
        ("book", book_url),
    ] {
        render_placeholder(&config_path, key, value)
            .map_err(|err| format!("config render failed: {err}"))?;
    }
    ServicewebConfig::load(&config_path).map_err(|err| format!("config load failed: {err}"))
}

/// Copies one fixture file, with a readable diagnostic on failure.
fn copy_fixture(from: &Path, to: &Path) -> Result<(), String> {
    std::fs::copy(from, to)
        .map(|_| ())
        .map_err(|err| format!("failed to stage {}: {err}", from.display()))
}
