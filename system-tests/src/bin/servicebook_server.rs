// system-tests/src/bin/servicebook_server.rs
// ============================================================================
// Module: Servicebook Server
// Description: Loopback servicebook API runner for system-tests.
// Purpose: Provide a real upstream subprocess for end-to-end tests.
// Dependencies: serviceweb-harness, axum, tokio
// ============================================================================

//! Servicebook API binary for system-tests.
//!
//! Reads its config file path from the `SERVICEBOOK_CONFIG` environment
//! variable, loads the fixture database relative to its working
//! directory, and serves the read-only book API on the configured
//! loopback port until it receives SIGTERM or SIGINT.

use std::path::Path;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path as UrlPath;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::json;
use serviceweb_harness::config::ServicebookConfig;
use serviceweb_harness::coserver::CONFIG_ENV;
use system_tests::book::BookDatabase;

/// Shared read-only database handle.
type Db = Arc<BookDatabase>;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let Some(config_path) = std::env::var_os(CONFIG_ENV) else {
        eprintln!("servicebook-server: {CONFIG_ENV} is not set");
        std::process::exit(1);
    };
    let config = match ServicebookConfig::load(Path::new(&config_path)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("servicebook-server: config load failed: {err}");
            std::process::exit(1);
        }
    };
    let database = match BookDatabase::load(&config.database) {
        Ok(database) => Arc::new(database),
        Err(err) => {
            eprintln!("servicebook-server: database load failed: {err}");
            std::process::exit(1);
        }
    };

    let app = Router::new()
        .route("/api/", get(heartbeat))
        .route("/api/project", get(list_projects))
        .route("/api/project/{id}", get(get_project))
        .route("/api/user", get(list_users))
        .route("/api/user/{id}", get(get_user))
        .route("/api/group/{name}", get(get_group))
        .with_state(database);

    let bind = format!("127.0.0.1:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("servicebook-server: bind {bind} failed: {err}");
            std::process::exit(1);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        eprintln!("servicebook-server: server failed: {err}");
        std::process::exit(1);
    }
}

/// Resolves when SIGTERM or SIGINT arrives.
async fn shutdown_signal() {
    let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            eprintln!("servicebook-server: signal handler failed: {err}");
            std::process::exit(1);
        }
    };
    tokio::select! {
        _ = term.recv() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                eprintln!("servicebook-server: ctrl-c handler failed: {err}");
            }
        }
    }
}

/// Answers the readiness probe.
async fn heartbeat() -> Json<serde_json::Value> {
    Json(json!({"service": "servicebook", "status": "running"}))
}

/// Lists every project.
async fn list_projects(State(db): State<Db>) -> Json<serde_json::Value> {
    Json(json!({"projects": db.projects}))
}

/// Returns one project by id.
async fn get_project(
    State(db): State<Db>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    db.project(id).map(|project| Json(json!(project))).ok_or(StatusCode::NOT_FOUND)
}

/// Lists every user.
async fn list_users(State(db): State<Db>) -> Json<serde_json::Value> {
    Json(json!({"users": db.users}))
}

/// Returns one user by id.
async fn get_user(
    State(db): State<Db>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    db.user(&id).map(|user| Json(json!(user))).ok_or(StatusCode::NOT_FOUND)
}

/// Returns one group by name.
async fn get_group(
    State(db): State<Db>,
    UrlPath(name): UrlPath<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    db.group(&name).map(|group| Json(json!(group))).ok_or(StatusCode::NOT_FOUND)
}
