// system-tests/tests/suites/coserver.rs
// ============================================================================
// Module: Server Harness Tests
// Description: Lifecycle coverage for the spawned servicebook process.
// Purpose: Verify startup, serving, diagnostics, and fixture restoration.
// Dependencies: helpers, serviceweb-harness, system-tests
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::sync::Arc;

use serde_json::Value;
use serviceweb_harness::CoServer;
use serviceweb_harness::CoServerError;
use serviceweb_harness::CoServerOptions;
use serviceweb_harness::FixtureGuard;
use serviceweb_harness::fixtures::render_placeholder;
use serviceweb_harness::process::UnixProcessController;
use serviceweb_harness::telemetry::HarnessEvent;
use serviceweb_harness::telemetry::RecordingTelemetry;
use serviceweb_harness::telemetry::TelemetrySink;

use crate::helpers::infra;

#[tokio::test(flavor = "multi_thread")]
async fn backend_starts_serves_and_stops_cleanly() -> Result<(), Box<dyn std::error::Error>> {
    let dir = infra::ScratchDir::new()?;
    let backend = infra::start_backend(dir.path()).await?;

    let heartbeat: Value =
        reqwest::get(format!("{}/api/", backend.base_url())).await?.json().await?;
    assert_eq!(heartbeat["status"], "running");

    let listing: Value =
        reqwest::get(format!("{}/api/project", backend.base_url())).await?.json().await?;
    let projects = listing["projects"].as_array().expect("projects array");
    assert_eq!(projects.len(), 3);

    backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn startup_records_spawn_and_readiness_events() -> Result<(), Box<dyn std::error::Error>> {
    let dir = infra::ScratchDir::new()?;
    let staged = infra::stage_backend(dir.path())?;
    let options = CoServerOptions::new(
        std::path::PathBuf::from(env!("CARGO_BIN_EXE_servicebook_server")),
        staged.config_path,
        dir.path().to_path_buf(),
    )
    .with_port(staged.port);

    let telemetry = Arc::new(RecordingTelemetry::new());
    let backend =
        CoServer::start_with(
            options,
            Arc::new(UnixProcessController),
            Arc::clone(&telemetry) as Arc<dyn TelemetrySink>,
        )
            .await?;

    let events = telemetry.events();
    assert!(matches!(events.first(), Some(HarnessEvent::ServerSpawned { .. })));
    assert!(events.iter().any(|event| matches!(
        event,
        HarnessEvent::ServerReady { port, attempts } if *port == staged.port && *attempts >= 1
    )));

    backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_database_is_born_dead_with_diagnostics()
-> Result<(), Box<dyn std::error::Error>> {
    let dir = infra::ScratchDir::new()?;
    let staged = infra::stage_backend(dir.path())?;
    // Point the config at a database that does not exist; the child will
    // report the failure on stderr and exit before serving.
    std::fs::remove_file(&staged.db_path)?;

    let options = CoServerOptions::new(
        std::path::PathBuf::from(env!("CARGO_BIN_EXE_servicebook_server")),
        staged.config_path,
        dir.path().to_path_buf(),
    )
    .with_port(staged.port);

    let err = match CoServer::start(options).await {
        Err(err) => err,
        Ok(_) => panic!("expected startup failure"),
    };
    match err {
        CoServerError::BornDead {
            stderr, ..
        } => assert!(stderr.contains("database load failed")),
        other => panic!("expected BornDead, got {other}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn misrendered_config_is_born_dead() -> Result<(), Box<dyn std::error::Error>> {
    let dir = infra::ScratchDir::new()?;
    let root = infra::fixture_root()?;
    let config_path = dir.path().join(infra::BOOK_CONFIG_FILE);
    std::fs::copy(root.join(infra::BOOK_CONFIG_FILE), &config_path)?;
    std::fs::copy(root.join(infra::DB_FILE), dir.path().join(infra::DB_FILE))?;
    // Only the db placeholder is rendered; the port stays as `{port}`,
    // which is not valid TOML for the schema.
    render_placeholder(&config_path, "db", infra::DB_FILE)?;

    let options = CoServerOptions::new(
        std::path::PathBuf::from(env!("CARGO_BIN_EXE_servicebook_server")),
        config_path,
        dir.path().to_path_buf(),
    )
    .with_port(infra::allocate_port()?);

    let err = match CoServer::start(options).await {
        Err(err) => err,
        Ok(_) => panic!("expected startup failure"),
    };
    match err {
        CoServerError::BornDead {
            stderr, ..
        } => assert!(stderr.contains("config load failed")),
        other => panic!("expected BornDead, got {other}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn guarded_fixtures_are_restored_byte_identical() -> Result<(), Box<dyn std::error::Error>> {
    let dir = infra::ScratchDir::new()?;
    let staged = infra::stage_backend(dir.path())?;
    let pristine = std::fs::read(&staged.db_path)?;

    let guard = FixtureGuard::save(&[staged.db_path.clone()])?;
    std::fs::write(&staged.db_path, b"{\"projects\": [], \"users\": [], \"groups\": []}")?;
    guard.restore()?;

    assert_eq!(std::fs::read(&staged.db_path)?, pristine);
    Ok(())
}

#[test]
fn kept_scratch_directories_survive_their_guard() -> Result<(), Box<dyn std::error::Error>> {
    let kept = infra::ScratchDir::with_retention(true)?;
    let kept_path = kept.path().to_path_buf();
    std::fs::write(kept_path.join("coserver.stderr"), "postmortem")?;
    drop(kept);
    assert!(kept_path.join("coserver.stderr").exists());
    std::fs::remove_dir_all(&kept_path)?;

    let scratch = infra::ScratchDir::with_retention(false)?;
    let scratch_path = scratch.path().to_path_buf();
    drop(scratch);
    assert!(!scratch_path.exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_records_are_not_found_without_crashing()
-> Result<(), Box<dyn std::error::Error>> {
    let dir = infra::ScratchDir::new()?;
    let backend = infra::start_backend(dir.path()).await?;

    let missing = reqwest::get(format!("{}/api/project/999", backend.base_url())).await?;
    assert_eq!(missing.status().as_u16(), 404);

    // The miss did not take the server down.
    let heartbeat = reqwest::get(format!("{}/api/", backend.base_url())).await?;
    assert_eq!(heartbeat.status().as_u16(), 200);

    backend.stop().await?;
    Ok(())
}
