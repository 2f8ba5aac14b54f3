// system-tests/tests/suites/login.rs
// ============================================================================
// Module: Simulated Login Tests
// Description: The full auth dance over a real backend and mocked providers.
// Purpose: Verify identity-dependent pages end to end, fully offline.
// Dependencies: helpers, serviceweb-harness, system-tests
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::sync::Arc;

use serde_json::json;
use serviceweb_harness::CannedResponse;
use serviceweb_harness::CoServer;
use serviceweb_harness::LoginFlow;
use serviceweb_harness::LoginFlowBuilder;
use serviceweb_harness::MockRule;
use serviceweb_harness::SharedSession;
use serviceweb_harness::ShadowSession;
use serviceweb_harness::fixtures::load_yaml_fixture;
use serviceweb_harness::login::CANNED_NAME;
use serviceweb_harness::login::LoginError;
use serviceweb_harness::session::SessionStore;
use system_tests::testapp::TestApp;

use crate::helpers::infra;

/// Backend and frontend staged in one scratch directory.
///
/// The armed flow is handed back separately because the logged-in scope
/// consumes it.
struct LoginEnv {
    _dir: infra::ScratchDir,
    backend: CoServer,
    shadow: Arc<ShadowSession>,
    app: TestApp,
}

impl LoginEnv {
    async fn arm<F>(tweak: F) -> Result<(Self, LoginFlow), Box<dyn std::error::Error>>
    where
        F: FnOnce(LoginFlowBuilder) -> LoginFlowBuilder,
    {
        let dir = infra::ScratchDir::new()?;
        let backend = infra::start_backend(dir.path()).await?;
        let shadow = Arc::new(ShadowSession::new(Arc::new(SharedSession::new())));
        let flow = tweak(LoginFlow::builder(Arc::clone(&shadow))).arm()?;
        let config = infra::stage_frontend_config(
            dir.path(),
            backend.base_url(),
            &flow.idp_url(),
            &flow.bugzilla_url(),
            &flow.search_url(),
        )?;
        let app = TestApp::spawn(config, Arc::clone(&shadow) as Arc<dyn SessionStore>).await?;
        let env = Self {
            _dir: dir,
            backend,
            shadow,
            app,
        };
        Ok((env, flow))
    }

    async fn get(&self, path: &str) -> Result<String, String> {
        let response = reqwest::get(format!("{}{path}", self.app.base_url()))
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("unexpected status {} for {path}", response.status()));
        }
        response.text().await.map_err(|err| err.to_string())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn signed_in_home_shows_the_canned_identity() -> Result<(), Box<dyn std::error::Error>> {
    let (env, flow) = LoginEnv::arm(|builder| builder).await?;

    flow.with_login(env.app.base_url(), async || {
        let home = env.get("/").await?;
        if !home.contains(CANNED_NAME) {
            return Err(format!("home page does not greet {CANNED_NAME}"));
        }
        Ok(())
    })
    .await?;

    // Logout ran on scope exit; the home page is anonymous again.
    assert_eq!(env.app.logouts(), 1);
    let home = env.get("/").await?;
    assert!(home.contains("Sign in"));

    env.backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn project_page_counts_bugs_from_the_mocked_tracker()
-> Result<(), Box<dyn std::error::Error>> {
    let (env, flow) = LoginEnv::arm(|builder| builder).await?;

    flow.with_login(env.app.base_url(), async || {
        let project = env.get("/projects/33").await?;
        if !project.contains("0 open bugs") {
            return Err("signed-in project page should show the mocked bug count".to_string());
        }
        Ok(())
    })
    .await?;

    // Anonymous visits skip the bug tracker entirely.
    let project = env.get("/projects/33").await?;
    assert!(!project.contains("open bugs"));

    env.backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn state_nonce_is_consumed_and_logout_clears_the_identity()
-> Result<(), Box<dyn std::error::Error>> {
    let (env, flow) = LoginEnv::arm(|builder| builder).await?;

    flow.login(env.app.base_url()).await?;
    // The callback popped the nonce, which removes it from the shadow too.
    assert!(env.shadow.recorded("state").is_none());
    let home = env.get("/").await?;
    assert!(home.contains(CANNED_NAME));

    flow.logout(env.app.base_url()).await?;
    let home = env.get("/").await?;
    assert!(home.contains("Sign in"));

    env.backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn caller_failure_still_logs_out() -> Result<(), Box<dyn std::error::Error>> {
    let (env, flow) = LoginEnv::arm(|builder| builder).await?;

    let err = flow
        .with_login(env.app.base_url(), async || Err::<(), _>("page exploded".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, LoginError::Caller(message) if message == "page exploded"));
    assert_eq!(env.app.logouts(), 1, "logout must run exactly once");

    let home = env.get("/").await?;
    assert!(home.contains("Sign in"), "identity should be cleared after the failed scope");

    env.backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn extra_rules_cannot_shadow_builtin_endpoints() -> Result<(), Box<dyn std::error::Error>> {
    // A rule answering the token exchange with garbage would break the
    // callback; registration order keeps the built-in in front.
    let sabotage = MockRule::new("POST", "auth0/oauth/token", CannedResponse::text("not json"))?;
    let (env, flow) = LoginEnv::arm(|builder| builder.extra_rule(sabotage)).await?;

    flow.with_login(env.app.base_url(), async || {
        let home = env.get("/").await?;
        if !home.contains(CANNED_NAME) {
            return Err("login should have used the built-in token rule".to_string());
        }
        Ok(())
    })
    .await?;

    env.backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn search_page_renders_the_canned_yaml_fixture() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = load_yaml_fixture(&infra::fixture_root()?.join("api_search.yaml"))?;
    let (env, flow) = LoginEnv::arm(|builder| builder.search_fixture(fixture)).await?;

    flow.with_login(env.app.base_url(), async || {
        let results = env.get("/search?q=crash").await?;
        if !results.contains("Crash reports by signature") {
            return Err("search page should render the canned hits".to_string());
        }
        Ok(())
    })
    .await?;

    env.backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn appended_rule_answers_endpoints_the_builtins_leave_open()
-> Result<(), Box<dyn std::error::Error>> {
    // Counterpart to the precedence test above: a caller rule on a fresh
    // endpoint does fire, and its calls count as matched.
    let canary = MockRule::new("GET", "statusboard", CannedResponse::json(&json!({"up": true}))?)?;
    let (env, flow) = LoginEnv::arm(|builder| builder.extra_rule(canary)).await?;
    let status_url = format!("{}/statusboard/api", flow.mock().base_url());

    flow.with_login(env.app.base_url(), async || {
        let response = reqwest::get(&status_url).await.map_err(|err| err.to_string())?;
        let body: serde_json::Value = response.json().await.map_err(|err| err.to_string())?;
        if body != json!({"up": true}) {
            return Err("appended rule should answer its own endpoint".to_string());
        }
        Ok(())
    })
    .await?;

    env.backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn tracker_payload_override_changes_the_rendered_bug_count()
-> Result<(), Box<dyn std::error::Error>> {
    let payload = json!({"bugs": [
        {"id": 101, "summary": "crashes on save"},
        {"id": 102, "summary": "slow startup"},
    ]});
    let (env, flow) = LoginEnv::arm(|builder| builder.bugzilla_fixture(payload)).await?;

    flow.with_login(env.app.base_url(), async || {
        let project = env.get("/projects/33").await?;
        if !project.contains("2 open bugs") {
            return Err("project page should count the overridden tracker payload".to_string());
        }
        Ok(())
    })
    .await?;

    env.backend.stop().await?;
    Ok(())
}
