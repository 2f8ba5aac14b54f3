// system-tests/tests/suites/browsing.rs
// ============================================================================
// Module: Anonymous Browsing Tests
// Description: Page navigation over a real backend, signed out.
// Purpose: Verify the frontend renders live servicebook data end to end.
// Dependencies: helpers, serviceweb-harness, system-tests
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::sync::Arc;

use serviceweb_harness::SharedSession;
use system_tests::testapp::TestApp;

use crate::helpers::html;
use crate::helpers::infra;

/// Backend plus anonymous frontend, staged in one scratch directory.
struct Browser {
    _dir: infra::ScratchDir,
    backend: serviceweb_harness::CoServer,
    app: TestApp,
}

impl Browser {
    async fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = infra::ScratchDir::new()?;
        let backend = infra::start_backend(dir.path()).await?;
        let config = infra::browsing_config(backend.base_url());
        let app = TestApp::spawn(config, Arc::new(SharedSession::new())).await?;
        Ok(Self {
            _dir: dir,
            backend,
            app,
        })
    }

    async fn get(&self, path: &str) -> Result<String, Box<dyn std::error::Error>> {
        let response = reqwest::get(format!("{}{path}", self.app.base_url())).await?;
        assert_eq!(response.status().as_u16(), 200, "unexpected status for {path}");
        Ok(response.text().await?)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn info_page_first_project_link_leads_to_its_team() -> Result<(), Box<dyn std::error::Error>>
{
    let browser = Browser::open().await?;

    let info = browser.get("/info").await?;
    let links = html::links(&info)?;
    // Three nav anchors precede the project listing.
    assert_eq!(links.len(), 6, "expected 3 nav links plus 3 project links");
    let first_project = links[3].clone();
    assert_eq!(first_project.text, "Socorro");

    let project = browser.get(&first_project.href).await?;
    assert!(project.contains("Rebecca"), "project team should list Rebecca");

    browser.backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn user_links_walk_to_their_other_projects() -> Result<(), Box<dyn std::error::Error>> {
    let browser = Browser::open().await?;

    let project = browser.get("/projects/33").await?;
    let karl = html::link_with_text(&project, "Karl")?;
    let user = browser.get(&karl).await?;
    assert!(user.contains("ABSearch"), "Karl's page should list ABSearch");

    browser.backend.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn group_page_lists_member_projects() -> Result<(), Box<dyn std::error::Error>> {
    let browser = Browser::open().await?;

    let group = browser.get("/groups/Customization").await?;
    assert!(group.contains("Telemetry"), "Customization group should list Telemetry");

    let missing =
        reqwest::get(format!("{}/groups/NoSuchGroup", browser.app.base_url())).await?;
    assert_eq!(missing.status().as_u16(), 404);

    browser.backend.stop().await?;
    Ok(())
}
