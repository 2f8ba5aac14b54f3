// system-tests/src/testapp.rs
// ============================================================================
// Module: Frontend Test Application
// Description: The serviceweb frontend double the system-tests drive.
// Purpose: Exercise the harness against a real HTTP app with real
//          outbound calls to the book API, bug tracker, search, and IDP.
// Dependencies: serviceweb-harness, axum, reqwest, rand
// ============================================================================

//! ## Overview
//! A compact rendition of the serviceweb frontend: server-rendered HTML
//! pages over the servicebook API, bug-tracker counts for signed-in
//! visitors, canned search, and the OAuth redirect/callback login dance.
//! The app holds one session per instance, handed in explicitly so the
//! harness can shadow it; there is no cookie plumbing.
//!
//! Invariants:
//! - Every outbound base URL comes from [`ServicewebConfig`]; nothing is
//!   hardcoded, so tests can point the app at the interceptor.
//! - The `state` nonce is written to the session before the authorize
//!   redirect and popped when the callback consumes it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use axum::Router;
use axum::extract::Path as UrlPath;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Redirect;
use axum::response::Response;
use axum::routing::get;
use rand::Rng as _;
use rand::distributions::Alphanumeric;
use serde_json::Value;
use serde_json::json;
use serviceweb_harness::config::ServicewebConfig;
use serviceweb_harness::session::SessionStore;
use tokio::task::JoinHandle;

use crate::book::Group;
use crate::book::Project;
use crate::book::User;

// ============================================================================
// SECTION: App Handle
// ============================================================================

/// Handle for a spawned frontend instance.
pub struct TestApp {
    /// Base URL of the loopback listener.
    base_url: String,
    /// Serve task, aborted on drop.
    handle: JoinHandle<()>,
    /// Number of times `/logout` was hit.
    logouts: Arc<AtomicUsize>,
}

impl TestApp {
    /// Spawns the frontend on an ephemeral loopback port.
    ///
    /// # Errors
    /// Returns an error when the listener cannot be bound or the HTTP
    /// client cannot be built.
    pub async fn spawn(
        config: ServicewebConfig,
        session: Arc<dyn SessionStore>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(serviceweb_harness::timeouts::HTTP_TIMEOUT)
            .build()
            .map_err(|err| format!("frontend client build failed: {err}"))?;
        let logouts = Arc::new(AtomicUsize::new(0));
        let state = AppState {
            config,
            session,
            client,
            logouts: Arc::clone(&logouts),
        };
        let app = Router::new()
            .route("/", get(home))
            .route("/login", get(login))
            .route("/auth0", get(callback))
            .route("/logout", get(logout))
            .route("/info", get(info))
            .route("/search", get(search))
            .route("/projects/{id}", get(project_page))
            .route("/users/{id}", get(user_page))
            .route("/groups/{name}", get(group_page))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|err| format!("frontend bind failed: {err}"))?;
        let addr = listener.local_addr().map_err(|err| format!("frontend addr failed: {err}"))?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self {
            base_url: format!("http://{addr}"),
            handle,
            logouts,
        })
    }

    /// Returns the frontend base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns how many times `/logout` was hit.
    #[must_use]
    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// State shared with every handler.
#[derive(Clone)]
struct AppState {
    /// Outbound base URLs and OAuth client id.
    config: ServicewebConfig,
    /// The single session of this app instance.
    session: Arc<dyn SessionStore>,
    /// Client for outbound API calls.
    client: reqwest::Client,
    /// Number of times `/logout` was hit.
    logouts: Arc<AtomicUsize>,
}

impl AppState {
    /// Fetches a JSON document from an outbound dependency.
    async fn fetch_json(&self, url: &str) -> Result<Value, StatusCode> {
        let response = self.client.get(url).send().await.map_err(|_| StatusCode::BAD_GATEWAY)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StatusCode::NOT_FOUND);
        }
        if !response.status().is_success() {
            return Err(StatusCode::BAD_GATEWAY);
        }
        response.json().await.map_err(|_| StatusCode::BAD_GATEWAY)
    }

    /// Fetches and decodes one book API record.
    async fn fetch_record<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, StatusCode> {
        let value = self.fetch_json(&format!("{}{path}", self.config.book_url)).await?;
        serde_json::from_value(value).map_err(|_| StatusCode::BAD_GATEWAY)
    }

    /// Returns the signed-in identity, if any.
    fn current_user(&self) -> Option<Value> {
        self.session.get("user")
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Wraps a body in the shared page chrome.
fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{title}</title></head><body>\
         <nav><a href=\"/\">serviceweb</a> <a href=\"/info\">Projects</a> \
         <a href=\"/search\">Search</a></nav>\
         <main>{body}</main></body></html>"
    ))
}

/// Renders a project link.
fn project_link(project: &Project) -> String {
    format!("<a href=\"/projects/{}\">{}</a>", project.id, project.name)
}

/// Renders a user link.
fn user_link(user: &User) -> String {
    format!("<a href=\"/users/{}\">{}</a>", user.id, user.name)
}

// ============================================================================
// SECTION: Pages
// ============================================================================

/// Home page; greets the signed-in user or offers the login link.
async fn home(State(state): State<AppState>) -> Html<String> {
    let body = state.current_user().map_or_else(
        || "<p><a href=\"/login\">Sign in</a></p>".to_string(),
        |user| {
            let name = user.get("name").and_then(Value::as_str).unwrap_or("someone").to_string();
            format!("<p>Signed in as {name}</p><p><a href=\"/logout\">Sign out</a></p>")
        },
    );
    page("serviceweb", &body)
}

/// Project index, linking each project.
async fn info(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    let listing = state.fetch_json(&format!("{}/api/project", state.config.book_url)).await?;
    let projects: Vec<Project> = listing
        .get("projects")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .ok_or(StatusCode::BAD_GATEWAY)?;
    let items: String = projects
        .iter()
        .map(|project| format!("<li>{} &mdash; {}</li>", project_link(project), project.description))
        .collect();
    Ok(page("Projects", &format!("<ul>{items}</ul>")))
}

/// One project: description, team, and bug count when signed in.
async fn project_page(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Html<String>, StatusCode> {
    let project: Project = state.fetch_record(&format!("/api/project/{id}")).await?;
    let mut team = String::new();
    for member in &project.team {
        let user: User = state.fetch_record(&format!("/api/user/{member}")).await?;
        team.push_str(&format!("<li>{}</li>", user_link(&user)));
    }
    let mut body = format!(
        "<h1>{}</h1><p>{}</p><h2>Team</h2><ul>{team}</ul>",
        project.name, project.description
    );
    if state.current_user().is_some() {
        let bugs = state
            .fetch_json(&format!(
                "{}/rest/bug?product={}",
                state.config.bugzilla_url, project.bz_product
            ))
            .await?;
        let count = bugs.get("bugs").and_then(Value::as_array).map_or(0, Vec::len);
        body.push_str(&format!("<p>{count} open bugs</p>"));
    }
    Ok(page(&project.name, &body))
}

/// One user and the projects they work on.
async fn user_page(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Html<String>, StatusCode> {
    let user: User = state.fetch_record(&format!("/api/user/{id}")).await?;
    let mut items = String::new();
    for project_id in &user.projects {
        let project: Project = state.fetch_record(&format!("/api/project/{project_id}")).await?;
        items.push_str(&format!("<li>{}</li>", project_link(&project)));
    }
    let body = format!("<h1>{}</h1><h2>Projects</h2><ul>{items}</ul>", user.name);
    Ok(page(&user.name, &body))
}

/// One group and the projects inside it.
async fn group_page(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
) -> Result<Html<String>, StatusCode> {
    let group: Group = state.fetch_record(&format!("/api/group/{name}")).await?;
    let mut items = String::new();
    for project_id in &group.projects {
        let project: Project = state.fetch_record(&format!("/api/project/{project_id}")).await?;
        items.push_str(&format!("<li>{}</li>", project_link(&project)));
    }
    let body = format!("<h1>{}</h1><ul>{items}</ul>", group.name);
    Ok(page(&group.name, &body))
}

/// Canned search over the external search index.
async fn search(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Html<String>, StatusCode> {
    let query = params.get("q").cloned().unwrap_or_default();
    let results = state
        .fetch_json(&format!("{}/api/v1/search?q={query}", state.config.search_url))
        .await?;
    let items: String = results
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    let title = hit.get("title").and_then(Value::as_str)?;
                    let url = hit.get("url").and_then(Value::as_str)?;
                    Some(format!("<li><a href=\"{url}\">{title}</a></li>"))
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(page("Search", &format!("<ul>{items}</ul>")))
}

// ============================================================================
// SECTION: Authentication
// ============================================================================

/// Starts the OAuth dance; writes the state nonce and redirects out.
async fn login(State(state): State<AppState>) -> Redirect {
    let nonce: String = {
        let rng = rand::thread_rng();
        rng.sample_iter(&Alphanumeric).take(24).map(char::from).collect()
    };
    state.session.set("state", json!(nonce));
    Redirect::to(&format!(
        "{}/authorize?response_type=code&client_id={}&state={nonce}",
        state.config.idp_url, state.config.client_id
    ))
}

/// OAuth callback; validates the nonce, exchanges the code, stores the
/// identity, and bounces home.
async fn callback(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let stored = state.session.pop("state").and_then(|value| match value {
        Value::String(nonce) => Some(nonce),
        _ => None,
    });
    match (stored, params.get("state")) {
        (Some(stored), Some(presented)) if stored == *presented => {}
        _ => return StatusCode::FORBIDDEN.into_response(),
    }
    let Some(code) = params.get("code") else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let token = state
        .client
        .post(format!("{}/oauth/token", state.config.idp_url))
        .json(&json!({
            "grant_type": "authorization_code",
            "client_id": state.config.client_id,
            "code": code,
        }))
        .send()
        .await;
    let token: Value = match token {
        Ok(response) => match response.json().await {
            Ok(token) => token,
            Err(_) => return StatusCode::BAD_GATEWAY.into_response(),
        },
        Err(_) => return StatusCode::BAD_GATEWAY.into_response(),
    };
    let Some(access_token) = token.get("access_token").and_then(Value::as_str) else {
        return StatusCode::BAD_GATEWAY.into_response();
    };

    let identity = state
        .client
        .post(format!("{}/userinfo", state.config.idp_url))
        .bearer_auth(access_token)
        .send()
        .await;
    let identity: Value = match identity {
        Ok(response) => match response.json().await {
            Ok(identity) => identity,
            Err(_) => return StatusCode::BAD_GATEWAY.into_response(),
        },
        Err(_) => return StatusCode::BAD_GATEWAY.into_response(),
    };

    state.session.set("user", identity);
    Redirect::to("/").into_response()
}

/// Clears the signed-in identity.
async fn logout(State(state): State<AppState>) -> Redirect {
    let _ = state.session.pop("user");
    state.logouts.fetch_add(1, Ordering::SeqCst);
    Redirect::to("/")
}
