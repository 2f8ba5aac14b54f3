// crates/serviceweb-harness/src/login.rs
// ============================================================================
// Module: Simulated Login Flow
// Description: Drive the application's real OAuth redirect/callback dance
//              against fully mocked provider endpoints.
// Purpose: Make identity-provider dependent behavior testable offline.
// Dependencies: mock, session, reqwest, url
// ============================================================================

//! ## Overview
//! The flow arms the mock interceptor with built-in rules for the four
//! provider endpoints plus the two downstream read APIs, walks the
//! application through `/login`, the authorize trampoline, and the
//! `/auth0` callback, then yields to the caller with the session
//! authenticated. On scope exit the flow always issues `/logout` and
//! surfaces any unmatched strict-mode calls recorded while armed.
//!
//! Invariants:
//! - Built-in rules are registered before caller extras, so caller rules
//!   can never shadow the provider endpoints (first match wins). The
//!   downstream payloads are changed through the builder overrides, not
//!   through extra rules.
//! - [`LoginFlow::with_login`] consumes the flow; the interceptor is
//!   disarmed when the scope ends.
//! - Logout runs exactly once per successful login, whether the caller's
//!   closure succeeded or failed; the caller's error wins over teardown
//!   noise.
//! - Nesting two flows concurrently in one process is unsupported.

use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::mock::CannedResponse;
use crate::mock::MockError;
use crate::mock::MockMode;
use crate::mock::MockRegistry;
use crate::mock::MockRule;
use crate::mock::MockServer;
use crate::session::ShadowSession;
use crate::telemetry::HarnessEvent;
use crate::telemetry::NoopTelemetry;
use crate::telemetry::TelemetrySink;
use crate::timeouts;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed opaque authorization code presented to the callback endpoint.
pub const AUTH_CODE: &str = "grant-ok";

/// Session key the application stores its OAuth nonce under.
pub const STATE_KEY: &str = "state";

/// Canned access token returned by the mocked token exchange.
pub const CANNED_TOKEN: &str = "token-abc123";

/// Canned identity login returned by the mocked user-info lookup.
pub const CANNED_LOGIN: &str = "devuser";

/// Canned identity email returned by the mocked user-info lookup.
pub const CANNED_EMAIL: &str = "dev@serviceweb.test";

/// Canned identity display name returned by the mocked user-info lookup.
pub const CANNED_NAME: &str = "Dev User";

/// Path prefix the identity provider is mounted under on the interceptor.
pub const IDP_PREFIX: &str = "/auth0";

/// Path prefix the bug tracker is mounted under on the interceptor.
pub const BUGZILLA_PREFIX: &str = "/bugzilla";

/// Path prefix the search API is mounted under on the interceptor.
pub const SEARCH_PREFIX: &str = "/search";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by the simulated login flow.
///
/// # Invariants
/// - Variants are stable for programmatic handling. A missing session
///   key signals a broken authentication contract in the application
///   under test, not a harness bug.
#[derive(Debug, Error)]
pub enum LoginError {
    /// Mock construction or serving failed.
    #[error("mock failure: {0}")]
    Mock(#[from] MockError),
    /// An HTTP request to the application failed at the transport level.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    /// The flow's HTTP client could not be built.
    #[error("client construction failed: {0}")]
    Client(String),
    /// An endpoint expected to redirect did not.
    #[error("{endpoint} did not respond with a redirect")]
    MissingRedirect {
        /// Application endpoint that failed the contract.
        endpoint: String,
    },
    /// A redirect location could not be resolved into a URL.
    #[error("unresolvable redirect location {location:?}")]
    InvalidLocation {
        /// The offending location header value.
        location: String,
    },
    /// The session did not expose the expected key after the redirect.
    #[error("session key {0:?} was not written during the login redirect")]
    MissingSessionKey(String),
    /// The session key exists but is not a string value.
    #[error("session key {key:?} does not hold a string value")]
    InvalidSessionValue {
        /// The offending session key.
        key: String,
    },
    /// The caller's closure reported a failure.
    #[error("logged-in scope failed: {0}")]
    Caller(String),
    /// Logout or disarm failed after the caller's scope.
    #[error("teardown failure: {0}")]
    Teardown(String),
    /// Strict-mode calls were intercepted that no rule matched.
    #[error("{count} unmatched outbound call(s) during armed window, first: {first}")]
    UnmatchedCalls {
        /// Number of unmatched calls.
        count: usize,
        /// First unmatched call, as `VERB target`.
        first: String,
    },
}

// ============================================================================
// SECTION: Built-in Rules
// ============================================================================

/// Canned identity payload returned by the mocked user-info endpoint.
#[must_use]
pub fn canned_identity() -> Value {
    json!({
        "email": CANNED_EMAIL,
        "login": CANNED_LOGIN,
        "name": CANNED_NAME,
    })
}

/// Default bug-tracker payload when no override is configured.
#[must_use]
pub fn empty_bug_list() -> Value {
    json!({"bugs": []})
}

/// Builds the built-in provider and downstream rules, in contract order.
///
/// The downstream payloads are parameters so the builder overrides flow
/// through; the provider endpoints are always canned.
///
/// # Errors
/// Returns [`MockError`] when a built-in body fails to serialize; the
/// patterns themselves are static and always compile.
pub fn builtin_rules(
    bugzilla_fixture: &Value,
    search_fixture: &Value,
) -> Result<Vec<MockRule>, MockError> {
    let token = json!({"access_token": CANNED_TOKEN, "token_type": "bearer"});
    Ok(vec![
        MockRule::new("POST", "auth0/oauth/token", CannedResponse::json(&token)?)?,
        MockRule::new("POST", "auth0/userinfo", CannedResponse::json(&canned_identity())?)?,
        MockRule::new("GET", "auth0/authorize", CannedResponse::json(&json!({}))?)?,
        MockRule::new("GET", "bugzilla", CannedResponse::json(bugzilla_fixture)?)?,
        MockRule::new("GET", "search", CannedResponse::json(search_fixture)?)?,
    ])
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for an armed login flow.
pub struct LoginFlowBuilder {
    /// Shadowed session store shared with the application under test.
    shadow: Arc<ShadowSession>,
    /// Canned payload for the mocked bug-tracker search.
    bugzilla_fixture: Value,
    /// Canned document for the mocked search API.
    search_fixture: Value,
    /// Caller rules appended after the built-ins.
    extras: Vec<MockRule>,
    /// Unmatched-call behavior for the armed window.
    mode: MockMode,
    /// Event sink.
    telemetry: Arc<dyn TelemetrySink>,
}

impl LoginFlowBuilder {
    /// Overrides the canned bug-tracker payload (default: no bugs).
    ///
    /// The built-in bug-tracker rule always answers first, so this is
    /// the supported way to change what it replays.
    #[must_use]
    pub fn bugzilla_fixture(mut self, fixture: Value) -> Self {
        self.bugzilla_fixture = fixture;
        self
    }

    /// Overrides the canned search-API document (default: empty object).
    #[must_use]
    pub fn search_fixture(mut self, fixture: Value) -> Self {
        self.search_fixture = fixture;
        self
    }

    /// Appends a caller rule after the built-ins.
    #[must_use]
    pub fn extra_rule(mut self, rule: MockRule) -> Self {
        self.extras.push(rule);
        self
    }

    /// Appends caller rules after the built-ins, preserving their order.
    #[must_use]
    pub fn extra_rules(mut self, rules: Vec<MockRule>) -> Self {
        self.extras.extend(rules);
        self
    }

    /// Switches unmatched calls to passthrough against a real base URL.
    #[must_use]
    pub fn passthrough(mut self, base_url: impl Into<String>) -> Self {
        self.mode = MockMode::Passthrough {
            base_url: base_url.into(),
        };
        self
    }

    /// Installs an event sink.
    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Arms interception and returns the flow.
    ///
    /// # Errors
    /// Returns [`LoginError::Mock`] when a rule fails to build or the
    /// interceptor cannot start.
    pub fn arm(self) -> Result<LoginFlow, LoginError> {
        let mut registry = MockRegistry::new();
        for rule in builtin_rules(&self.bugzilla_fixture, &self.search_fixture)? {
            registry.push(rule);
        }
        for rule in self.extras {
            registry.push(rule);
        }
        let strict = self.mode == MockMode::Strict;
        let mock = MockServer::start(registry, self.mode, Arc::clone(&self.telemetry))?;
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeouts::HTTP_TIMEOUT)
            .build()
            .map_err(|err| LoginError::Client(err.to_string()))?;
        self.shadow.reset();
        Ok(LoginFlow {
            client,
            mock,
            shadow: self.shadow,
            strict,
            telemetry: self.telemetry,
        })
    }
}

// ============================================================================
// SECTION: Flow
// ============================================================================

/// Armed login flow; interception stays installed until this drops.
pub struct LoginFlow {
    /// Client with redirects disabled so the dance is driven manually.
    client: reqwest::Client,
    /// The armed interceptor.
    mock: MockServer,
    /// Shadowed session store shared with the application under test.
    shadow: Arc<ShadowSession>,
    /// Whether unmatched calls fail the flow.
    strict: bool,
    /// Event sink.
    telemetry: Arc<dyn TelemetrySink>,
}

impl LoginFlow {
    /// Starts building a flow over the given shadowed session.
    #[must_use]
    pub fn builder(shadow: Arc<ShadowSession>) -> LoginFlowBuilder {
        LoginFlowBuilder {
            shadow,
            bugzilla_fixture: empty_bug_list(),
            search_fixture: json!({}),
            extras: Vec::new(),
            mode: MockMode::Strict,
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    /// Returns the armed interceptor.
    #[must_use]
    pub const fn mock(&self) -> &MockServer {
        &self.mock
    }

    /// Identity-provider base URL for the application's config.
    #[must_use]
    pub fn idp_url(&self) -> String {
        format!("{}{IDP_PREFIX}", self.mock.base_url())
    }

    /// Bug-tracker base URL for the application's config.
    #[must_use]
    pub fn bugzilla_url(&self) -> String {
        format!("{}{BUGZILLA_PREFIX}", self.mock.base_url())
    }

    /// Search-API base URL for the application's config.
    #[must_use]
    pub fn search_url(&self) -> String {
        format!("{}{SEARCH_PREFIX}", self.mock.base_url())
    }

    /// Performs the login dance against the application at `app_url`.
    ///
    /// # Errors
    /// Returns [`LoginError`] when a redirect contract is broken, the
    /// session never exposed the state nonce, or transport fails.
    pub async fn login(&self, app_url: &str) -> Result<(), LoginError> {
        // The application must bounce us to the provider first.
        let authorize_url = self.expect_redirect(app_url, "/login").await?;
        let _ = self.client.get(authorize_url).send().await?;

        // Recover the nonce the application stored in-session.
        let state = self
            .shadow
            .recorded(STATE_KEY)
            .ok_or_else(|| LoginError::MissingSessionKey(STATE_KEY.to_string()))?;
        let state = state.as_str().ok_or_else(|| LoginError::InvalidSessionValue {
            key: STATE_KEY.to_string(),
        })?;

        let callback = format!("/auth0?code={AUTH_CODE}&state={state}");
        let next = self.expect_redirect(app_url, &callback).await?;
        let _ = self.client.get(next).send().await?;

        self.telemetry.record(&HarnessEvent::LoginCompleted {
            login: CANNED_LOGIN.to_string(),
        });
        Ok(())
    }

    /// Issues the logout request.
    ///
    /// # Errors
    /// Returns [`LoginError::Transport`] when the request fails.
    pub async fn logout(&self, app_url: &str) -> Result<(), LoginError> {
        let _ = self.client.get(format!("{app_url}/logout")).send().await?;
        self.telemetry.record(&HarnessEvent::LogoutIssued);
        Ok(())
    }

    /// Runs `body` inside a logged-in scope with guaranteed logout.
    ///
    /// The caller's closure runs after a successful login; logout always
    /// follows, whether the closure succeeded or failed. The closure's
    /// error wins over teardown errors, and unmatched strict-mode calls
    /// recorded during the armed window fail the flow afterwards.
    ///
    /// Consumes the flow: when the scope ends the interceptor is torn
    /// down with it, so nothing stays armed past the logged-in window.
    ///
    /// # Errors
    /// Returns [`LoginError`] per the taxonomy above.
    pub async fn with_login<T, F, Fut>(self, app_url: &str, body: F) -> Result<T, LoginError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        self.login(app_url).await?;
        let outcome = body().await;
        let teardown = self.logout(app_url).await;
        let value = outcome.map_err(LoginError::Caller)?;
        teardown.map_err(|err| LoginError::Teardown(err.to_string()))?;
        if self.strict {
            let unmatched = self.mock.unmatched();
            if let Some(first) = unmatched.first() {
                return Err(LoginError::UnmatchedCalls {
                    count: unmatched.len(),
                    first: format!("{} {}", first.verb, first.target),
                });
            }
        }
        Ok(value)
    }

    /// Issues a GET to an application endpoint expecting a redirect and
    /// returns the resolved target URL.
    async fn expect_redirect(&self, app_url: &str, endpoint: &str) -> Result<Url, LoginError> {
        let response = self.client.get(format!("{app_url}{endpoint}")).send().await?;
        if !response.status().is_redirection() {
            return Err(LoginError::MissingRedirect {
                endpoint: endpoint.to_string(),
            });
        }
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| LoginError::MissingRedirect {
                endpoint: endpoint.to_string(),
            })?;
        resolve_location(app_url, location)
    }
}

/// Resolves a possibly-relative redirect location against the app URL.
fn resolve_location(app_url: &str, location: &str) -> Result<Url, LoginError> {
    let invalid = |location: &str| LoginError::InvalidLocation {
        location: location.to_string(),
    };
    if let Ok(url) = Url::parse(location) {
        return Ok(url);
    }
    let base = Url::parse(app_url).map_err(|_| invalid(app_url))?;
    base.join(location).map_err(|_| invalid(location))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
