// crates/serviceweb-harness/src/mock/registry.rs
// ============================================================================
// Module: Mock Registry
// Description: Ordered first-match-wins rule set for intercepted calls.
// Purpose: Decide which canned response answers an outbound request.
// Dependencies: axum (http types), regex, serde_json
// ============================================================================

//! ## Overview
//! A [`MockRegistry`] is an ordered list of [`MockRule`]s evaluated in
//! insertion order. The first rule whose verb matches and whose pattern
//! finds the request target wins; later rules can therefore only cover
//! targets earlier rules leave unmatched.

use axum::http::Method;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by mock construction and serving.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum MockError {
    /// A rule pattern is not a valid regular expression.
    #[error("invalid mock pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// The offending pattern source.
        pattern: String,
        /// Regex compiler diagnostic.
        message: String,
    },
    /// A rule verb is not a valid HTTP method.
    #[error("invalid mock verb {0:?}")]
    InvalidVerb(String),
    /// A canned body failed to serialize.
    #[error("mock body serialization failed: {0}")]
    Serialization(String),
    /// The interceptor could not bind its loopback listener.
    #[error("mock server bind failed: {0}")]
    Bind(String),
    /// The interceptor runtime could not be constructed.
    #[error("mock server runtime failed: {0}")]
    Runtime(String),
}

// ============================================================================
// SECTION: Canned Responses
// ============================================================================

/// Response replayed for a matched rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content type header value.
    pub content_type: String,
    /// Response body.
    pub body: String,
}

impl CannedResponse {
    /// Builds a `200 application/json` response from a JSON value.
    ///
    /// # Errors
    /// Returns [`MockError::Serialization`] when the value cannot be
    /// rendered as JSON text.
    pub fn json(value: &Value) -> Result<Self, MockError> {
        let body =
            serde_json::to_string(value).map_err(|err| MockError::Serialization(err.to_string()))?;
        Ok(Self {
            status: 200,
            content_type: "application/json".to_string(),
            body,
        })
    }

    /// Builds a `200 text/plain` response from raw text.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/plain".to_string(),
            body: body.into(),
        }
    }

    /// Overrides the status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// One `(verb, pattern, response)` interception rule.
#[derive(Debug, Clone)]
pub struct MockRule {
    /// HTTP method the rule applies to.
    verb: Method,
    /// Unanchored pattern searched against the request target.
    pattern: Regex,
    /// Response replayed on match.
    response: CannedResponse,
}

impl MockRule {
    /// Builds a rule from a verb string and a regex pattern.
    ///
    /// The pattern is searched, not anchored, against the request path
    /// and query, so a prefix like `auth0/authorize` matches regardless
    /// of query parameters.
    ///
    /// # Errors
    /// Returns [`MockError`] for an unknown verb or invalid pattern.
    pub fn new(verb: &str, pattern: &str, response: CannedResponse) -> Result<Self, MockError> {
        let verb = Method::from_bytes(verb.to_ascii_uppercase().as_bytes())
            .map_err(|_| MockError::InvalidVerb(verb.to_string()))?;
        let pattern = Regex::new(pattern).map_err(|err| MockError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            verb,
            pattern,
            response,
        })
    }

    /// Reports whether this rule matches the request.
    #[must_use]
    pub fn matches(&self, verb: &Method, target: &str) -> bool {
        self.verb == *verb && self.pattern.is_match(target)
    }

    /// Returns the canned response for this rule.
    #[must_use]
    pub const fn response(&self) -> &CannedResponse {
        &self.response
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Ordered set of rules; first match wins.
///
/// # Invariants
/// - Rules are evaluated strictly in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    /// Rules in registration order.
    rules: Vec<MockRule>,
}

impl MockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule after all existing rules.
    pub fn push(&mut self, rule: MockRule) {
        self.rules.push(rule);
    }

    /// Returns the number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Reports whether the registry has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the response of the first rule matching the request.
    #[must_use]
    pub fn find(&self, verb: &Method, target: &str) -> Option<&CannedResponse> {
        self.rules.iter().find(|rule| rule.matches(verb, target)).map(MockRule::response)
    }
}

// ============================================================================
// SECTION: Call Records
// ============================================================================

/// Record of one intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// HTTP verb of the request.
    pub verb: String,
    /// Path and query of the request.
    pub target: String,
}
