// crates/stack-harness/src/http_check.rs
// ============================================================================
// Module: HTTP Health Check
// Description: Retried HTTP GET checks against provisioned endpoints.
// Purpose: Poll an endpoint until it returns the expected status and body.
// Dependencies: reqwest, thiserror
// ============================================================================

//! ## Overview
//! [`HttpCheck`] issues bounded GET requests and retries with a fixed delay
//! until the response satisfies the expected status and body. Transport
//! failures and mismatched responses are both retryable; only setup errors
//! (bad URL, client construction) fail immediately.
//! Invariants:
//! - Only `http` and `https` URLs without embedded credentials are accepted.
//! - Response bodies larger than `max_body_bytes` are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use thiserror::Error;

use crate::events::EVENT_HTTP_ATTEMPT;
use crate::events::EventOutcome;
use crate::events::NoopEventSink;
use crate::events::StackEvent;
use crate::events::StackEventSink;
use crate::retry::Attempt;
use crate::retry::RetryError;
use crate::retry::RetryPolicy;
use crate::retry::Sleeper;
use crate::retry::ThreadSleeper;
use crate::retry::do_with_retry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default maximum response body size in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default redirect limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
/// User agent for outbound requests.
pub const USER_AGENT: &str = concat!("stack-check/", env!("CARGO_PKG_VERSION"));
/// Maximum number of body characters quoted in mismatch messages.
const BODY_PREVIEW_CHARS: usize = 200;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Expected response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyExpectation {
    /// Any body is accepted.
    Any,
    /// The body must contain the substring.
    Contains(String),
    /// The body, ignoring surrounding whitespace, must equal the string.
    Equals(String),
}

impl BodyExpectation {
    /// Returns true when `body` satisfies the expectation.
    #[must_use]
    pub fn matches(&self, body: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Contains(needle) => body.contains(needle.as_str()),
            Self::Equals(expected) => body.trim() == expected.as_str(),
        }
    }

    /// Describes the expectation for error messages.
    fn describe(&self) -> String {
        match self {
            Self::Any => "any body".to_string(),
            Self::Contains(needle) => format!("body containing '{needle}'"),
            Self::Equals(expected) => format!("body equal to '{expected}'"),
        }
    }
}

/// Status and decoded body of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body decoded as UTF-8 (lossy).
    pub body: String,
}

/// Successful check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCheckOutcome {
    /// The accepted response.
    pub response: HttpResponse,
    /// Number of attempts it took.
    pub attempts: u32,
}

/// HTTP check errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpCheckError {
    /// The URL does not parse.
    #[error("invalid url '{url}': {message}")]
    InvalidUrl {
        /// Rejected URL text.
        url: String,
        /// Parser message.
        message: String,
    },
    /// The URL scheme is neither http nor https.
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
    /// The URL embeds credentials.
    #[error("url credentials are not allowed")]
    Credentials,
    /// The HTTP client could not be built.
    #[error("http client build failed: {0}")]
    Client(String),
    /// The request failed before a response arrived.
    #[error("http request failed: {0}")]
    Request(String),
    /// The response body exceeded the size limit.
    #[error("http response exceeds size limit of {0} bytes")]
    BodyTooLarge(usize),
    /// A response arrived but did not satisfy the check.
    #[error("unexpected response (status {status}): {reason}")]
    Unexpected {
        /// Observed status.
        status: u16,
        /// Mismatch description.
        reason: String,
    },
    /// Every attempt failed.
    #[error("http check against {url} unsuccessful after {attempts} attempts: {last}")]
    Exhausted {
        /// Checked URL.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: Box<HttpCheckError>,
    },
}

// ============================================================================
// SECTION: Check
// ============================================================================

/// Retried HTTP GET check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCheck {
    /// Target URL.
    url: Url,
    /// Expected status code.
    pub expected_status: u16,
    /// Expected body.
    pub body: BodyExpectation,
    /// Attempt budget and delay.
    pub policy: RetryPolicy,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Maximum accepted body size.
    pub max_body_bytes: usize,
    /// Redirects followed per request (zero disables).
    pub max_redirects: usize,
}

impl HttpCheck {
    /// Creates a single-attempt check expecting `200` with any body.
    ///
    /// # Errors
    ///
    /// Returns [`HttpCheckError`] when the URL is invalid, not http(s), or
    /// embeds credentials.
    pub fn new(url: &str) -> Result<Self, HttpCheckError> {
        Ok(Self {
            url: parse_url(url)?,
            expected_status: 200,
            body: BodyExpectation::Any,
            policy: RetryPolicy::new(1, Duration::ZERO),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        })
    }

    /// Sets the expected status.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Sets the expected body.
    #[must_use]
    pub fn with_body(mut self, body: BodyExpectation) -> Self {
        self.body = body;
        self
    }

    /// Sets the attempt budget and delay.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the redirect limit.
    #[must_use]
    pub const fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Returns the target URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Runs the check with the configured status and body expectations.
    ///
    /// # Errors
    ///
    /// Returns [`HttpCheckError::Exhausted`] when no attempt succeeds, or a
    /// setup error when the client cannot be built.
    pub fn run(
        &self,
        sleeper: &dyn Sleeper,
        sink: &dyn StackEventSink,
    ) -> Result<HttpCheckOutcome, HttpCheckError> {
        self.run_with_validation(sleeper, sink, |response| {
            if response.status != self.expected_status {
                return Err(format!(
                    "expected status {}, got {}",
                    self.expected_status, response.status
                ));
            }
            if !self.body.matches(&response.body) {
                return Err(format!(
                    "expected {}, got '{}'",
                    self.body.describe(),
                    preview(&response.body)
                ));
            }
            Ok(())
        })
    }

    /// Runs the check with a caller-supplied response validator.
    ///
    /// The configured status and body expectations are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HttpCheckError::Exhausted`] when no attempt succeeds, or a
    /// setup error when the client cannot be built.
    pub fn run_with_validation<F>(
        &self,
        sleeper: &dyn Sleeper,
        sink: &dyn StackEventSink,
        validate: F,
    ) -> Result<HttpCheckOutcome, HttpCheckError>
    where
        F: Fn(&HttpResponse) -> Result<(), String>,
    {
        let client = build_client(self.request_timeout, self.max_redirects)?;
        let description = format!("HTTP GET to {}", self.url);
        let result = do_with_retry(&description, &self.policy, sleeper, sink, |attempt| {
            let response = match http_get(&client, &self.url, self.max_body_bytes) {
                Ok(response) => response,
                Err(err) => {
                    sink.record(
                        &StackEvent::new(EVENT_HTTP_ATTEMPT, EventOutcome::Failed)
                            .with_subject(self.url.as_str())
                            .with_attempt(attempt)
                            .with_message(err.to_string()),
                    );
                    return Err(Attempt::Retry(err));
                }
            };
            match validate(&response) {
                Ok(()) => {
                    sink.record(
                        &StackEvent::new(EVENT_HTTP_ATTEMPT, EventOutcome::Succeeded)
                            .with_subject(self.url.as_str())
                            .with_attempt(attempt)
                            .with_status(response.status),
                    );
                    Ok(HttpCheckOutcome {
                        response,
                        attempts: attempt,
                    })
                }
                Err(reason) => {
                    sink.record(
                        &StackEvent::new(EVENT_HTTP_ATTEMPT, EventOutcome::Failed)
                            .with_subject(self.url.as_str())
                            .with_attempt(attempt)
                            .with_status(response.status)
                            .with_message(reason.clone()),
                    );
                    Err(Attempt::Retry(HttpCheckError::Unexpected {
                        status: response.status,
                        reason,
                    }))
                }
            }
        });
        result.map_err(|err| match err {
            RetryError::Exhausted {
                attempts,
                last,
                ..
            } => HttpCheckError::Exhausted {
                url: self.url.to_string(),
                attempts,
                last: Box::new(last),
            },
            RetryError::Fatal {
                error, ..
            } => error,
        })
    }
}

// ============================================================================
// SECTION: Convenience Entry Points
// ============================================================================

/// GETs `url` until it returns `expected_status` and a matching body, retrying
/// up to `max_retries` times after the first request.
///
/// Sleeps on the calling thread and discards events.
///
/// # Errors
///
/// Returns [`HttpCheckError`] when the URL is invalid or no attempt succeeds.
pub fn http_get_with_retry(
    url: &str,
    expected_status: u16,
    body: BodyExpectation,
    max_retries: u32,
    delay: Duration,
) -> Result<HttpCheckOutcome, HttpCheckError> {
    HttpCheck::new(url)?
        .with_status(expected_status)
        .with_body(body)
        .with_policy(RetryPolicy::from_retries(max_retries, delay))
        .run(&ThreadSleeper, &NoopEventSink)
}

/// GETs `url` until `validate` accepts the response.
///
/// # Errors
///
/// Returns [`HttpCheckError`] when the URL is invalid or no attempt succeeds.
pub fn http_get_with_custom_validation<F>(
    url: &str,
    max_retries: u32,
    delay: Duration,
    validate: F,
) -> Result<HttpCheckOutcome, HttpCheckError>
where
    F: Fn(&HttpResponse) -> Result<(), String>,
{
    HttpCheck::new(url)?
        .with_policy(RetryPolicy::from_retries(max_retries, delay))
        .run_with_validation(&ThreadSleeper, &NoopEventSink, validate)
}

/// Issues one GET request and reads the body with a size limit.
///
/// # Errors
///
/// Returns [`HttpCheckError::Request`] on transport failure and
/// [`HttpCheckError::BodyTooLarge`] when the body exceeds `max_body_bytes`.
pub fn http_get(
    client: &Client,
    url: &Url,
    max_body_bytes: usize,
) -> Result<HttpResponse, HttpCheckError> {
    let response =
        client.get(url.as_str()).send().map_err(|err| HttpCheckError::Request(err.to_string()))?;
    let status = response.status().as_u16();
    let body = read_body_limited(response, max_body_bytes)?;
    Ok(HttpResponse {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses and validates a check URL.
fn parse_url(raw: &str) -> Result<Url, HttpCheckError> {
    let url = Url::parse(raw.trim()).map_err(|err| HttpCheckError::InvalidUrl {
        url: raw.to_string(),
        message: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(HttpCheckError::UnsupportedScheme(other.to_string())),
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(HttpCheckError::Credentials);
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(HttpCheckError::InvalidUrl {
            url: raw.to_string(),
            message: "url host required".to_string(),
        });
    }
    Ok(url)
}

/// Builds the blocking client used for every attempt of one check.
fn build_client(timeout: Duration, max_redirects: usize) -> Result<Client, HttpCheckError> {
    let redirect =
        if max_redirects == 0 { Policy::none() } else { Policy::limited(max_redirects) };
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .redirect(redirect)
        .build()
        .map_err(|err| HttpCheckError::Client(err.to_string()))
}

/// Reads the response body while enforcing a byte limit.
fn read_body_limited(
    response: reqwest::blocking::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, HttpCheckError> {
    let max_bytes_u64 = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err(HttpCheckError::BodyTooLarge(max_bytes));
    }
    let mut buf = Vec::new();
    let mut handle = response.take(max_bytes_u64.saturating_add(1));
    handle.read_to_end(&mut buf).map_err(|err| HttpCheckError::Request(err.to_string()))?;
    if buf.len() > max_bytes {
        return Err(HttpCheckError::BodyTooLarge(max_bytes));
    }
    Ok(buf)
}

/// Returns a short single-line preview of a body.
fn preview(body: &str) -> String {
    let flattened: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= BODY_PREVIEW_CHARS {
        return flattened;
    }
    let head: String = flattened.chars().take(BODY_PREVIEW_CHARS).collect();
    format!("{head}...")
}
