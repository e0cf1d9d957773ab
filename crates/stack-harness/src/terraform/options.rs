// crates/stack-harness/src/terraform/options.rs
// ============================================================================
// Module: Terraform Options
// Description: Inputs for Terraform command invocations.
// Purpose: Describe where and how Terraform runs, and which failures retry.
// Dependencies: serde
// ============================================================================

//! Invocation options for [`super::TerraformRunner`] and the default table of
//! transient Terraform errors.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default Terraform executable name, resolved through `PATH`.
pub const DEFAULT_TERRAFORM_BINARY: &str = "terraform";
/// Retry budget applied by [`TerraformOptions::with_default_retryable_errors`].
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Delay applied by [`TerraformOptions::with_default_retryable_errors`].
pub const DEFAULT_TIME_BETWEEN_RETRIES: Duration = Duration::from_secs(5);

/// Transient Terraform failures worth retrying, as `(pattern, description)`.
pub const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (".*read: connection reset by peer.*", "Failed to reach helm charts repository."),
    (".*transport is closing.*", "Failed to reach Kubernetes API."),
    (
        ".*unable to verify signature.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*unable to verify checksum.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*no provider exists with the given name.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*registry service is unreachable.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (".*Error installing provider.*", "Failed to retrieve plugin due to transient network error."),
    (
        ".*Failed to query available provider packages.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*timeout while waiting for plugin to start.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*timed out waiting for server handshake.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "could not query provider registry for",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*Provider produced inconsistent result after apply.*",
        "Provider eventual consistency error.",
    ),
];

// ============================================================================
// SECTION: Variables
// ============================================================================

/// Terraform input variable value.
///
/// Top-level strings are passed verbatim; every other shape is rendered as an
/// HCL literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TerraformVar {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Floating point literal.
    Float(f64),
    /// String value.
    String(String),
    /// List of values.
    List(Vec<TerraformVar>),
    /// Map of values keyed by name.
    Map(BTreeMap<String, TerraformVar>),
}

impl From<&str> for TerraformVar {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TerraformVar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for TerraformVar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for TerraformVar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Options shared by every Terraform command against one working directory.
///
/// # Invariants
/// - `vars` and `env` are ordered maps so argument lists are deterministic.
/// - A command is retried only when its output matches a `retryable_errors` key.
#[derive(Debug, Clone, PartialEq)]
pub struct TerraformOptions {
    /// Directory holding the Terraform declarations.
    pub dir: PathBuf,
    /// Terraform executable.
    pub binary: PathBuf,
    /// Input variables passed as `-var name=value`.
    pub vars: BTreeMap<String, TerraformVar>,
    /// Extra environment variables for the Terraform process.
    pub env: BTreeMap<String, String>,
    /// Output regex to human-readable reason for retryable failures.
    pub retryable_errors: BTreeMap<String, String>,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay between retries.
    pub time_between_retries: Duration,
    /// Pass `-no-color` to every command.
    pub no_color: bool,
    /// Hold the state lock during apply and destroy.
    pub lock: bool,
}

impl TerraformOptions {
    /// Creates options for the given directory with no retries.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            binary: PathBuf::from(DEFAULT_TERRAFORM_BINARY),
            vars: BTreeMap::new(),
            env: BTreeMap::new(),
            retryable_errors: BTreeMap::new(),
            max_retries: 0,
            time_between_retries: Duration::ZERO,
            no_color: true,
            lock: false,
        }
    }

    /// Adds an input variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<TerraformVar>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Adds an environment variable for the Terraform process.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Overrides the Terraform executable.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Installs the default transient-failure table and retry budget.
    ///
    /// Entries already present in `retryable_errors` are kept as they are.
    #[must_use]
    pub fn with_default_retryable_errors(mut self) -> Self {
        for (pattern, reason) in DEFAULT_RETRYABLE_ERRORS {
            self.retryable_errors
                .entry((*pattern).to_string())
                .or_insert_with(|| (*reason).to_string());
        }
        self.max_retries = DEFAULT_MAX_RETRIES;
        self.time_between_retries = DEFAULT_TIME_BETWEEN_RETRIES;
        self
    }
}
