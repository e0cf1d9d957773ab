// system-tests/src/config/env.rs
// ============================================================================
// Module: System Test Environment
// Description: Environment-backed configuration for stack system tests.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: stack-harness
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement to avoid silent
//! misconfiguration. Invalid UTF-8 fails closed. Unset values fall back to the
//! OpenSearch example stack at the workspace root.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use stack_harness::StackSettings;
use stack_harness::TerraformVar;
use stack_harness::config::BodyMatch;
use stack_harness::config::DEFAULT_CLUSTER_DOMAIN;
use stack_harness::config::DEFAULT_OUTPUT_KEY;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Health check retries after the first request.
pub const DEFAULT_HTTP_RETRIES: u32 = 30;
/// Delay between health check requests.
pub const DEFAULT_HTTP_DELAY: Duration = Duration::from_secs(5);
/// Body fragment the Kibana endpoint must return.
const EXPECTED_BODY: &str = "kibana";
/// Terraform directory relative to the workspace root.
const EXAMPLE_DIR: &str = "example";

// ============================================================================
// SECTION: Environment Constants
// ============================================================================

/// Environment keys for system test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTestEnv {
    /// Optional run root override.
    RunRoot,
    /// Optional Terraform directory override.
    TerraformDir,
    /// Optional Terraform executable override.
    TerraformBinary,
    /// Optional cluster domain override.
    ClusterDomain,
    /// Optional health check retry count (zero allowed).
    HttpRetries,
    /// Optional delay between health check requests in seconds.
    HttpDelaySeconds,
    /// Leave the stack running after the suite (`true`/`false` or `1`/`0`).
    SkipDestroy,
}

impl SystemTestEnv {
    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunRoot => "OPENSEARCH_SYSTEM_TEST_RUN_ROOT",
            Self::TerraformDir => "OPENSEARCH_SYSTEM_TEST_TERRAFORM_DIR",
            Self::TerraformBinary => "OPENSEARCH_SYSTEM_TEST_TERRAFORM_BIN",
            Self::ClusterDomain => "OPENSEARCH_SYSTEM_TEST_CLUSTER_DOMAIN",
            Self::HttpRetries => "OPENSEARCH_SYSTEM_TEST_HTTP_RETRIES",
            Self::HttpDelaySeconds => "OPENSEARCH_SYSTEM_TEST_HTTP_DELAY_SEC",
            Self::SkipDestroy => "OPENSEARCH_SYSTEM_TEST_SKIP_DESTROY",
        }
    }
}

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Typed system test configuration derived from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemTestConfig {
    /// Optional run root override.
    pub run_root: Option<PathBuf>,
    /// Optional Terraform directory override.
    pub terraform_dir: Option<PathBuf>,
    /// Optional Terraform executable override.
    pub terraform_binary: Option<PathBuf>,
    /// Optional cluster domain override.
    pub cluster_domain: Option<String>,
    /// Optional health check retry count.
    pub http_retries: Option<u32>,
    /// Optional delay between health check requests.
    pub http_delay: Option<Duration>,
    /// Leave the stack running after the suite.
    pub skip_destroy: bool,
}

impl SystemTestConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when an environment value is not valid UTF-8, is empty,
    /// or fails validation (for example, a non-numeric retry count).
    pub fn load() -> Result<Self, String> {
        let run_root = read_env_nonempty(SystemTestEnv::RunRoot.as_str())?.map(PathBuf::from);
        let terraform_dir =
            read_env_nonempty(SystemTestEnv::TerraformDir.as_str())?.map(PathBuf::from);
        let terraform_binary =
            read_env_nonempty(SystemTestEnv::TerraformBinary.as_str())?.map(PathBuf::from);
        let cluster_domain = read_env_nonempty(SystemTestEnv::ClusterDomain.as_str())?;
        let http_retries = read_env_nonempty(SystemTestEnv::HttpRetries.as_str())?
            .map(|value| parse_count(SystemTestEnv::HttpRetries.as_str(), &value))
            .transpose()?;
        let http_delay = read_env_nonempty(SystemTestEnv::HttpDelaySeconds.as_str())?
            .map(|value| parse_seconds(SystemTestEnv::HttpDelaySeconds.as_str(), &value))
            .transpose()?;
        let skip_destroy = parse_bool_env(
            SystemTestEnv::SkipDestroy.as_str(),
            read_env_nonempty(SystemTestEnv::SkipDestroy.as_str())?,
        )?;
        Ok(Self {
            run_root,
            terraform_dir,
            terraform_binary,
            cluster_domain,
            http_retries,
            http_delay,
            skip_destroy,
        })
    }

    /// Builds stack settings for the OpenSearch example stack.
    ///
    /// Relative Terraform directories resolve against `workspace_root`.
    #[must_use]
    pub fn stack_settings(&self, workspace_root: &Path) -> StackSettings {
        let mut settings = StackSettings::default();
        let dir = self.terraform_dir.clone().unwrap_or_else(|| PathBuf::from(EXAMPLE_DIR));
        settings.terraform.dir =
            if dir.is_relative() { workspace_root.join(dir) } else { dir };
        if let Some(binary) = &self.terraform_binary {
            settings.terraform.binary.clone_from(binary);
        }
        let domain = self.cluster_domain.as_deref().unwrap_or(DEFAULT_CLUSTER_DOMAIN);
        settings
            .terraform
            .vars
            .insert("cluster_domain".to_string(), TerraformVar::String(domain.to_string()));
        settings.terraform.skip_destroy = self.skip_destroy;
        settings.check.output_key = DEFAULT_OUTPUT_KEY.to_string();
        settings.check.scheme = "http".to_string();
        settings.check.expected_status = 200;
        settings.check.expected_body = EXPECTED_BODY.to_string();
        settings.check.body_match = BodyMatch::Contains;
        settings.check.max_retries = self.http_retries.unwrap_or(DEFAULT_HTTP_RETRIES);
        settings.check.delay_sec = self.http_delay.unwrap_or(DEFAULT_HTTP_DELAY).as_secs();
        settings
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the workspace root (the parent of this crate's manifest directory).
#[must_use]
pub fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().map_or_else(|| manifest_dir.to_path_buf(), Path::to_path_buf)
}

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns an error when the environment variable contains invalid UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, String> {
    std::env::var_os(name).map_or(Ok(None), |raw| {
        raw.into_string().map(Some).map_err(|_| format!("{name} must be valid UTF-8"))
    })
}

/// Reads an environment variable and rejects empty values.
///
/// # Errors
///
/// Returns an error when the variable is set but empty or whitespace.
fn read_env_nonempty(name: &str) -> Result<Option<String>, String> {
    match read_env_strict(name)? {
        Some(value) if value.trim().is_empty() => Err(format!("{name} must not be empty")),
        Some(value) => Ok(Some(value)),
        None => Ok(None),
    }
}

/// Parses a non-negative integer from an environment variable string.
///
/// # Errors
///
/// Returns an error when the value is not a whole number.
fn parse_count(name: &str, raw: &str) -> Result<u32, String> {
    raw.trim().parse().map_err(|_| format!("{name} must be a non-negative integer"))
}

/// Parses a whole number of seconds (zero allowed).
///
/// # Errors
///
/// Returns an error when the value is non-numeric.
fn parse_seconds(name: &str, raw: &str) -> Result<Duration, String> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("{name} must be a whole number of seconds"))?;
    Ok(Duration::from_secs(secs))
}

/// Parses a boolean environment variable.
///
/// # Errors
///
/// Returns an error when the value is not a recognized boolean literal.
fn parse_bool_env(name: &str, raw: Option<String>) -> Result<bool, String> {
    let Some(value) = raw else {
        return Ok(false);
    };
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
        return Ok(true);
    }
    if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
        return Ok(false);
    }
    Err(format!("{name} must be 1, 0, true, or false"))
}
