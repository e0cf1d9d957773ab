// crates/stack-harness/src/config.rs
// ============================================================================
// Module: Stack Settings
// Description: Configuration loading and validation for stack verification.
// Purpose: Provide strict, fail-closed settings parsing with hard limits.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Settings are loaded from a TOML file with strict size and path limits. A
//! missing default file yields built-in defaults; a missing file that was
//! requested explicitly (flag or environment) is an error. Relative Terraform
//! directories resolve against the settings file's directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::http_check::BodyExpectation;
use crate::http_check::HttpCheck;
use crate::http_check::HttpCheckError;
use crate::retry::RetryPolicy;
use crate::terraform::TerraformOptions;
use crate::terraform::TerraformVar;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default settings filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "stack-check.toml";
/// Environment variable used to override the settings path.
pub const CONFIG_ENV_VAR: &str = "STACK_CHECK_CONFIG";
/// Maximum settings file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 256 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum Terraform retries.
const MAX_TERRAFORM_RETRIES: u32 = 100;
/// Maximum delay between attempts, in seconds.
const MAX_DELAY_SECS: u64 = 3600;
/// Maximum HTTP check retries.
const MAX_HTTP_RETRIES: u32 = 1000;
/// Maximum per-request timeout, in seconds.
const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;
/// Maximum redirects followed per request.
const MAX_REDIRECTS: usize = 32;
/// Default cluster domain passed to the example stack.
pub const DEFAULT_CLUSTER_DOMAIN: &str = "infra-dev.codainfra-staging.com";
/// Default output holding the health check endpoint.
pub const DEFAULT_OUTPUT_KEY: &str = "kibana_endpoint";

// ============================================================================
// SECTION: Settings Types
// ============================================================================

/// Stack verification settings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackSettings {
    /// Terraform invocation settings.
    pub terraform: TerraformSettings,
    /// Health check settings.
    pub check: CheckSettings,
    /// File the settings were loaded from (not deserialized).
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Terraform invocation settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerraformSettings {
    /// Directory holding the Terraform declarations.
    pub dir: PathBuf,
    /// Terraform executable.
    pub binary: PathBuf,
    /// Input variables.
    pub vars: BTreeMap<String, TerraformVar>,
    /// Extra environment for the Terraform process.
    pub env: BTreeMap<String, String>,
    /// Additional retryable error patterns (regex to reason).
    pub retryable_errors: BTreeMap<String, String>,
    /// Include the built-in transient error patterns.
    pub default_retryable_errors: bool,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay between retries, in seconds.
    pub time_between_retries_sec: u64,
    /// Hold the state lock during apply and destroy.
    pub lock: bool,
    /// Pass `-no-color` to Terraform.
    pub no_color: bool,
    /// Leave the stack running after a lifecycle run.
    pub skip_destroy: bool,
}

impl Default for TerraformSettings {
    fn default() -> Self {
        let mut vars = BTreeMap::new();
        vars.insert(
            "cluster_domain".to_string(),
            TerraformVar::String(DEFAULT_CLUSTER_DOMAIN.to_string()),
        );
        Self {
            dir: PathBuf::from("example"),
            binary: PathBuf::from("terraform"),
            vars,
            env: BTreeMap::new(),
            retryable_errors: BTreeMap::new(),
            default_retryable_errors: true,
            max_retries: 3,
            time_between_retries_sec: 5,
            lock: false,
            no_color: true,
            skip_destroy: false,
        }
    }
}

/// How the response body is compared with `expected_body`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyMatch {
    /// Body contains `expected_body`.
    Contains,
    /// Body equals `expected_body`.
    Equals,
    /// Body is ignored.
    Any,
}

/// Health check settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckSettings {
    /// Terraform output holding the endpoint host.
    pub output_key: String,
    /// URL scheme prefixed to bare endpoints.
    pub scheme: String,
    /// Path appended to the endpoint.
    pub path: String,
    /// Expected HTTP status.
    pub expected_status: u16,
    /// Expected body text.
    pub expected_body: String,
    /// Body comparison mode.
    pub body_match: BodyMatch,
    /// Retries after the first failed request.
    pub max_retries: u32,
    /// Delay between requests, in seconds.
    pub delay_sec: u64,
    /// Per-request timeout, in seconds.
    pub request_timeout_sec: u64,
    /// Redirects followed per request (zero disables).
    pub max_redirects: usize,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            output_key: DEFAULT_OUTPUT_KEY.to_string(),
            scheme: "http".to_string(),
            path: String::new(),
            expected_status: 200,
            expected_body: "kibana".to_string(),
            body_match: BodyMatch::Contains,
            max_retries: 30,
            delay_sec: 5,
            request_timeout_sec: 10,
            max_redirects: 10,
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl StackSettings {
    /// Loads settings using the default resolution rules.
    ///
    /// Resolution order: `path`, then [`CONFIG_ENV_VAR`], then
    /// [`DEFAULT_CONFIG_NAME`] in the working directory. Only the last may be
    /// absent, in which case defaults apply.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, required) = resolve_path(path)?;
        validate_path(&resolved)?;
        if !required && !resolved.exists() {
            let settings = Self::default();
            settings.validate()?;
            return Ok(settings);
        }
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut settings = Self::from_toml_str(content)?;
        settings.anchor_to(&resolved);
        Ok(settings)
    }

    /// Parses and validates settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when settings are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.terraform.validate()?;
        self.check.validate()?;
        Ok(())
    }

    /// Resolves relative paths against the settings file's directory.
    fn anchor_to(&mut self, file: &Path) {
        if self.terraform.dir.is_relative()
            && let Some(parent) = file.parent()
        {
            self.terraform.dir = parent.join(&self.terraform.dir);
        }
        self.source = Some(file.to_path_buf());
    }

    /// Builds Terraform options from these settings.
    #[must_use]
    pub fn terraform_options(&self) -> TerraformOptions {
        let settings = &self.terraform;
        let mut options = TerraformOptions::new(&settings.dir).with_binary(&settings.binary);
        if settings.default_retryable_errors {
            options = options.with_default_retryable_errors();
        }
        options.retryable_errors.extend(settings.retryable_errors.clone());
        options.vars.clone_from(&settings.vars);
        options.env.clone_from(&settings.env);
        options.max_retries = settings.max_retries;
        options.time_between_retries = Duration::from_secs(settings.time_between_retries_sec);
        options.lock = settings.lock;
        options.no_color = settings.no_color;
        options
    }

    /// Returns the URL checked for a given endpoint.
    ///
    /// Endpoints that already carry a scheme are used as given.
    #[must_use]
    pub fn check_url(&self, endpoint: &str) -> String {
        let endpoint = endpoint.trim();
        let base = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("{}://{endpoint}", self.check.scheme)
        };
        if self.check.path.is_empty() {
            return base;
        }
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            self.check.path.trim_start_matches('/')
        )
    }

    /// Builds the health check for a given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`HttpCheckError`] when the resulting URL is invalid.
    pub fn http_check(&self, endpoint: &str) -> Result<HttpCheck, HttpCheckError> {
        self.http_check_url(&self.check_url(endpoint))
    }

    /// Builds the health check for an explicit URL, ignoring `check.scheme`
    /// and `check.path`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpCheckError`] when the URL is invalid.
    pub fn http_check_url(&self, url: &str) -> Result<HttpCheck, HttpCheckError> {
        let check = &self.check;
        let body = match check.body_match {
            BodyMatch::Contains => BodyExpectation::Contains(check.expected_body.clone()),
            BodyMatch::Equals => BodyExpectation::Equals(check.expected_body.clone()),
            BodyMatch::Any => BodyExpectation::Any,
        };
        Ok(HttpCheck::new(url)?
            .with_status(check.expected_status)
            .with_body(body)
            .with_policy(RetryPolicy::from_retries(
                check.max_retries,
                Duration::from_secs(check.delay_sec),
            ))
            .with_request_timeout(Duration::from_secs(check.request_timeout_sec))
            .with_max_redirects(check.max_redirects))
    }
}

impl TerraformSettings {
    /// Validates Terraform settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("terraform.dir", &self.dir.to_string_lossy())?;
        validate_path_string("terraform.binary", &self.binary.to_string_lossy())?;
        for name in self.vars.keys() {
            validate_identifier("terraform.vars", name)?;
        }
        for name in self.env.keys() {
            if name.is_empty() || name.contains('=') || name.contains('\0') {
                return Err(ConfigError::Invalid(format!(
                    "terraform.env key '{name}' is not a valid variable name"
                )));
            }
        }
        for pattern in self.retryable_errors.keys() {
            regex::Regex::new(pattern).map_err(|err| {
                ConfigError::Invalid(format!("terraform.retryable_errors '{pattern}': {err}"))
            })?;
        }
        if self.max_retries > MAX_TERRAFORM_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "terraform.max_retries must be at most {MAX_TERRAFORM_RETRIES}"
            )));
        }
        if self.time_between_retries_sec > MAX_DELAY_SECS {
            return Err(ConfigError::Invalid(format!(
                "terraform.time_between_retries_sec must be at most {MAX_DELAY_SECS}"
            )));
        }
        Ok(())
    }
}

impl CheckSettings {
    /// Validates health check settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("check.output_key", &self.output_key)?;
        if self.scheme != "http" && self.scheme != "https" {
            return Err(ConfigError::Invalid("check.scheme must be http or https".to_string()));
        }
        if !(100..=599).contains(&self.expected_status) {
            return Err(ConfigError::Invalid(
                "check.expected_status must be between 100 and 599".to_string(),
            ));
        }
        if self.body_match != BodyMatch::Any && self.expected_body.is_empty() {
            return Err(ConfigError::Invalid(
                "check.expected_body must be non-empty unless body_match = \"any\"".to_string(),
            ));
        }
        if self.max_retries > MAX_HTTP_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "check.max_retries must be at most {MAX_HTTP_RETRIES}"
            )));
        }
        if self.delay_sec > MAX_DELAY_SECS {
            return Err(ConfigError::Invalid(format!(
                "check.delay_sec must be at most {MAX_DELAY_SECS}"
            )));
        }
        if self.request_timeout_sec == 0 || self.request_timeout_sec > MAX_REQUEST_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "check.request_timeout_sec must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}"
            )));
        }
        if self.max_redirects > MAX_REDIRECTS {
            return Err(ConfigError::Invalid(format!(
                "check.max_redirects must be at most {MAX_REDIRECTS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Settings loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading settings.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid settings data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the settings path and whether the file must exist.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{CONFIG_ENV_VAR} must not be empty")));
        }
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a Terraform identifier (variable or output name).
fn validate_identifier(field: &str, name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    let valid_rest = chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{field} name '{name}' is not a valid identifier")))
    }
}
