// crates/stack-harness/src/terraform/runner.rs
// ============================================================================
// Module: Terraform Runner
// Description: Process execution and retry classification for Terraform.
// Purpose: Run Terraform subcommands and interpret their output.
// Dependencies: regex, serde_json
// ============================================================================

use std::collections::BTreeMap;
use std::process::Command;
use std::process::Stdio;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use super::TerraformError;
use super::args;
use super::options::TerraformOptions;
use crate::events::EVENT_TERRAFORM_COMMAND;
use crate::events::EventOutcome;
use crate::events::StackEvent;
use crate::events::StackEventSink;
use crate::retry::Attempt;
use crate::retry::RetryError;
use crate::retry::RetryPolicy;
use crate::retry::Sleeper;
use crate::retry::ThreadSleeper;
use crate::retry::do_with_retry;

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Runs Terraform subcommands for one set of options.
pub struct TerraformRunner {
    /// Invocation options.
    options: TerraformOptions,
    /// Event sink for command and retry events.
    sink: Arc<dyn StackEventSink>,
    /// Delay provider between retries.
    sleeper: Arc<dyn Sleeper>,
}

impl TerraformRunner {
    /// Creates a runner that sleeps on the calling thread between retries.
    #[must_use]
    pub fn new(options: TerraformOptions, sink: Arc<dyn StackEventSink>) -> Self {
        Self {
            options,
            sink,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replaces the delay provider.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns the invocation options.
    #[must_use]
    pub const fn options(&self) -> &TerraformOptions {
        &self.options
    }

    /// Returns the event sink.
    #[must_use]
    pub fn sink(&self) -> &dyn StackEventSink {
        self.sink.as_ref()
    }

    /// Runs `terraform init`.
    ///
    /// # Errors
    ///
    /// Returns [`TerraformError`] when the command fails.
    pub fn init(&self) -> Result<String, TerraformError> {
        self.run("init", &args::init_args(&self.options))
    }

    /// Runs `terraform apply`.
    ///
    /// # Errors
    ///
    /// Returns [`TerraformError`] when the command fails.
    pub fn apply(&self) -> Result<String, TerraformError> {
        self.run("apply", &args::apply_args(&self.options))
    }

    /// Runs `terraform init` followed by `terraform apply`.
    ///
    /// # Errors
    ///
    /// Returns [`TerraformError`] when either command fails.
    pub fn init_and_apply(&self) -> Result<String, TerraformError> {
        self.init()?;
        self.apply()
    }

    /// Runs `terraform destroy`.
    ///
    /// # Errors
    ///
    /// Returns [`TerraformError`] when the command fails.
    pub fn destroy(&self) -> Result<String, TerraformError> {
        self.run("destroy", &args::destroy_args(&self.options))
    }

    /// Reads one output value.
    ///
    /// # Errors
    ///
    /// Returns [`TerraformError`] when the key is empty, the command fails, or
    /// the output is missing or empty.
    pub fn output(&self, key: &str) -> Result<String, TerraformError> {
        if key.trim().is_empty() {
            return Err(TerraformError::EmptyKey);
        }
        let stdout = self.run("output", &args::output_args(Some(key)))?;
        parse_output_value(key, &stdout)
    }

    /// Reads every output value keyed by name.
    ///
    /// # Errors
    ///
    /// Returns [`TerraformError`] when the command fails or returns malformed JSON.
    pub fn output_all(&self) -> Result<BTreeMap<String, Value>, TerraformError> {
        let stdout = self.run("output", &args::output_args(None))?;
        parse_output_map(&stdout)
    }

    /// Runs a Terraform command, retrying known transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`TerraformError`] on a fatal failure or when retries are exhausted.
    pub fn run(&self, label: &str, args: &[String]) -> Result<String, TerraformError> {
        if !self.options.dir.is_dir() {
            return Err(TerraformError::MissingDir(self.options.dir.clone()));
        }
        let matchers = compile_retryable(&self.options.retryable_errors)?;
        let policy =
            RetryPolicy::from_retries(self.options.max_retries, self.options.time_between_retries);
        let description = format!("terraform {label}");
        let result = do_with_retry(
            &description,
            &policy,
            self.sleeper.as_ref(),
            self.sink.as_ref(),
            |attempt| match self.run_once(label, args, attempt) {
                Ok(stdout) => Ok(stdout),
                Err(err) => {
                    if is_retryable(&matchers, &err) {
                        Err(Attempt::Retry(err))
                    } else {
                        Err(Attempt::Fatal(err))
                    }
                }
            },
        );
        result.map_err(|err| match err {
            RetryError::Exhausted {
                attempts,
                last,
                ..
            } => TerraformError::RetriesExhausted {
                command: label.to_string(),
                attempts,
                source: Box::new(last),
            },
            RetryError::Fatal {
                error, ..
            } => error,
        })
    }

    /// Runs a single Terraform process and captures its output.
    fn run_once(&self, label: &str, args: &[String], attempt: u32) -> Result<String, TerraformError> {
        let command_line = args.join(" ");
        self.sink.record(
            &StackEvent::new(EVENT_TERRAFORM_COMMAND, EventOutcome::Started)
                .with_subject(label)
                .with_attempt(attempt)
                .with_message(command_line.clone()),
        );
        let output = Command::new(&self.options.binary)
            .args(args)
            .current_dir(&self.options.dir)
            .envs(&self.options.env)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| TerraformError::Spawn {
                binary: self.options.binary.display().to_string(),
                message: err.to_string(),
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            let err = TerraformError::CommandFailed {
                command: command_line,
                code: output.status.code(),
                stdout,
                stderr,
            };
            self.sink.record(
                &StackEvent::new(EVENT_TERRAFORM_COMMAND, EventOutcome::Failed)
                    .with_subject(label)
                    .with_attempt(attempt)
                    .with_message(err.to_string()),
            );
            return Err(err);
        }
        self.sink.record(
            &StackEvent::new(EVENT_TERRAFORM_COMMAND, EventOutcome::Succeeded)
                .with_subject(label)
                .with_attempt(attempt),
        );
        Ok(stdout)
    }
}

// ============================================================================
// SECTION: Retry Classification
// ============================================================================

/// Compiles the retryable error table.
fn compile_retryable(table: &BTreeMap<String, String>) -> Result<Vec<Regex>, TerraformError> {
    table
        .keys()
        .map(|pattern| {
            Regex::new(pattern).map_err(|err| TerraformError::InvalidPattern {
                pattern: pattern.clone(),
                message: err.to_string(),
            })
        })
        .collect()
}

/// Returns true when a failed command's output matches a retryable pattern.
fn is_retryable(matchers: &[Regex], err: &TerraformError) -> bool {
    let TerraformError::CommandFailed {
        stdout,
        stderr,
        ..
    } = err
    else {
        return false;
    };
    matchers.iter().any(|matcher| matcher.is_match(stdout) || matcher.is_match(stderr))
}

// ============================================================================
// SECTION: Output Parsing
// ============================================================================

/// Interprets `terraform output -json <key>` stdout.
///
/// JSON strings yield their content; other values yield compact JSON text.
///
/// # Errors
///
/// Returns [`TerraformError::EmptyOutput`] for blank, null, or empty-string
/// output and [`TerraformError::OutputParse`] for malformed JSON.
pub fn parse_output_value(key: &str, raw: &str) -> Result<String, TerraformError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TerraformError::EmptyOutput(key.to_string()));
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|err| TerraformError::OutputParse(format!("{key}: {err}")))?;
    match value {
        Value::Null => Err(TerraformError::EmptyOutput(key.to_string())),
        Value::String(text) if text.is_empty() => {
            Err(TerraformError::EmptyOutput(key.to_string()))
        }
        Value::String(text) => Ok(text),
        other => Ok(other.to_string()),
    }
}

/// Interprets `terraform output -json` stdout as a name to value map.
///
/// # Errors
///
/// Returns [`TerraformError::OutputParse`] when the document is not an object
/// of `{ "value": ... }` entries.
pub fn parse_output_map(raw: &str) -> Result<BTreeMap<String, Value>, TerraformError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(BTreeMap::new());
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|err| TerraformError::OutputParse(err.to_string()))?;
    let Value::Object(entries) = value else {
        return Err(TerraformError::OutputParse("outputs must be a json object".to_string()));
    };
    entries
        .into_iter()
        .map(|(name, entry)| match entry {
            Value::Object(mut fields) => fields
                .remove("value")
                .map(|value| (name.clone(), value))
                .ok_or_else(|| TerraformError::OutputParse(format!("output {name} has no value"))),
            _ => Err(TerraformError::OutputParse(format!("output {name} must be an object"))),
        })
        .collect()
}
