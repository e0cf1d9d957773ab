// crates/stack-harness/src/terraform/mod.rs
// ============================================================================
// Module: Terraform
// Description: Terraform CLI wrapper with transient-failure retries.
// Purpose: Run init/apply/output/destroy against one working directory.
// Dependencies: regex, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`TerraformRunner`] shells out to the Terraform CLI with arguments built
//! from [`TerraformOptions`]. Failed commands are retried only when their
//! combined output matches a retryable error pattern; everything else fails on
//! the first attempt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod args;
pub mod options;
mod runner;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use options::DEFAULT_RETRYABLE_ERRORS;
pub use options::TerraformOptions;
pub use options::TerraformVar;
pub use runner::TerraformRunner;
pub use runner::parse_output_map;
pub use runner::parse_output_value;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Maximum number of output bytes quoted in error messages.
const ERROR_EXCERPT_BYTES: usize = 2048;

/// Terraform invocation errors.
#[derive(Debug, Error)]
pub enum TerraformError {
    /// The working directory does not exist.
    #[error("terraform directory does not exist: {}", .0.display())]
    MissingDir(PathBuf),
    /// A retryable error pattern is not a valid regex.
    #[error("invalid retryable error pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// Regex compiler message.
        message: String,
    },
    /// The Terraform process could not be started.
    #[error("failed to spawn {binary}: {message}")]
    Spawn {
        /// Executable that failed to start.
        binary: String,
        /// OS error message.
        message: String,
    },
    /// Terraform exited unsuccessfully.
    #[error("terraform {command} exited with {}: {}", exit_label(.code), excerpt(.stdout, .stderr))]
    CommandFailed {
        /// Full argument list.
        command: String,
        /// Exit code, absent when killed by a signal.
        code: Option<i32>,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
    },
    /// Every attempt failed with a retryable error.
    #[error("terraform {command} unsuccessful after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Subcommand label.
        command: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        source: Box<TerraformError>,
    },
    /// Output JSON could not be interpreted.
    #[error("terraform output parse failed: {0}")]
    OutputParse(String),
    /// Output exists but carries no value.
    #[error("terraform output '{0}' is empty")]
    EmptyOutput(String),
    /// Output key was empty.
    #[error("terraform output key must be non-empty")]
    EmptyKey,
}

/// Formats an exit code for error messages.
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |code| format!("code {code}"))
}

/// Returns the tail of the most informative output stream.
fn excerpt(stdout: &str, stderr: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    let trimmed = source.trim();
    if trimmed.len() <= ERROR_EXCERPT_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - ERROR_EXCERPT_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}
