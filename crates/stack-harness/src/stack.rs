// crates/stack-harness/src/stack.rs
// ============================================================================
// Module: Stack Lifecycle
// Description: Provision, verify, and destroy a Terraform stack.
// Purpose: Guarantee teardown once provisioning has been attempted.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`StackGuard`] owns a [`TerraformRunner`] and destroys the stack when it is
//! dropped, so teardown happens on success, early return, and panic alike.
//! [`run_lifecycle`] is the full apply, read endpoint, health check, destroy
//! sequence driven by [`StackSettings`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigError;
use crate::config::StackSettings;
use crate::events::EVENT_LIFECYCLE;
use crate::events::EVENT_TEARDOWN;
use crate::events::EventOutcome;
use crate::events::StackEvent;
use crate::events::StackEventSink;
use crate::http_check::HttpCheckError;
use crate::retry::Sleeper;
use crate::terraform::TerraformError;
use crate::terraform::TerraformRunner;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum StackError {
    /// Settings were invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Provisioning or output retrieval failed.
    #[error(transparent)]
    Terraform(#[from] TerraformError),
    /// The health check failed.
    #[error(transparent)]
    Http(#[from] HttpCheckError),
    /// Destroying the stack failed.
    #[error("stack teardown failed: {0}")]
    Teardown(TerraformError),
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Destroys the stack when dropped unless already torn down or told to keep it.
pub struct StackGuard {
    /// Runner for the stack's Terraform directory.
    runner: TerraformRunner,
    /// Leave the stack running after the guard goes away.
    skip_destroy: bool,
    /// Teardown already happened.
    torn_down: bool,
}

impl StackGuard {
    /// Registers teardown for the runner's stack without provisioning.
    const fn new(runner: TerraformRunner, skip_destroy: bool) -> Self {
        Self {
            runner,
            skip_destroy,
            torn_down: false,
        }
    }

    /// Registers teardown, then runs `init` and `apply`.
    ///
    /// When apply fails the guard is dropped before returning, which destroys
    /// whatever was partially created.
    ///
    /// # Errors
    ///
    /// Returns [`TerraformError`] when init or apply fails.
    pub fn provision(runner: TerraformRunner, skip_destroy: bool) -> Result<Self, TerraformError> {
        let guard = Self::new(runner, skip_destroy);
        guard.runner.sink().record(
            &StackEvent::new(EVENT_LIFECYCLE, EventOutcome::Started)
                .with_subject(guard.runner.options().dir.display().to_string()),
        );
        guard.runner.init_and_apply()?;
        Ok(guard)
    }

    /// Reads one output of the provisioned stack.
    ///
    /// # Errors
    ///
    /// Returns [`TerraformError`] when the output is missing or empty.
    pub fn output(&self, key: &str) -> Result<String, TerraformError> {
        self.runner.output(key)
    }

    /// Destroys the stack now and reports the result.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Teardown`] when destroy fails.
    pub fn teardown(mut self) -> Result<(), StackError> {
        self.torn_down = true;
        self.destroy().map_err(StackError::Teardown)
    }

    /// Runs destroy unless configured to keep the stack, recording the outcome.
    fn destroy(&self) -> Result<(), TerraformError> {
        let subject = self.runner.options().dir.display().to_string();
        if self.skip_destroy {
            self.runner.sink().record(
                &StackEvent::new(EVENT_TEARDOWN, EventOutcome::Skipped).with_subject(subject),
            );
            return Ok(());
        }
        self.runner
            .sink()
            .record(&StackEvent::new(EVENT_TEARDOWN, EventOutcome::Started).with_subject(&subject));
        match self.runner.destroy() {
            Ok(_) => {
                self.runner.sink().record(
                    &StackEvent::new(EVENT_TEARDOWN, EventOutcome::Succeeded).with_subject(subject),
                );
                Ok(())
            }
            Err(err) => {
                self.runner.sink().record(
                    &StackEvent::new(EVENT_TEARDOWN, EventOutcome::Failed)
                        .with_subject(subject)
                        .with_message(err.to_string()),
                );
                Err(err)
            }
        }
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let _ = self.destroy();
    }
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Result of a completed lifecycle run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Endpoint read from the stack outputs.
    pub endpoint: String,
    /// URL the health check targeted.
    pub url: String,
    /// Status of the accepted response.
    pub status: u16,
    /// Health check attempts used.
    pub attempts: u32,
}

/// Provisions the stack, checks its endpoint, and tears it down.
///
/// Teardown runs whether or not the check passes.
///
/// # Errors
///
/// Returns [`StackError`] for the first failing step; a teardown failure after
/// a passing check is reported as [`StackError::Teardown`].
pub fn run_lifecycle(
    settings: &StackSettings,
    sink: Arc<dyn StackEventSink>,
    sleeper: Arc<dyn Sleeper>,
) -> Result<LifecycleReport, StackError> {
    let runner = TerraformRunner::new(settings.terraform_options(), Arc::clone(&sink))
        .with_sleeper(Arc::clone(&sleeper));
    let guard = StackGuard::provision(runner, settings.terraform.skip_destroy)?;
    let endpoint = guard.output(&settings.check.output_key)?;
    let check = settings.http_check(&endpoint)?;
    let outcome = check.run(sleeper.as_ref(), sink.as_ref())?;
    guard.teardown()?;
    let report = LifecycleReport {
        endpoint,
        url: check.url().to_string(),
        status: outcome.response.status,
        attempts: outcome.attempts,
    };
    sink.record(
        &StackEvent::new(EVENT_LIFECYCLE, EventOutcome::Succeeded)
            .with_subject(report.url.clone())
            .with_status(report.status)
            .with_attempt(report.attempts),
    );
    Ok(report)
}
