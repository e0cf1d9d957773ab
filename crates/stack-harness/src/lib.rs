// crates/stack-harness/src/lib.rs
// ============================================================================
// Module: Stack Harness
// Description: Provision, verify, and tear down infrastructure stacks.
// Purpose: Drive Terraform and HTTP health checks for stack verification.
// Dependencies: regex, reqwest, serde, serde_json, thiserror, toml
// ============================================================================

//! ## Overview
//! This crate wraps the Terraform CLI, a bounded fixed-delay retry helper, and
//! an HTTP health checker, and ties them together with a lifecycle guard that
//! destroys provisioned infrastructure whenever it goes out of scope.
//! Invariants:
//! - Teardown is registered before apply and runs regardless of outcome.
//! - Terraform commands are retried only for known transient failures.
//! - Lifecycle events are emitted through a [`StackEventSink`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod events;
pub mod http_check;
pub mod retry;
pub mod stack;
pub mod terraform;

#[cfg(test)]
mod tests;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::StackSettings;
pub use events::StackEvent;
pub use events::StackEventSink;
pub use http_check::BodyExpectation;
pub use http_check::HttpCheck;
pub use http_check::HttpCheckError;
pub use http_check::HttpCheckOutcome;
pub use retry::RetryError;
pub use retry::RetryPolicy;
pub use retry::Sleeper;
pub use retry::ThreadSleeper;
pub use stack::LifecycleReport;
pub use stack::StackError;
pub use stack::StackGuard;
pub use stack::run_lifecycle;
pub use terraform::TerraformError;
pub use terraform::TerraformOptions;
pub use terraform::TerraformRunner;
pub use terraform::TerraformVar;
