// system-tests/src/config/mod.rs
// ============================================================================
// Module: System Test Configuration
// Description: Centralized configuration for stack system tests.
// Purpose: Provide typed access to test environment settings and defaults.
// Dependencies: stack-harness
// ============================================================================

//! ## Overview
//! System-test configuration is read from environment variables and mapped into
//! [`stack_harness::StackSettings`] for the OpenSearch suite.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod env;

// ============================================================================
// SECTION: Tests
// ============================================================================


// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use env::DEFAULT_HTTP_RETRIES;
pub use env::DEFAULT_HTTP_DELAY;
pub use env::SystemTestConfig;
pub use env::SystemTestEnv;
pub use env::read_env_strict;
pub use env::workspace_root;
