// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared helpers for stack system-tests.
// Purpose: Record per-run events and lifecycle summaries.
// Dependencies: stack-harness, system-tests, serde, serde_jcs
// ============================================================================

//! ## Overview
//! Shared helpers for stack system-tests.

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

pub mod stack_report;
