// crates/stack-harness/src/tests/mod.rs
// ============================================================================
// Module: Stack Harness Unit Tests
// Description: Unit coverage for argument formatting, retry, config, and events.
// Purpose: Exercise pure logic without spawning Terraform or opening sockets.
// Dependencies: stack-harness
// ============================================================================

//! ## Overview
//! Unit tests for pure helpers. Process- and network-backed behavior lives in
//! the crate's `tests/` directory.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions favor direct unwrap/expect for clarity."
)]
