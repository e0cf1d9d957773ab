// system-tests/src/lib.rs
// ============================================================================
// Module: Stack System Tests Library
// Description: Shared configuration for live stack system tests.
// Purpose: Provide environment-driven settings for system-test binaries.
// Dependencies: stack-harness
// ============================================================================

//! ## Overview
//! This crate hosts shared configuration used by the system-test binaries in
//! `system-tests/tests`. The suites provision real infrastructure and only
//! build with the `system-tests` feature enabled.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
