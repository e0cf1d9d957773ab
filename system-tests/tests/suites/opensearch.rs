// system-tests/tests/suites/opensearch.rs
// ============================================================================
// Module: OpenSearch Stack Tests
// Description: Live provisioning test for the OpenSearch example stack.
// Purpose: Confirm the deployed Kibana endpoint serves Kibana, then destroy.
// Dependencies: stack-harness, system-tests helpers
// ============================================================================

use std::sync::Arc;

use stack_harness::ThreadSleeper;
use stack_harness::run_lifecycle;
use system_tests::config::SystemTestConfig;
use system_tests::config::workspace_root;

use crate::helpers::stack_report::StackRunReport;
use crate::helpers::stack_report::TeardownState;

#[test]
fn opensearch_stack_serves_kibana() -> Result<(), Box<dyn std::error::Error>> {
    let config = SystemTestConfig::load()?;
    let settings = config.stack_settings(&workspace_root());
    settings.validate()?;
    let mut report = StackRunReport::new("opensearch_stack_serves_kibana", &config, &settings)?;

    let result = run_lifecycle(&settings, report.sink(), Arc::new(ThreadSleeper));
    report.finish(&result)?;
    let lifecycle = result?;

    assert_eq!(lifecycle.status, settings.check.expected_status);
    let expected_teardown = if settings.terraform.skip_destroy {
        TeardownState::Skipped
    } else {
        TeardownState::Destroyed
    };
    assert_eq!(
        report.teardown(),
        expected_teardown,
        "see {}",
        report.root().join("summary.md").display()
    );
    Ok(())
}
