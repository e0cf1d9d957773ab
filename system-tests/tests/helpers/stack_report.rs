// system-tests/tests/helpers/stack_report.rs
// ============================================================================
// Module: Stack Run Report
// Description: Per-run artifacts for live stack system-tests.
// Purpose: Record the lifecycle result and teardown state of each run.
// Dependencies: stack-harness, system-tests, serde, serde_jcs
// ============================================================================

use std::fmt::Write;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use stack_harness::LifecycleReport;
use stack_harness::StackError;
use stack_harness::StackEvent;
use stack_harness::StackEventSink;
use stack_harness::StackSettings;
use stack_harness::TerraformVar;
use stack_harness::events::EVENT_TEARDOWN;
use stack_harness::events::EventOutcome;
use stack_harness::events::FileEventSink;
use system_tests::config::SystemTestConfig;
use system_tests::config::workspace_root;

const EVENTS_FILE: &str = "events.jsonl";

/// Final state of the stack as seen through teardown events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownState {
    NotRun,
    Interrupted,
    Destroyed,
    Skipped,
    Failed,
}

impl TeardownState {
    fn from_outcome(outcome: Option<EventOutcome>) -> Self {
        match outcome {
            None => Self::NotRun,
            Some(EventOutcome::Succeeded) => Self::Destroyed,
            Some(EventOutcome::Skipped) => Self::Skipped,
            Some(EventOutcome::Failed) => Self::Failed,
            Some(EventOutcome::Started | EventOutcome::Retrying) => Self::Interrupted,
        }
    }
}

#[derive(Debug, Serialize)]
struct StackRunSummary {
    test_name: String,
    status: &'static str,
    stack_dir: String,
    cluster_domain: Option<String>,
    output_key: String,
    endpoint: Option<String>,
    url: Option<String>,
    http_status: Option<u16>,
    attempts: Option<u32>,
    teardown: TeardownState,
    error: Option<String>,
    started_at_ms: u128,
    duration_ms: u128,
}

/// Event sink that appends to the run's event log and tracks teardown.
struct RunEventSink {
    file: FileEventSink,
    teardown: Mutex<Option<EventOutcome>>,
}

impl RunEventSink {
    fn teardown_state(&self) -> TeardownState {
        TeardownState::from_outcome(self.teardown.lock().ok().and_then(|last| *last))
    }
}

impl StackEventSink for RunEventSink {
    fn record(&self, event: &StackEvent) {
        if event.event == EVENT_TEARDOWN
            && let Ok(mut last) = self.teardown.lock()
        {
            *last = Some(event.outcome);
        }
        self.file.record(event);
    }
}

/// Collects events for one stack run and writes its summary when finished.
///
/// A run dropped without [`StackRunReport::finish`] (for example on panic)
/// still writes a summary with whatever teardown state was observed.
pub struct StackRunReport {
    root: PathBuf,
    test_name: String,
    stack_dir: String,
    cluster_domain: Option<String>,
    output_key: String,
    sink: Arc<RunEventSink>,
    started_at_ms: u128,
    finalized: bool,
}

impl StackRunReport {
    /// Creates the run directory and event log for the named test.
    pub fn new(
        test_name: &str,
        config: &SystemTestConfig,
        settings: &StackSettings,
    ) -> io::Result<Self> {
        let root = config
            .run_root
            .as_ref()
            .map_or_else(|| default_run_root(test_name), |root| root.join(test_name));
        fs::create_dir_all(&root)?;
        let sink = RunEventSink {
            file: FileEventSink::new(&root.join(EVENTS_FILE))?,
            teardown: Mutex::new(None),
        };
        let cluster_domain = match settings.terraform.vars.get("cluster_domain") {
            Some(TerraformVar::String(domain)) => Some(domain.clone()),
            _ => None,
        };
        Ok(Self {
            root,
            test_name: test_name.to_string(),
            stack_dir: settings.terraform.dir.display().to_string(),
            cluster_domain,
            output_key: settings.check.output_key.clone(),
            sink: Arc::new(sink),
            started_at_ms: now_millis(),
            finalized: false,
        })
    }

    /// Returns the sink the lifecycle should report to.
    pub fn sink(&self) -> Arc<dyn StackEventSink> {
        Arc::clone(&self.sink) as Arc<dyn StackEventSink>
    }

    /// Returns the directory holding this run's artifacts.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the teardown state observed so far.
    pub fn teardown(&self) -> TeardownState {
        self.sink.teardown_state()
    }

    /// Writes `summary.json` and `summary.md` for a finished lifecycle.
    pub fn finish(&mut self, result: &Result<LifecycleReport, StackError>) -> io::Result<()> {
        let summary = match result {
            Ok(report) => self.summary("pass", Some(report), None),
            Err(err) => self.summary("fail", None, Some(err.to_string())),
        };
        self.write(&summary)?;
        self.finalized = true;
        Ok(())
    }

    fn summary(
        &self,
        status: &'static str,
        report: Option<&LifecycleReport>,
        error: Option<String>,
    ) -> StackRunSummary {
        StackRunSummary {
            test_name: self.test_name.clone(),
            status,
            stack_dir: self.stack_dir.clone(),
            cluster_domain: self.cluster_domain.clone(),
            output_key: self.output_key.clone(),
            endpoint: report.map(|report| report.endpoint.clone()),
            url: report.map(|report| report.url.clone()),
            http_status: report.map(|report| report.status),
            attempts: report.map(|report| report.attempts),
            teardown: self.teardown(),
            error,
            started_at_ms: self.started_at_ms,
            duration_ms: now_millis().saturating_sub(self.started_at_ms),
        }
    }

    fn write(&self, summary: &StackRunSummary) -> io::Result<()> {
        let json = serde_jcs::to_vec(summary).map_err(|err| io::Error::other(err.to_string()))?;
        fs::write(self.root.join("summary.json"), json)?;
        fs::write(self.root.join("summary.md"), summary_markdown(summary))
    }
}

impl Drop for StackRunReport {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        let status = if std::thread::panicking() { "panic" } else { "incomplete" };
        let summary =
            self.summary(status, None, Some("run ended without a lifecycle result".to_string()));
        let _ = self.write(&summary);
    }
}

fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

fn default_run_root(test_name: &str) -> PathBuf {
    workspace_root()
        .join("target/system-tests")
        .join(format!("run_{}", now_millis()))
        .join(test_name)
}

fn summary_markdown(summary: &StackRunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", summary.test_name);
    let _ = writeln!(out, "- Status: {}", summary.status);
    let _ = writeln!(out, "- Stack: {}", summary.stack_dir);
    if let Some(domain) = &summary.cluster_domain {
        let _ = writeln!(out, "- Cluster domain: {domain}");
    }
    match (&summary.endpoint, &summary.url) {
        (Some(endpoint), Some(url)) => {
            let _ = writeln!(out, "- {}: {endpoint} (checked {url})", summary.output_key);
        }
        _ => {
            let _ = writeln!(out, "- {}: not read", summary.output_key);
        }
    }
    if let (Some(status), Some(attempts)) = (summary.http_status, summary.attempts) {
        let _ = writeln!(out, "- Health check: HTTP {status} after {attempts} attempt(s)");
    }
    let _ = writeln!(out, "- Teardown: {:?}", summary.teardown);
    if let Some(error) = &summary.error {
        let _ = writeln!(out, "- Error: {error}");
    }
    let _ = writeln!(out, "- Duration (ms): {}", summary.duration_ms);
    let _ = writeln!(out, "- Events: {EVENTS_FILE}");
    out
}
