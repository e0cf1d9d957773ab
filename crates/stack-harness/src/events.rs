// crates/stack-harness/src/events.rs
// ============================================================================
// Module: Stack Events
// Description: Structured lifecycle events for stack provisioning runs.
// Purpose: Emit JSON-line logs without committing to a logging backend.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every Terraform command, retry decision, HTTP attempt, and teardown is
//! reported as a [`StackEvent`]. Sinks decide where the JSON lines go: stderr,
//! an append-only file, memory (tests), or nowhere.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Event Names
// ============================================================================

/// Event emitted around each Terraform command invocation.
pub const EVENT_TERRAFORM_COMMAND: &str = "terraform_command";
/// Event emitted when a failed attempt is scheduled for retry.
pub const EVENT_RETRY: &str = "retry";
/// Event emitted for each HTTP health check attempt.
pub const EVENT_HTTP_ATTEMPT: &str = "http_attempt";
/// Event emitted when the stack is torn down.
pub const EVENT_TEARDOWN: &str = "teardown";
/// Event emitted at lifecycle boundaries.
pub const EVENT_LIFECYCLE: &str = "lifecycle";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome classification attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// The step started.
    Started,
    /// The step completed successfully.
    Succeeded,
    /// The step failed and will be retried.
    Retrying,
    /// The step failed permanently.
    Failed,
    /// The step was skipped by configuration.
    Skipped,
}

/// Structured lifecycle event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Outcome classification.
    pub outcome: EventOutcome,
    /// Command or step label (for example `apply` or a URL).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// One-based attempt number when the step is retried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// HTTP status code for HTTP attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Free-form detail, typically an error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StackEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event: &'static str, outcome: EventOutcome) -> Self {
        Self {
            event,
            timestamp_ms: now_millis(),
            outcome,
            subject: None,
            attempt: None,
            status: None,
            message: None,
        }
    }

    /// Sets the subject label.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the attempt number.
    #[must_use]
    pub const fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Sets the HTTP status code.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink for stack lifecycle events.
pub trait StackEventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &StackEvent);
}

/// Sink that logs JSON lines to stderr.
pub struct StderrEventSink;

impl StackEventSink for StderrEventSink {
    fn record(&self, event: &StackEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl StackEventSink for FileEventSink {
    fn record(&self, event: &StackEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Sink that keeps events in memory.
#[derive(Default)]
pub struct MemoryEventSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<StackEvent>>,
}

impl MemoryEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<StackEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl StackEventSink for MemoryEventSink {
    fn record(&self, event: &StackEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// No-op event sink.
pub struct NoopEventSink;

impl StackEventSink for NoopEventSink {
    fn record(&self, _event: &StackEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current time in milliseconds since the Unix epoch.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}
