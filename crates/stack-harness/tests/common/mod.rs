// crates/stack-harness/tests/common/mod.rs
// ============================================================================
// Module: Stack Harness Test Helpers
// Description: Fake Terraform executable, recording sleeper, and HTTP fixtures.
// Purpose: Drive the harness end to end without cloud credentials.
// Dependencies: stack-harness, tempfile, tiny_http
// ============================================================================

//! ## Overview
//! [`FakeTerraform`] writes a POSIX shell script that understands the
//! subcommands the harness issues and logs each invocation. Behavior is
//! selected through `FAKE_TF_*` variables passed in `TerraformOptions::env`,
//! so tests never mutate the process environment.

#![allow(dead_code, reason = "Helpers are shared across several test binaries.")]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::thread;
use std::time::Duration;

use stack_harness::Sleeper;
use stack_harness::TerraformOptions;
use tempfile::TempDir;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Process Lock
// ============================================================================

/// Serializes tests that write and execute scripts.
///
/// A script opened for writing in one thread can be inherited by a child
/// forked from another, which makes exec fail with `ETXTBSY`.
static SCRIPT_LOCK: Mutex<()> = Mutex::new(());

/// Acquires the script lock, recovering from poisoned state.
pub fn script_lock() -> MutexGuard<'static, ()> {
    SCRIPT_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ============================================================================
// SECTION: Fake Terraform
// ============================================================================

const FAKE_TERRAFORM: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_TF_LOG"
case "$1" in
  init)
    echo "Terraform has been successfully initialized!"
    ;;
  apply)
    if [ -n "$FAKE_TF_APPLY_FLAKES" ]; then
      count=$(cat "$FAKE_TF_STATE/apply_count" 2>/dev/null || echo 0)
      count=$((count + 1))
      echo "$count" > "$FAKE_TF_STATE/apply_count"
      if [ "$count" -le "$FAKE_TF_APPLY_FLAKES" ]; then
        echo "Error: timeout while waiting for plugin to start" >&2
        exit 1
      fi
    fi
    if [ -n "$FAKE_TF_APPLY_FAIL" ]; then
      echo "Error: $FAKE_TF_APPLY_FAIL" >&2
      exit 1
    fi
    echo "Apply complete! Resources: 2 added, 0 changed, 0 destroyed."
    ;;
  output)
    if [ "$#" -le 3 ]; then
      if [ -n "$FAKE_TF_OUTPUTS" ]; then
        printf '%s\n' "$FAKE_TF_OUTPUTS"
      else
        echo "{}"
      fi
    elif [ -n "$FAKE_TF_OUTPUT" ]; then
      printf '%s\n' "$FAKE_TF_OUTPUT"
    else
      echo "Error: Output \"$4\" not found" >&2
      exit 1
    fi
    ;;
  destroy)
    if [ -n "$FAKE_TF_DESTROY_FAIL" ]; then
      echo "Error: $FAKE_TF_DESTROY_FAIL" >&2
      exit 1
    fi
    echo "Destroy complete! Resources: 2 destroyed."
    ;;
  *)
    echo "unexpected subcommand: $1" >&2
    exit 2
    ;;
esac
"#;

/// Temporary Terraform working directory backed by a fake executable.
pub struct FakeTerraform {
    /// Holds the script, stack directory, log, and state.
    root: TempDir,
}

impl FakeTerraform {
    /// Writes the fake executable and an empty stack directory.
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("stack")).unwrap();
        fs::create_dir_all(root.path().join("state")).unwrap();
        let script = root.path().join("terraform");
        fs::write(&script, FAKE_TERRAFORM).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        Self {
            root,
        }
    }

    /// Path of the fake executable.
    pub fn binary(&self) -> PathBuf {
        self.root.path().join("terraform")
    }

    /// Terraform working directory.
    pub fn stack_dir(&self) -> PathBuf {
        self.root.path().join("stack")
    }

    /// Invocation log path.
    pub fn log_path(&self) -> PathBuf {
        self.root.path().join("invocations.log")
    }

    /// Options pointing at the fake executable with logging wired up.
    pub fn options(&self) -> TerraformOptions {
        TerraformOptions::new(self.stack_dir())
            .with_binary(self.binary())
            .with_env("FAKE_TF_LOG", self.log_path().display().to_string())
            .with_env("FAKE_TF_STATE", self.root.path().join("state").display().to_string())
    }

    /// Logged argument lists, one per invocation.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Logged subcommands in invocation order.
    pub fn subcommands(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .filter_map(|line| line.split_whitespace().next().map(str::to_string))
            .collect()
    }
}

// ============================================================================
// SECTION: Sleeper
// ============================================================================

/// Sleeper that records delays without blocking.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Recorded delays in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

// ============================================================================
// SECTION: HTTP Fixtures
// ============================================================================

/// Serves the given `(status, body)` responses in order, one per request.
///
/// Returns the base URL and a handle that yields the number of requests served.
pub fn serve_sequence(responses: Vec<(u16, String)>) -> (String, thread::JoinHandle<usize>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let handle = thread::spawn(move || {
        let mut served = 0;
        for (status, body) in responses {
            let Ok(Some(request)) = server.recv_timeout(Duration::from_secs(10)) else {
                break;
            };
            let _ = request.respond(Response::from_string(body).with_status_code(status));
            served += 1;
        }
        served
    });
    (format!("http://{addr}"), handle)
}
