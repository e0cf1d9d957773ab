// crates/stack-cli/src/main.rs
// ============================================================================
// Module: Stack Check CLI Entry Point
// Description: Command dispatcher for Terraform stack provisioning and checks.
// Purpose: Run apply, output, verify, destroy, and full lifecycle from a shell.
// Dependencies: clap, serde, serde_jcs, serde_json, stack-harness, thiserror.
// ============================================================================

//! ## Overview
//! `stack-check` drives the stack harness from the command line. Every
//! subcommand loads [`StackSettings`] (flag, `STACK_CHECK_CONFIG`, or
//! `stack-check.toml`) and reports lifecycle events as JSON lines on stderr,
//! to a file (`--events`), or nowhere (`--quiet`). Results go to stdout as
//! canonical JSON.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use serde_json::Value;
use stack_harness::HttpCheckOutcome;
use stack_harness::LifecycleReport;
use stack_harness::StackEventSink;
use stack_harness::StackSettings;
use stack_harness::TerraformRunner;
use stack_harness::ThreadSleeper;
use stack_harness::events::FileEventSink;
use stack_harness::events::NoopEventSink;
use stack_harness::events::StderrEventSink;
use stack_harness::run_lifecycle;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "stack-check", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Append JSON event lines to this file instead of stderr.
    #[arg(long, value_name = "PATH", global = true, conflicts_with = "quiet")]
    events: Option<PathBuf>,
    /// Discard lifecycle events.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run `terraform init` and `terraform apply`.
    Apply(ConfigArgs),
    /// Print one Terraform output, or all outputs as JSON.
    Output(OutputCommand),
    /// Check the stack endpoint over HTTP.
    Verify(VerifyCommand),
    /// Run `terraform destroy`.
    Destroy(ConfigArgs),
    /// Apply, verify, and destroy in one step.
    Run(RunCommand),
    /// Settings utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Settings location shared by every subcommand.
#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// Optional settings file (defaults to stack-check.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `output`.
#[derive(Args, Debug)]
struct OutputCommand {
    /// Settings location.
    #[command(flatten)]
    config: ConfigArgs,
    /// Output name; omit to print every output.
    #[arg(long, value_name = "NAME")]
    key: Option<String>,
}

/// Arguments for `verify`.
#[derive(Args, Debug)]
struct VerifyCommand {
    /// Settings location.
    #[command(flatten)]
    config: ConfigArgs,
    /// URL to check instead of the configured Terraform output.
    #[arg(long, value_name = "URL")]
    url: Option<String>,
}

/// Arguments for `run`.
#[derive(Args, Debug)]
struct RunCommand {
    /// Settings location.
    #[command(flatten)]
    config: ConfigArgs,
    /// Leave the stack running after the check.
    #[arg(long, action = ArgAction::SetTrue)]
    keep: bool,
}

/// Settings subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate settings.
    Validate(ConfigArgs),
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Health check summary printed by `verify` and `run`.
#[derive(Debug, Serialize)]
struct CheckSummary {
    /// Endpoint read from Terraform outputs, when one was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    /// URL that was checked.
    url: String,
    /// Status of the accepted response.
    status: u16,
    /// Attempts used.
    attempts: u32,
}

impl CheckSummary {
    /// Summarizes a standalone check.
    fn from_outcome(endpoint: Option<String>, url: String, outcome: &HttpCheckOutcome) -> Self {
        Self {
            endpoint,
            url,
            status: outcome.response.status,
            attempts: outcome.attempts,
        }
    }
}

impl From<LifecycleReport> for CheckSummary {
    fn from(report: LifecycleReport) -> Self {
        Self {
            endpoint: Some(report.endpoint),
            url: report.url,
            status: report.status,
            attempts: report.attempts,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a display message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("stack-check {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let sink = build_sink(cli.events.as_deref(), cli.quiet)?;
    match command {
        Commands::Apply(args) => command_apply(&args, sink),
        Commands::Output(command) => command_output(&command, sink),
        Commands::Verify(command) => command_verify(&command, sink),
        Commands::Destroy(args) => command_destroy(&args, sink),
        Commands::Run(command) => command_run(&command, sink),
        Commands::Config {
            command,
        } => command_config(command),
    }
}

/// Emits the top-level help message for the CLI.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

/// Selects the event sink from global flags.
fn build_sink(events: Option<&Path>, quiet: bool) -> CliResult<Arc<dyn StackEventSink>> {
    if quiet {
        return Ok(Arc::new(NoopEventSink));
    }
    match events {
        Some(path) => {
            let sink = FileEventSink::new(path).map_err(|err| {
                CliError::new(format!("failed to open event log {}: {err}", path.display()))
            })?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrEventSink)),
    }
}

/// Loads settings for a subcommand.
fn load_settings(args: &ConfigArgs) -> CliResult<StackSettings> {
    StackSettings::load(args.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load settings: {err}")))
}

/// Builds a Terraform runner from settings.
fn runner_for(settings: &StackSettings, sink: Arc<dyn StackEventSink>) -> TerraformRunner {
    TerraformRunner::new(settings.terraform_options(), sink)
}

// ============================================================================
// SECTION: Terraform Commands
// ============================================================================

/// Executes `apply`.
fn command_apply(args: &ConfigArgs, sink: Arc<dyn StackEventSink>) -> CliResult<ExitCode> {
    let settings = load_settings(args)?;
    let stdout = runner_for(&settings, sink)
        .init_and_apply()
        .map_err(|err| CliError::new(format!("apply failed: {err}")))?;
    write_stdout_text(&stdout)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `destroy`.
fn command_destroy(args: &ConfigArgs, sink: Arc<dyn StackEventSink>) -> CliResult<ExitCode> {
    let settings = load_settings(args)?;
    let stdout = runner_for(&settings, sink)
        .destroy()
        .map_err(|err| CliError::new(format!("destroy failed: {err}")))?;
    write_stdout_text(&stdout)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `output`.
fn command_output(command: &OutputCommand, sink: Arc<dyn StackEventSink>) -> CliResult<ExitCode> {
    let settings = load_settings(&command.config)?;
    let runner = runner_for(&settings, sink);
    match &command.key {
        Some(key) => {
            let value = runner
                .output(key)
                .map_err(|err| CliError::new(format!("output failed: {err}")))?;
            write_stdout_line(&value).map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        None => {
            let outputs = runner
                .output_all()
                .map_err(|err| CliError::new(format!("output failed: {err}")))?;
            let value = Value::Object(outputs.into_iter().collect());
            write_json(&value)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Check Commands
// ============================================================================

/// Executes `verify`.
fn command_verify(command: &VerifyCommand, sink: Arc<dyn StackEventSink>) -> CliResult<ExitCode> {
    let settings = load_settings(&command.config)?;
    let (endpoint, check) = match &command.url {
        Some(url) => (None, settings.http_check_url(url)),
        None => {
            let endpoint = runner_for(&settings, Arc::clone(&sink))
                .output(&settings.check.output_key)
                .map_err(|err| CliError::new(format!("output failed: {err}")))?;
            let check = settings.http_check(&endpoint);
            (Some(endpoint), check)
        }
    };
    let check = check.map_err(|err| CliError::new(format!("invalid check: {err}")))?;
    let outcome = check
        .run(&ThreadSleeper, sink.as_ref())
        .map_err(|err| CliError::new(format!("verify failed: {err}")))?;
    write_json(&CheckSummary::from_outcome(endpoint, check.url().to_string(), &outcome))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `run`.
fn command_run(command: &RunCommand, sink: Arc<dyn StackEventSink>) -> CliResult<ExitCode> {
    let mut settings = load_settings(&command.config)?;
    if command.keep {
        settings.terraform.skip_destroy = true;
    }
    let report = run_lifecycle(&settings, sink, Arc::new(ThreadSleeper))
        .map_err(|err| CliError::new(format!("run failed: {err}")))?;
    write_json(&CheckSummary::from(report))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(args) => command_config_validate(&args),
    }
}

/// Executes the config validation command.
fn command_config_validate(args: &ConfigArgs) -> CliResult<ExitCode> {
    let settings = load_settings(args)?;
    let source = settings
        .source
        .as_ref()
        .map_or_else(|| "built-in defaults".to_string(), |path| path.display().to_string());
    write_stdout_line(&format!("settings ok ({source})"))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Renders a value as canonical JSON.
fn render_json<T: Serialize>(value: &T) -> CliResult<String> {
    let bytes = serde_jcs::to_vec(value)
        .map_err(|err| CliError::new(format!("json serialization failed: {err}")))?;
    String::from_utf8(bytes)
        .map_err(|err| CliError::new(format!("json serialization failed: {err}")))
}

/// Writes canonical JSON to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered = render_json(value)?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes captured command output to stdout, adding a final newline if needed.
fn write_stdout_text(text: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    let result = if text.ends_with('\n') || text.is_empty() {
        stdout.write_all(text.as_bytes())
    } else {
        writeln!(&mut stdout, "{text}")
    };
    result.map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
