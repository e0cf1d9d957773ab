// crates/stack-harness/src/terraform/args.rs
// ============================================================================
// Module: Terraform Arguments
// Description: Argument list construction for Terraform subcommands.
// Purpose: Keep CLI argument formatting pure and unit-testable.
// Dependencies: std
// ============================================================================

//! Pure builders for Terraform argument lists. Variables are emitted in key
//! order so argument lists are deterministic.

use std::collections::BTreeMap;
use std::fmt::Write;

use super::options::TerraformOptions;
use super::options::TerraformVar;

/// Builds `terraform init` arguments.
#[must_use]
pub fn init_args(options: &TerraformOptions) -> Vec<String> {
    let mut args = vec!["init".to_string(), "-upgrade=false".to_string()];
    push_lock(&mut args, options);
    push_no_color(&mut args, options);
    args
}

/// Builds `terraform apply` arguments.
#[must_use]
pub fn apply_args(options: &TerraformOptions) -> Vec<String> {
    let mut args =
        vec!["apply".to_string(), "-input=false".to_string(), "-auto-approve".to_string()];
    push_vars(&mut args, &options.vars);
    push_lock(&mut args, options);
    push_no_color(&mut args, options);
    args
}

/// Builds `terraform destroy` arguments.
#[must_use]
pub fn destroy_args(options: &TerraformOptions) -> Vec<String> {
    let mut args =
        vec!["destroy".to_string(), "-auto-approve".to_string(), "-input=false".to_string()];
    push_vars(&mut args, &options.vars);
    push_lock(&mut args, options);
    push_no_color(&mut args, options);
    args
}

/// Builds `terraform output` arguments; `key = None` lists every output.
#[must_use]
pub fn output_args(key: Option<&str>) -> Vec<String> {
    let mut args = vec!["output".to_string(), "-no-color".to_string(), "-json".to_string()];
    if let Some(key) = key {
        args.push(key.to_string());
    }
    args
}

/// Appends `-var name=value` pairs in key order.
fn push_vars(args: &mut Vec<String>, vars: &BTreeMap<String, TerraformVar>) {
    for (name, value) in vars {
        args.push("-var".to_string());
        args.push(format!("{name}={}", var_to_arg(value)));
    }
}

/// Appends the lock flag.
fn push_lock(args: &mut Vec<String>, options: &TerraformOptions) {
    args.push(format!("-lock={}", options.lock));
}

/// Appends `-no-color` when enabled.
fn push_no_color(args: &mut Vec<String>, options: &TerraformOptions) {
    if options.no_color {
        args.push("-no-color".to_string());
    }
}

/// Renders a top-level variable value.
#[must_use]
pub fn var_to_arg(value: &TerraformVar) -> String {
    match value {
        TerraformVar::String(text) => text.clone(),
        other => to_hcl(other),
    }
}

/// Renders a value as an HCL literal.
fn to_hcl(value: &TerraformVar) -> String {
    match value {
        TerraformVar::Bool(flag) => flag.to_string(),
        TerraformVar::Integer(number) => number.to_string(),
        TerraformVar::Float(number) => number.to_string(),
        TerraformVar::String(text) => quote(text),
        TerraformVar::List(items) => {
            let rendered: Vec<String> = items.iter().map(to_hcl).collect();
            format!("[{}]", rendered.join(", "))
        }
        TerraformVar::Map(entries) => {
            let rendered: Vec<String> = entries
                .iter()
                .map(|(key, value)| format!("{} = {}", quote(key), to_hcl(value)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
    }
}

/// Quotes a string with HCL escapes.
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
