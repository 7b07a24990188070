//! Shared output formatting for questlog CLI commands.

use serde::Serialize;

use crate::error::{Error, JsonError, Result};

pub const SCHEMA_VERSION: &str = "questlog.v1";

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Human-readable report: a header, key/value summary, then free-form
/// sections.
#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let warnings = human.map(|h| h.warnings.clone()).unwrap_or_default();

        #[derive(Serialize)]
        struct Envelope<'a, T: Serialize> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            data: &'a T,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            warnings: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data,
            warnings,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if options.quiet {
        return Ok(());
    }

    if let Some(human) = human {
        println!("{}", format_human(human));
    }

    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let hint = error_hint(err);
    if json {
        #[derive(Serialize)]
        struct Envelope<'a> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            error: JsonError,
            #[serde(skip_serializing_if = "Option::is_none")]
            hint: Option<&'static str>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            error: JsonError::from(err),
            hint,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(hint) = hint {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = vec![output.header.clone()];

    if !output.summary.is_empty() {
        lines.push(String::new());
        for (key, value) in &output.summary {
            if value.is_empty() {
                lines.push(format!("  {key}"));
            } else {
                lines.push(format!("  {key}: {value}"));
            }
        }
    }

    push_section(&mut lines, None, &output.details);
    push_section(&mut lines, Some("Warnings"), &output.warnings);
    push_section(&mut lines, Some("Next"), &output.next_steps);

    lines.join("\n")
}

/// First non-flag argument, used to label error envelopes before clap runs.
pub fn infer_command_name_from_args() -> String {
    std::env::args()
        .skip(1)
        .find(|arg| !arg.starts_with('-'))
        .unwrap_or_else(|| "questlog".to_string())
}

fn error_hint(err: &Error) -> Option<&'static str> {
    match err {
        Error::NoSession => Some("questlog login <email>"),
        Error::NotFound(_) => Some("questlog list"),
        Error::InvalidConfig(_) => Some("fix .questlog.toml then retry"),
        Error::LockFailed(_) => Some("another questlog process holds the store; retry"),
        _ => None,
    }
}

fn push_section(lines: &mut Vec<String>, title: Option<&str>, items: &[String]) {
    if items.is_empty() {
        return;
    }

    lines.push(String::new());
    if let Some(title) = title {
        lines.push(format!("{title}:"));
    }
    for item in items {
        lines.push(format!("  {item}"));
    }
}
