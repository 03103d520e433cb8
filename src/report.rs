//! Console output and report files for finished scenario runs.

use crate::model::{ResultScenario, ResultStep, StepType};
use anyhow::Result;
use chrono::Utc;
use clap::ValueEnum;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Json,
    Yaml,
    Text,
}

impl ReportFormat {
    fn extension(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Yaml => "yaml",
            ReportFormat::Text => "txt",
        }
    }
}

fn step_label(step: &ResultStep) -> String {
    match (&step.step_type, &step.request) {
        (StepType::Request, Some(request)) => request.to_string(),
        (step_type, _) => step_type.to_string(),
    }
}

/// Log a scenario result, one line per step.
pub fn print_result(result: &ResultScenario, verbose: bool) {
    let status = if result.success {
        "\x1b[32mPASS\x1b[0m"
    } else {
        "\x1b[31mFAIL\x1b[0m"
    };
    info!(
        "{} scenario: {} ({} ms)",
        status,
        result.name,
        result.duration.as_millis()
    );

    for (i, step) in result.steps.iter().enumerate() {
        let step_status = if step.is_success() {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        info!(
            "  {}. {} {} ({} ms)",
            i + 1,
            step_status,
            step_label(step),
            step.step_time.as_millis()
        );

        for assertion in step.assertions.iter().filter(|a| !a.success) {
            error!("     \x1b[31mAssertion failed: {}\x1b[0m", assertion.message);
        }
        for variable in step.variables_created.iter().filter(|v| v.is_error()) {
            error!("     \x1b[31mVariable: {}\x1b[0m", variable);
        }

        if verbose {
            for variable in &step.variables_applied {
                debug!("     Used {}", variable);
            }
            if let Some(response) = &step.response {
                debug!("     Response: Status {}", response.status_code);
                debug!("     Response body: {}", truncate(&response.raw_body, 500));
            }
        }
    }

    if let Some(err) = &result.error {
        error!("  \x1b[31mError: {}\x1b[0m", err);
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &text[..end])
}

/// Plain-text rendering used for `.txt` reports.
pub fn render_text(result: &ResultScenario) -> String {
    let mut content = String::new();
    let _ = writeln!(content, "Scenario: {}", result.name);
    if let Some(description) = &result.description {
        let _ = writeln!(content, "Description: {description}");
    }
    let _ = writeln!(
        content,
        "Status: {}",
        if result.success { "PASS" } else { "FAIL" }
    );
    if let Some(error) = &result.error {
        let _ = writeln!(content, "Error: {error}");
    }
    let _ = writeln!(content, "Duration: {} ms\n", result.duration.as_millis());
    let _ = writeln!(content, "Steps:");

    for (i, step) in result.steps.iter().enumerate() {
        let _ = writeln!(
            content,
            "  {}. {} ({})",
            i + 1,
            step_label(step),
            if step.is_success() { "PASS" } else { "FAIL" }
        );
        let _ = writeln!(content, "     Duration: {} ms", step.step_time.as_millis());
        for variable in &step.variables_applied {
            let _ = writeln!(content, "     Used: {variable}");
        }
        for assertion in &step.assertions {
            let mark = if assertion.success { "ok" } else { "failed" };
            let _ = writeln!(content, "     Assertion {mark}: {}", assertion.message);
        }
        for variable in &step.variables_created {
            let _ = writeln!(content, "     Created: {variable}");
        }
    }
    content
}

/// Write `result` under `report_dir` as `<name>-<timestamp>.<ext>`.
pub fn save_report(
    result: &ResultScenario,
    report_dir: &Path,
    format: ReportFormat,
) -> Result<PathBuf> {
    if !report_dir.exists() {
        fs::create_dir_all(report_dir)?;
    }

    let timestamp = Utc::now().timestamp();
    let sanitized_name = result.name.replace([' ', '/'], "_");
    let filename = format!("{sanitized_name}-{timestamp}.{}", format.extension());

    let content = match format {
        ReportFormat::Json => serde_json::to_string_pretty(result)?,
        ReportFormat::Yaml => serde_yaml::to_string(result)?,
        ReportFormat::Text => render_text(result),
    };

    let file_path = report_dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}
