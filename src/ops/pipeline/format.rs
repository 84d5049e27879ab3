//! Report formatting (human/JSON/GitHub).

use std::fmt::Write as _;

use super::types::{OutputFormat, PipelineReport};
use crate::util::shell::format_duration;

/// Lines of tool output shown for a failed stage.
const TAIL_LINES: usize = 12;

fn tail_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(n);
    lines[skip..].to_vec()
}

/// Format a report for the terminal.
pub fn format_report(report: &PipelineReport, verbose: bool) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Build: {} backend", report.backend);
    let _ = writeln!(output, "{}", "=".repeat(50));
    let _ = writeln!(output);

    for stage in &report.stages {
        let status = if stage.passed { "[OK]" } else { "[FAIL]" };
        let _ = writeln!(
            output,
            "  {:<6} {:<9} {}",
            status,
            stage.stage,
            format_duration(stage.elapsed)
        );

        if verbose || !stage.passed {
            let _ = writeln!(output, "         {}", stage.message);
        }
        if !stage.passed {
            for line in tail_lines(stage.diagnostic_tail(), TAIL_LINES) {
                let _ = writeln!(output, "         | {}", line);
            }
        }
        for warning in &stage.warnings {
            let _ = writeln!(output, "         Warning: {}", warning);
        }
    }

    let _ = writeln!(output);

    let _ = writeln!(
        output,
        "Result: {} ({}/{} stages passed)",
        report.state.as_str().to_uppercase(),
        report.passed_count(),
        report.stages.len()
    );
    let _ = writeln!(output, "Total time: {}", format_duration(report.total_duration));

    if verbose {
        let _ = writeln!(
            output,
            "Settings: {} (sha256 {})",
            report.settings_path.display(),
            report.settings_digest
        );
    }

    if !report.artifacts.is_empty() {
        let _ = writeln!(output, "\nArtifacts:");
        for artifact in &report.artifacts {
            let _ = writeln!(output, "  - {}", artifact.path.display());
        }
    }

    if !report.warnings.is_empty() {
        let _ = writeln!(output, "\nWarnings:");
        for warning in &report.warnings {
            let _ = writeln!(output, "  - {}", warning);
        }
    }

    output
}

/// Format a report as JSON.
pub fn format_report_json(report: &PipelineReport) -> String {
    serde_json::to_string_pretty(report)
        .unwrap_or_else(|e| format!(r#"{{"error": "Failed to serialize report: {}"}}"#, e))
}

fn escape_annotation(text: &str) -> String {
    text.replace('%', "%25")
        .replace('\r', "")
        .replace('\n', "%0A")
}

/// Format a report for GitHub Actions: annotations plus a markdown summary.
pub fn format_report_github(report: &PipelineReport) -> String {
    let mut output = String::new();

    for stage in &report.stages {
        if !stage.passed {
            let mut message = stage.message.clone();
            for line in tail_lines(stage.diagnostic_tail(), TAIL_LINES) {
                message.push('\n');
                message.push_str(line);
            }
            let _ = writeln!(
                output,
                "::error title=kiln {}::{}",
                stage.stage,
                escape_annotation(&message)
            );
        }
    }
    for warning in &report.warnings {
        let _ = writeln!(
            output,
            "::warning title=kiln package::{}",
            escape_annotation(&warning.to_string())
        );
    }

    let _ = writeln!(output, "::group::Build Summary");
    let _ = writeln!(output);
    let _ = writeln!(output, "## {} backend", report.backend);
    let _ = writeln!(output);
    let _ = writeln!(output, "**Settings digest:** `{}`", report.settings_digest);
    let _ = writeln!(output);

    let _ = writeln!(output, "| Stage | Status | Duration |");
    let _ = writeln!(output, "|-------|--------|----------|");
    for stage in &report.stages {
        let status = if stage.passed {
            ":white_check_mark:"
        } else {
            ":x:"
        };
        let _ = writeln!(
            output,
            "| {} | {} | {} |",
            stage.stage,
            status,
            format_duration(stage.elapsed)
        );
    }
    let _ = writeln!(output);

    let emoji = if report.succeeded() {
        ":heavy_check_mark:"
    } else {
        ":x:"
    };
    let _ = writeln!(
        output,
        "**Result:** {} {} ({}/{} stages passed)",
        emoji,
        report.state.as_str().to_uppercase(),
        report.passed_count(),
        report.stages.len()
    );
    let _ = writeln!(output, "**Total time:** {}", format_duration(report.total_duration));

    if !report.artifacts.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "### Artifacts");
        for artifact in &report.artifacts {
            let _ = writeln!(output, "- `{}`", artifact.file_name());
        }
    }

    let failed: Vec<_> = report.stages.iter().filter(|s| !s.passed).collect();
    for stage in failed {
        let _ = writeln!(output);
        let _ = writeln!(output, "<details>");
        let _ = writeln!(output, "<summary>{} output</summary>", stage.stage);
        let _ = writeln!(output);
        let _ = writeln!(output, "```");
        let _ = writeln!(output, "$ {}", stage.command);
        let _ = writeln!(output, "{}", stage.diagnostic_tail());
        let _ = writeln!(output, "```");
        let _ = writeln!(output);
        let _ = writeln!(output, "</details>");
    }

    let _ = writeln!(output, "::endgroup::");

    output
}

/// Format the report according to the requested output format.
pub fn format_report_for_output(
    report: &PipelineReport,
    format: OutputFormat,
    verbose: bool,
) -> String {
    match format {
        OutputFormat::Human => format_report(report, verbose),
        OutputFormat::Json => format_report_json(report),
        OutputFormat::Github => format_report_github(report),
    }
}
