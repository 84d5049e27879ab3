//! User-facing diagnostic messages.
//!
//! Every failure printed by kiln names the stage, the command that failed,
//! the last lines the tool printed, and a next step.

use std::fmt;
use std::path::PathBuf;

use crate::core::{FailureCategory, PipelineFailure, RepairWarning};

/// Common suggestion messages.
pub mod suggestions {
    pub const CONFIGURATION: &str =
        "Check the value passed on the command line, in KILN_* variables, or in kiln.toml";

    pub const EXECUTION: &str =
        "Run `kiln doctor` to see which tools are missing from PATH";

    pub const COMPILE: &str =
        "Re-run with `--verbose` to stream the full CMake output";

    pub const INSTALL: &str =
        "Check that the Python package builds with `pip install --no-build-isolation -e .`";

    pub const VALIDATE: &str =
        "Import the module in the same interpreter to see the full traceback";

    pub const PACKAGE: &str =
        "Check that `pip wheel` works and that the repair tool is installed";

    pub const REPAIR: &str =
        "Install auditwheel (Linux) or delocate (macOS), or set `tools.repair` in kiln.toml";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Captured tool output shown below the context
    pub output: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    fn with_severity(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity,
            context: Vec::new(),
            output: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, message)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Note, message)
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Attach the captured output tail, keeping at most `max_lines` lines.
    pub fn with_output(mut self, tail: &str, max_lines: usize) -> Self {
        let lines: Vec<&str> = tail.lines().filter(|l| !l.trim().is_empty()).collect();
        let skip = lines.len().saturating_sub(max_lines);
        self.output = lines[skip..].iter().map(|l| l.to_string()).collect();
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m".to_string(),
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m".to_string(),
                Severity::Note => "\x1b[1;36mnote\x1b[0m".to_string(),
            }
        } else {
            self.severity.to_string()
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.output.is_empty() {
            output.push('\n');
            for line in &self.output {
                output.push_str(&format!("  | {}\n", line));
            }
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            for suggestion in &self.suggestions {
                output.push_str(&format!("{}: {}\n", help_prefix, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Lines of tool output shown under a failure.
const FAILURE_TAIL_LINES: usize = 12;

impl From<&PipelineFailure> for Diagnostic {
    fn from(failure: &PipelineFailure) -> Self {
        let suggestion = match failure.category() {
            FailureCategory::Configuration => suggestions::CONFIGURATION,
            FailureCategory::Execution => suggestions::EXECUTION,
            FailureCategory::Compile => suggestions::COMPILE,
            FailureCategory::Install => suggestions::INSTALL,
            FailureCategory::Validate => suggestions::VALIDATE,
            FailureCategory::Package => suggestions::PACKAGE,
        };

        let diag = Diagnostic::error(failure.to_string());
        let diag = match failure {
            PipelineFailure::Execution(e) => diag.with_context(format!("program: {}", e.program)),
            PipelineFailure::Stage(e) => diag.with_output(&e.tail, FAILURE_TAIL_LINES),
            PipelineFailure::MissingArtifact(e) => e
                .missing
                .iter()
                .fold(diag, |d, p| d.with_context(format!("missing: {}", p.display()))),
        };
        diag.with_suggestion(suggestion)
    }
}

impl From<&RepairWarning> for Diagnostic {
    fn from(warning: &RepairWarning) -> Self {
        Diagnostic::warning(warning.to_string())
            .with_location(&warning.wheel)
            .with_suggestion(suggestions::REPAIR)
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
