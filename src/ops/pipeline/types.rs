//! Stage results and the pipeline report.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::core::{
    Artifact, Backend, FailureCategory, PipelineFailure, PipelineState, RepairWarning, StageKind,
};

/// Report output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// GitHub Actions annotations with job summary
    Github,
}

impl std::str::FromStr for OutputFormat {
    type Err = OutputFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "github" | "github-actions" | "gha" => Ok(OutputFormat::Github),
            _ => Err(OutputFormatParseError(s.to_string())),
        }
    }
}

/// Error parsing output format option.
#[derive(Debug, Clone)]
pub struct OutputFormatParseError(pub String);

impl std::fmt::Display for OutputFormatParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid output format '{}', valid values: human, json, github",
            self.0
        )
    }
}

impl std::error::Error for OutputFormatParseError {}

fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Outcome of one executed stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    /// Which stage ran
    pub stage: StageKind,

    /// Whether the stage passed
    pub passed: bool,

    /// Exit code of the last command run; `None` if it never exited normally
    pub exit_code: Option<i32>,

    /// How long the stage took (in milliseconds for JSON)
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_duration_ms")]
    pub elapsed: Duration,

    /// Last command run
    pub command: String,

    /// Status message
    pub message: String,

    /// Bounded stdout tail of the last command
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout_tail: String,

    /// Bounded stderr tail of the last command
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr_tail: String,

    /// Recoverable problems (passed but with issues)
    pub warnings: Vec<String>,
}

impl StageResult {
    /// Create a passing result.
    pub fn pass(stage: StageKind, message: impl Into<String>, elapsed: Duration) -> Self {
        StageResult {
            stage,
            passed: true,
            exit_code: Some(0),
            elapsed,
            command: String::new(),
            message: message.into(),
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            warnings: Vec::new(),
        }
    }

    /// Create a failing result.
    pub fn fail(stage: StageKind, message: impl Into<String>, elapsed: Duration) -> Self {
        StageResult {
            stage,
            passed: false,
            exit_code: None,
            elapsed,
            command: String::new(),
            message: message.into(),
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_output(mut self, stdout_tail: String, stderr_tail: String) -> Self {
        self.stdout_tail = stdout_tail;
        self.stderr_tail = stderr_tail;
        self
    }

    /// Turn a passing result into a failing one, keeping its timing and output.
    pub fn into_failed(mut self, message: impl Into<String>) -> Self {
        self.passed = false;
        self.message = message.into();
        self
    }

    /// Stderr tail, or stdout tail when stderr is empty.
    pub fn diagnostic_tail(&self) -> &str {
        if self.stderr_tail.trim().is_empty() {
            &self.stdout_tail
        } else {
            &self.stderr_tail
        }
    }
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub backend: Backend,

    /// Final state; `Succeeded` or `Failed` once the run is over
    pub state: PipelineState,

    /// Executed stages, in order
    pub stages: Vec<StageResult>,

    /// The condition that stopped the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<PipelineFailure>,

    /// Recoverable repair problems
    pub warnings: Vec<RepairWarning>,

    /// Verified outputs
    pub artifacts: Vec<Artifact>,

    pub settings_path: PathBuf,
    pub settings_digest: String,

    /// Total run time (in milliseconds for JSON)
    #[serde(rename = "total_ms", serialize_with = "serialize_duration_ms")]
    pub total_duration: Duration,
}

impl PipelineReport {
    pub fn new(backend: Backend, settings_path: PathBuf, settings_digest: String) -> Self {
        PipelineReport {
            backend,
            state: PipelineState::Configuring,
            stages: Vec::new(),
            failure: None,
            warnings: Vec::new(),
            artifacts: Vec::new(),
            settings_path,
            settings_digest,
            total_duration: Duration::ZERO,
        }
    }

    /// Record a stage result.
    pub fn add_stage(&mut self, result: StageResult) {
        self.stages.push(result);
    }

    /// Stop the run with a fatal failure.
    pub fn fail(&mut self, failure: PipelineFailure) {
        self.state = PipelineState::Failed;
        self.failure = Some(failure);
    }

    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    /// The executed stages, in order.
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.stage).collect()
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == kind)
    }

    /// Get count of passed stages.
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.passed).count()
    }

    pub fn failure_category(&self) -> Option<FailureCategory> {
        self.failure.as_ref().map(|f| f.category())
    }

    /// Process exit code for this report.
    pub fn exit_code(&self) -> i32 {
        match (self.state, self.failure_category()) {
            (PipelineState::Succeeded, _) => 0,
            (_, Some(category)) => category.exit_code(),
            // A run that never reached a terminal state
            (_, None) => 1,
        }
    }
}
