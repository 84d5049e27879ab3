//! Error taxonomy for pipeline runs.
//!
//! Configuration errors are raised before any stage runs. Execution errors,
//! stage failures and missing artifacts are fatal and stop the pipeline.
//! Repair warnings are recoverable and only show up in the report.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::core::stage::StageKind;

/// An invalid or unrecognized option value.
#[derive(Debug, Clone, Error, Diagnostic, Serialize)]
#[error("invalid {key} `{value}`")]
#[diagnostic(code(kiln::config::invalid_value))]
pub struct ConfigurationError {
    /// Option name (e.g. `backend`)
    pub key: String,
    /// The rejected value, verbatim
    pub value: String,
    #[help]
    pub help: Option<String>,
}

impl ConfigurationError {
    /// An option value outside its enumerated domain.
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        expected: impl fmt::Display,
    ) -> Self {
        ConfigurationError {
            key: key.into(),
            value: value.into(),
            help: Some(format!("expected one of: {}", expected)),
        }
    }

    /// An option value that parsed but violates a constraint.
    pub fn rejected(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigurationError {
            key: key.into(),
            value: value.into(),
            help: Some(reason.into()),
        }
    }
}

/// An external tool could not be started at all.
#[derive(Debug, Clone, Error, Diagnostic, Serialize)]
#[error("could not run `{program}` during {stage}: {reason}")]
#[diagnostic(
    code(kiln::exec::spawn_failed),
    help("check that the tool is installed and on PATH, or set it under [tools] in kiln.toml")
)]
pub struct ExecutionError {
    pub stage: StageKind,
    pub program: String,
    pub reason: String,
}

/// An external tool ran and reported failure.
#[derive(Debug, Clone, Error, Diagnostic, Serialize)]
#[error("{stage} failed: `{command}` {outcome}")]
#[diagnostic(code(kiln::stage::failed))]
pub struct StageFailure {
    pub stage: StageKind,
    pub command: String,
    pub exit_code: Option<i32>,
    pub outcome: String,
    /// Last lines of captured output
    pub tail: String,
}

/// Expected output files were absent after a stage finished.
#[derive(Debug, Clone, Error, Diagnostic, Serialize)]
#[error("{stage} produced no {what}: {}", display_paths(.missing))]
#[diagnostic(
    code(kiln::artifact::missing),
    help("the tool exited successfully but did not write the expected outputs")
)]
pub struct MissingArtifactError {
    pub stage: StageKind,
    /// Human description of what was expected (e.g. "shared libraries")
    pub what: String,
    pub missing: Vec<PathBuf>,
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "none were declared".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Repair was skipped or failed; the unrepaired wheel was used instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairWarning {
    pub wheel: PathBuf,
    pub reason: String,
}

impl fmt::Display for RepairWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wheel repair skipped for {}: {}",
            self.wheel
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.wheel.display().to_string()),
            self.reason
        )
    }
}

/// Any condition that stops the pipeline.
#[derive(Debug, Clone, Error, Diagnostic, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PipelineFailure {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(ExecutionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Stage(StageFailure),

    #[error(transparent)]
    #[diagnostic(transparent)]
    MissingArtifact(MissingArtifactError),
}

impl PipelineFailure {
    /// The stage the failure happened in.
    pub fn stage(&self) -> StageKind {
        match self {
            PipelineFailure::Execution(e) => e.stage,
            PipelineFailure::Stage(e) => e.stage,
            PipelineFailure::MissingArtifact(e) => e.stage,
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            PipelineFailure::Execution(_) => FailureCategory::Execution,
            _ => FailureCategory::for_stage(self.stage()),
        }
    }
}

impl From<ExecutionError> for PipelineFailure {
    fn from(e: ExecutionError) -> Self {
        PipelineFailure::Execution(e)
    }
}

impl From<StageFailure> for PipelineFailure {
    fn from(e: StageFailure) -> Self {
        PipelineFailure::Stage(e)
    }
}

impl From<MissingArtifactError> for PipelineFailure {
    fn from(e: MissingArtifactError) -> Self {
        PipelineFailure::MissingArtifact(e)
    }
}

/// Coarse failure classes, each with its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    Configuration,
    Execution,
    Compile,
    Install,
    Validate,
    Package,
}

impl FailureCategory {
    pub fn for_stage(stage: StageKind) -> Self {
        match stage {
            StageKind::Configure | StageKind::Compile => FailureCategory::Compile,
            StageKind::Install => FailureCategory::Install,
            StageKind::Validate | StageKind::Test => FailureCategory::Validate,
            StageKind::Package => FailureCategory::Package,
        }
    }

    /// Process exit code for this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            FailureCategory::Configuration => 2,
            FailureCategory::Execution => 3,
            FailureCategory::Compile => 4,
            FailureCategory::Install => 5,
            FailureCategory::Validate => 6,
            FailureCategory::Package => 7,
        }
    }
}
