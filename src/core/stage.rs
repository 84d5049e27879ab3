//! Pipeline stage identities and the pipeline state machine.

use std::fmt;

use serde::Serialize;

use crate::core::configuration::BuildConfiguration;

/// One discrete, ordered step of the build pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Configure,
    Compile,
    Install,
    Validate,
    Test,
    Package,
}

impl StageKind {
    /// All stages in execution order.
    pub const ORDER: [StageKind; 6] = [
        StageKind::Configure,
        StageKind::Compile,
        StageKind::Install,
        StageKind::Validate,
        StageKind::Test,
        StageKind::Package,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Configure => "configure",
            StageKind::Compile => "compile",
            StageKind::Install => "install",
            StageKind::Validate => "validate",
            StageKind::Test => "test",
            StageKind::Package => "package",
        }
    }

    /// The state the pipeline is in while this stage runs.
    pub fn state(&self) -> PipelineState {
        match self {
            StageKind::Configure => PipelineState::Configuring,
            StageKind::Compile => PipelineState::Compiling,
            StageKind::Install => PipelineState::Installing,
            StageKind::Validate => PipelineState::Validating,
            StageKind::Test => PipelineState::Testing,
            StageKind::Package => PipelineState::Packaging,
        }
    }

    /// Whether the stage runs for this configuration.
    ///
    /// Testing and packaging are opt-in; every other stage always runs.
    pub fn is_enabled(&self, config: &BuildConfiguration) -> bool {
        match self {
            StageKind::Test => config.run_tests(),
            StageKind::Package => config.build_wheel(),
            _ => true,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// States of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Configuring,
    Compiling,
    Installing,
    Validating,
    Testing,
    Packaging,
    Succeeded,
    Failed,
}

impl PipelineState {
    /// Whether the run has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Configuring => "Configuring",
            PipelineState::Compiling => "Compiling",
            PipelineState::Installing => "Installing",
            PipelineState::Validating => "Validating",
            PipelineState::Testing => "Testing",
            PipelineState::Packaging => "Packaging",
            PipelineState::Succeeded => "Succeeded",
            PipelineState::Failed => "Failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
