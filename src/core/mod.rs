//! Core data model: configuration, backends, stages, artifacts and errors.

pub mod artifact;
pub mod backend;
pub mod configuration;
pub mod error;
pub mod exclusion;
pub mod platform;
pub mod project;
pub mod stage;

pub use artifact::{Artifact, ArtifactKind};
pub use backend::Backend;
pub use configuration::{BuildConfiguration, BuildOptions, BuildType};
pub use error::{
    ConfigurationError, ExecutionError, FailureCategory, MissingArtifactError, PipelineFailure,
    RepairWarning, StageFailure,
};
pub use exclusion::ExclusionList;
pub use platform::PlatformTag;
pub use project::{PackageLayout, Tools};
pub use stage::{PipelineState, StageKind};
