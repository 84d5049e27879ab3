//! High-level operations.
//!
//! This module contains the implementation of kiln commands.

pub mod clean;
pub mod doctor;
pub mod inspect;
pub mod pipeline;
pub mod repair;
pub mod runner;

pub use clean::{clean, CleanOptions};
pub use doctor::{doctor, DoctorReport};
pub use inspect::ArtifactInspector;
pub use pipeline::{Pipeline, PipelineObserver, PipelineReport, Stage, StageResult};
pub use repair::{PackageRepairer, RepairOutcome};
pub use runner::StageRunner;
