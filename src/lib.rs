//! Kiln - A declarative build orchestrator for native libraries and their
//! Python wheels
//!
//! This crate provides the core library functionality for kiln: turning a
//! backend choice into CMake settings, running the configure, compile,
//! install, validate, test and package stages with fail-fast semantics, and
//! repairing the resulting wheels.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for kiln unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted process executor and fixtures that
/// fake the files a real build would produce.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{
    Backend, BuildConfiguration, BuildOptions, ConfigurationError, PipelineFailure, StageKind,
};

pub use builder::{generate, GeneratedSettings};
pub use ops::{Pipeline, PipelineReport};
pub use util::process::{CommandExecutor, SystemExecutor};
