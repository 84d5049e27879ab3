//! Scratch source trees and scripted tool runs for pipeline tests.

use std::path::PathBuf;

use tempfile::TempDir;

use super::{MockExecutor, MockProcessOutput};
use crate::core::{Backend, BuildConfiguration, PackageLayout, PlatformTag};

/// Wheel file name produced by the scripted `pip wheel`.
pub const FIXTURE_WHEEL: &str = "llama_chat-0.1.0-cp311-cp311-linux_x86_64.whl";

/// Repaired wheel file name produced by the scripted `auditwheel`.
pub const FIXTURE_REPAIRED_WHEEL: &str =
    "llama_chat-0.1.0-cp311-cp311-manylinux_2_28_x86_64.whl";

/// A temporary source root with a configuration pointing at it.
pub struct BuildFixture {
    pub dir: TempDir,
    pub config: BuildConfiguration,
    pub layout: PackageLayout,
}

impl BuildFixture {
    /// Fixture for `backend` with four compile jobs.
    pub fn new(backend: Backend) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let config = BuildConfiguration::new(backend, dir.path()).with_threads(4);
        BuildFixture {
            dir,
            config,
            layout: PackageLayout::default(),
        }
    }

    /// Adjust the configuration.
    pub fn with_config(mut self, f: impl FnOnce(BuildConfiguration) -> BuildConfiguration) -> Self {
        self.config = f(self.config);
        self
    }

    /// Shared libraries the compile stage must produce (Linux names).
    pub fn library_paths(&self) -> Vec<PathBuf> {
        let dir = self.layout.library_dir(self.config.build_root());
        self.layout
            .libraries
            .iter()
            .map(|n| dir.join(PlatformTag::Linux.shared_library_name(n)))
            .collect()
    }

    pub fn raw_wheel_path(&self) -> PathBuf {
        self.config.build_root().join("wheelhouse").join(FIXTURE_WHEEL)
    }

    pub fn repaired_wheel_path(&self) -> PathBuf {
        self.config.output_dir().join(FIXTURE_REPAIRED_WHEEL)
    }

    /// Output of a compile run that writes every shared library.
    pub fn compile_output(&self) -> MockProcessOutput {
        self.library_paths()
            .into_iter()
            .fold(MockProcessOutput::success("[100%] Built target llama"), |out, p| {
                out.creates(p, b"\x7fELF")
            })
    }

    /// An executor where configure, compile, install, validate and test pass
    /// and `pip wheel` writes a wheel. Repair is left unscripted.
    pub fn passing_executor(&self) -> MockExecutor {
        let mut exec = MockExecutor::new();
        exec.expect_prefix("cmake -S", MockProcessOutput::success("-- Configuring done"));
        exec.expect_prefix("cmake --build", self.compile_output());
        exec.expect_contains("pip install", MockProcessOutput::success("Successfully installed"));
        exec.expect_contains(
            "-c \"import",
            MockProcessOutput::success(self.layout.marker.clone()),
        );
        exec.expect("llama-chat --help", MockProcessOutput::success("usage: llama-chat"));
        exec.expect_contains("pytest", MockProcessOutput::success("3 passed"));
        exec.expect_contains(
            "pip wheel",
            MockProcessOutput::success("Created wheel").creates(self.raw_wheel_path(), b"PK raw"),
        );
        exec
    }
}
