//! CMake invocations for the configure and compile stages.

use std::path::{Path, PathBuf};

use crate::core::BuildConfiguration;
use crate::util::process::ProcessBuilder;

/// CMake command builder for one build tree.
pub struct CMakeBuilder<'a> {
    config: &'a BuildConfiguration,
    cmake: PathBuf,
    generator: Option<String>,
    cmake_args: Vec<String>,
}

impl<'a> CMakeBuilder<'a> {
    /// Create a new CMake builder using the given `cmake` executable.
    pub fn new(config: &'a BuildConfiguration, cmake: impl Into<PathBuf>) -> Self {
        CMakeBuilder {
            config,
            cmake: cmake.into(),
            generator: None,
            cmake_args: Vec::new(),
        }
    }

    /// Use a specific CMake generator (e.g. `Ninja`).
    pub fn generator(mut self, generator: Option<String>) -> Self {
        self.generator = generator;
        self
    }

    /// Extra arguments appended to the configure command.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cmake_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// `cmake -S <source> -B <build> -C <settings>`.
    pub fn configure(&self, settings_file: &Path) -> ProcessBuilder {
        let mut cmd = ProcessBuilder::new(&self.cmake)
            .cwd(self.config.source_root())
            .arg("-S")
            .arg(self.config.source_root())
            .arg("-B")
            .arg(self.config.build_root())
            .arg("-C")
            .arg(settings_file);

        if let Some(ref generator) = self.generator {
            cmd = cmd.arg("-G").arg(generator);
        }

        // Custom args
        for arg in &self.cmake_args {
            cmd = cmd.arg(arg);
        }

        cmd
    }

    /// `cmake --build <build> --config <type> --parallel <threads>`.
    pub fn compile(&self) -> ProcessBuilder {
        ProcessBuilder::new(&self.cmake)
            .cwd(self.config.source_root())
            .arg("--build")
            .arg(self.config.build_root())
            // Multi-config generators (Visual Studio, Xcode) ignore CMAKE_BUILD_TYPE
            .arg("--config")
            .arg(self.config.build_type().as_str())
            .arg("--parallel")
            .arg(self.config.threads().to_string())
    }
}

/// Check if a directory contains a CMake project.
pub fn is_cmake_project(dir: &Path) -> bool {
    dir.join("CMakeLists.txt").exists()
}
