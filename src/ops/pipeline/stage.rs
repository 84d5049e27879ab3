//! Stage planning: which commands each enabled stage runs.

use std::path::{Path, PathBuf};

use crate::builder::CMakeBuilder;
use crate::core::{Artifact, BuildConfiguration, PackageLayout, PlatformTag, StageKind, Tools};
use crate::util::process::ProcessBuilder;

/// Environment variable telling the package build where the shared libraries are.
pub const LIBRARY_DIR_ENV: &str = "KILN_LIBRARY_DIR";

/// Directory under the build root receiving the unrepaired wheel.
pub const WHEELHOUSE_DIR: &str = "wheelhouse";

/// One external command of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub process: ProcessBuilder,
    /// Text that must appear in stdout for the command to count as passed
    pub expect_stdout: Option<String>,
}

impl StageCommand {
    pub fn new(process: ProcessBuilder) -> Self {
        StageCommand {
            process,
            expect_stdout: None,
        }
    }

    pub fn expect_stdout(mut self, marker: impl Into<String>) -> Self {
        self.expect_stdout = Some(marker.into());
        self
    }
}

/// A planned stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub kind: StageKind,
    pub commands: Vec<StageCommand>,
    /// Files that must exist once the commands pass
    pub required_artifacts: Vec<Artifact>,
}

/// Turns a configuration into the ordered list of stages to run.
pub struct StagePlanner<'a> {
    config: &'a BuildConfiguration,
    tools: &'a Tools,
    layout: &'a PackageLayout,
    platform: PlatformTag,
}

impl<'a> StagePlanner<'a> {
    pub fn new(
        config: &'a BuildConfiguration,
        tools: &'a Tools,
        layout: &'a PackageLayout,
        platform: PlatformTag,
    ) -> Self {
        StagePlanner {
            config,
            tools,
            layout,
            platform,
        }
    }

    /// Enabled stages, in execution order.
    pub fn plan(&self, settings_file: &Path) -> Vec<Stage> {
        StageKind::ORDER
            .iter()
            .filter(|kind| kind.is_enabled(self.config))
            .map(|&kind| self.stage(kind, settings_file))
            .collect()
    }

    /// Build a single stage.
    pub fn stage(&self, kind: StageKind, settings_file: &Path) -> Stage {
        let cmake = CMakeBuilder::new(self.config, &self.tools.cmake)
            .generator(self.tools.generator.clone())
            .args(self.tools.cmake_args.iter().cloned());

        let (commands, required_artifacts) = match kind {
            StageKind::Configure => (
                vec![StageCommand::new(cmake.configure(settings_file))],
                vec![],
            ),
            StageKind::Compile => (
                vec![StageCommand::new(cmake.compile())],
                self.shared_libraries(),
            ),
            StageKind::Install => (vec![StageCommand::new(self.pip_install())], vec![]),
            StageKind::Validate => (self.validate_commands(), vec![]),
            StageKind::Test => (vec![StageCommand::new(self.pytest())], vec![]),
            StageKind::Package => (vec![StageCommand::new(self.pip_wheel())], vec![]),
        };

        Stage {
            kind,
            commands,
            required_artifacts,
        }
    }

    /// Shared libraries the compile stage must leave behind.
    pub fn shared_libraries(&self) -> Vec<Artifact> {
        let dir = self.layout.library_dir(self.config.build_root());
        self.layout
            .libraries
            .iter()
            .map(|name| Artifact::shared_library(dir.join(self.platform.shared_library_name(name))))
            .collect()
    }

    /// Where `pip wheel` writes the unrepaired wheel.
    pub fn wheelhouse(&self) -> PathBuf {
        wheelhouse(self.config)
    }

    fn python(&self) -> ProcessBuilder {
        ProcessBuilder::new(&self.tools.python).cwd(self.config.source_root())
    }

    fn pip_install(&self) -> ProcessBuilder {
        self.python()
            .args(["-m", "pip", "install", "--no-build-isolation", "--editable"])
            .arg(self.layout.package_dir(self.config.source_root()))
            .env(
                LIBRARY_DIR_ENV,
                self.layout
                    .library_dir(self.config.build_root())
                    .to_string_lossy(),
            )
    }

    fn validate_commands(&self) -> Vec<StageCommand> {
        let probe = format!(
            "import {}; print('{}')",
            self.layout.module, self.layout.marker
        );
        vec![
            StageCommand::new(self.python().arg("-c").arg(probe))
                .expect_stdout(self.layout.marker.clone()),
            StageCommand::new(
                ProcessBuilder::new(&self.tools.cli)
                    .cwd(self.config.source_root())
                    .arg("--help"),
            ),
        ]
    }

    fn pytest(&self) -> ProcessBuilder {
        self.python()
            .args(["-m", "pytest"])
            .arg(self.layout.tests_dir(self.config.source_root()))
            .arg("-q")
    }

    fn pip_wheel(&self) -> ProcessBuilder {
        self.python()
            .args(["-m", "pip", "wheel"])
            .arg(self.layout.package_dir(self.config.source_root()))
            .args(["--no-deps", "--no-build-isolation", "-w"])
            .arg(self.wheelhouse())
            .env(
                LIBRARY_DIR_ENV,
                self.layout
                    .library_dir(self.config.build_root())
                    .to_string_lossy(),
            )
    }
}

/// Where `pip wheel` writes the unrepaired wheel for a configuration.
pub fn wheelhouse(config: &BuildConfiguration) -> PathBuf {
    config.build_root().join(WHEELHOUSE_DIR)
}
