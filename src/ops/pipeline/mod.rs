//! The build pipeline.
//!
//! Stages run strictly in order: configure, compile, install, validate, and
//! then test and package when enabled. The first fatal condition (a failed
//! command, a tool that could not start, or a missing output) stops the run;
//! nothing is retried. Wheel repair problems are recorded as warnings and
//! never stop the run.

pub mod format;
pub mod stage;
pub mod types;

use std::time::Instant;

use crate::builder::settings::{generate, settings_path, GeneratedSettings};
use crate::core::{
    BuildConfiguration, ExclusionList, ExecutionError, MissingArtifactError, PackageLayout,
    PipelineFailure, PipelineState, PlatformTag, RepairWarning, StageKind, Tools,
};
use crate::ops::inspect::ArtifactInspector;
use crate::ops::repair::PackageRepairer;
use crate::ops::runner::{stage_failure, StageRunner};
use crate::util::fs::reset_dir;
use crate::util::process::CommandExecutor;

use self::stage::wheelhouse;

pub use stage::{Stage, StageCommand, StagePlanner};
pub use types::{PipelineReport, StageResult};

/// Receives progress notifications while a pipeline runs.
pub trait PipelineObserver {
    fn stage_started(&mut self, _stage: &Stage) {}
    fn stage_finished(&mut self, _result: &StageResult) {}
    fn repair_warning(&mut self, _warning: &RepairWarning) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// A stage that stopped the run.
struct Aborted {
    result: StageResult,
    failure: PipelineFailure,
}

impl Aborted {
    fn execution(error: ExecutionError, start: Instant) -> Self {
        let result = StageResult::fail(error.stage, error.to_string(), start.elapsed())
            .with_command(error.program.clone());
        Aborted {
            result,
            failure: error.into(),
        }
    }

    fn missing(result: StageResult, error: MissingArtifactError) -> Self {
        Aborted {
            result: result.into_failed(error.to_string()),
            failure: error.into(),
        }
    }
}

/// Runs stages for a configuration through a [`CommandExecutor`].
pub struct Pipeline<E: CommandExecutor> {
    executor: E,
    tools: Tools,
    layout: PackageLayout,
    platform: PlatformTag,
}

impl<E: CommandExecutor> Pipeline<E> {
    pub fn new(executor: E) -> Self {
        Pipeline {
            executor,
            tools: Tools::default(),
            layout: PackageLayout::default(),
            platform: PlatformTag::host(),
        }
    }

    pub fn tools(mut self, tools: Tools) -> Self {
        self.tools = tools;
        self
    }

    pub fn layout(mut self, layout: PackageLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn platform(mut self, platform: PlatformTag) -> Self {
        self.platform = platform;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// The stages `execute` would run, without running anything.
    pub fn plan(&self, config: &BuildConfiguration) -> Vec<Stage> {
        StagePlanner::new(config, &self.tools, &self.layout, self.platform)
            .plan(&settings_path(config.build_root()))
    }

    /// Run the pipeline to completion or first failure.
    pub fn execute(&mut self, config: &BuildConfiguration) -> PipelineReport {
        self.execute_with(config, &mut NoopObserver)
    }

    /// Run the pipeline, reporting progress to `observer`.
    pub fn execute_with(
        &mut self,
        config: &BuildConfiguration,
        observer: &mut dyn PipelineObserver,
    ) -> PipelineReport {
        let start = Instant::now();
        let settings = generate(config);
        let mut report = PipelineReport::new(
            config.backend(),
            settings_path(config.build_root()),
            settings.digest(),
        );

        tracing::info!(
            "Building {} backend ({}, {} jobs)",
            config.backend(),
            config.build_type(),
            config.threads()
        );

        for stage in self.plan(config) {
            report.state = stage.kind.state();
            observer.stage_started(&stage);
            tracing::info!("{}", stage.kind);

            match self.run_stage(config, &settings, &stage, &mut report, observer) {
                Ok(result) => {
                    observer.stage_finished(&result);
                    report.add_stage(result);
                }
                Err(aborted) => {
                    tracing::debug!("{} aborted: {}", stage.kind, aborted.failure);
                    observer.stage_finished(&aborted.result);
                    report.add_stage(aborted.result);
                    report.fail(aborted.failure);
                    break;
                }
            }
        }

        if report.failure.is_none() {
            report.state = PipelineState::Succeeded;
        }
        report.total_duration = start.elapsed();
        report
    }

    fn run_stage(
        &mut self,
        config: &BuildConfiguration,
        settings: &GeneratedSettings,
        stage: &Stage,
        report: &mut PipelineReport,
        observer: &mut dyn PipelineObserver,
    ) -> Result<StageResult, Aborted> {
        let start = Instant::now();

        match stage.kind {
            StageKind::Configure => {
                settings.write(config.build_root()).map_err(|e| {
                    Aborted::execution(
                        ExecutionError {
                            stage: stage.kind,
                            program: "kiln".to_string(),
                            reason: format!("{:#}", e),
                        },
                        start,
                    )
                })?;
            }
            StageKind::Package => {
                reset_dir(&wheelhouse(config)).map_err(|e| {
                    Aborted::execution(
                        ExecutionError {
                            stage: stage.kind,
                            program: "kiln".to_string(),
                            reason: format!("{:#}", e),
                        },
                        start,
                    )
                })?;
            }
            _ => {}
        }

        let result = StageRunner::new(&mut self.executor)
            .run(stage)
            .map_err(|e| Aborted::execution(e, start))?;

        if !result.passed {
            let failure = stage_failure(&result).into();
            return Err(Aborted { result, failure });
        }

        if stage.kind == StageKind::Compile || !stage.required_artifacts.is_empty() {
            match ArtifactInspector::new(stage.kind).verify(&stage.required_artifacts) {
                Ok(verified) => report.artifacts.extend(verified),
                Err(e) => return Err(Aborted::missing(result, e)),
            }
        }

        if stage.kind == StageKind::Package {
            return self.package(config, result, report, observer);
        }

        Ok(result)
    }

    /// Verify the raw wheel, repair it into the output directory, then
    /// verify the output wheel.
    fn package(
        &mut self,
        config: &BuildConfiguration,
        mut result: StageResult,
        report: &mut PipelineReport,
        observer: &mut dyn PipelineObserver,
    ) -> Result<StageResult, Aborted> {
        let inspector = ArtifactInspector::new(StageKind::Package);
        let raw = match inspector.find_wheels(&wheelhouse(config)) {
            Ok(wheels) => wheels,
            Err(e) => return Err(Aborted::missing(result, e)),
        };

        let exclusions =
            ExclusionList::for_backend(config.backend()).with(self.layout.exclude.iter());
        let mut repairer = PackageRepairer::new(&mut self.executor, config.output_dir())
            .tool(self.tools.repair.clone());

        let mut outputs = Vec::with_capacity(raw.len());
        for wheel in &raw {
            match repairer.repair(wheel, &exclusions, self.platform) {
                Ok(outcome) => {
                    if let Some(warning) = outcome.warning {
                        observer.repair_warning(&warning);
                        result.warnings.push(warning.to_string());
                        report.warnings.push(warning);
                    }
                    outputs.push(outcome.artifact);
                }
                Err(e) => return Err(Aborted::missing(result, e)),
            }
        }

        match inspector.verify(&outputs) {
            Ok(verified) => report.artifacts.extend(verified),
            Err(e) => return Err(Aborted::missing(result, e)),
        }

        result.message = if result.warnings.is_empty() {
            "wheel repaired".to_string()
        } else {
            "unrepaired wheel used".to_string()
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactKind, Backend, FailureCategory};
    use crate::test_support::{
        BuildFixture, MockExecutor, MockProcessOutput, FIXTURE_REPAIRED_WHEEL, FIXTURE_WHEEL,
    };

    fn pipeline(fixture: &BuildFixture, exec: MockExecutor) -> Pipeline<MockExecutor> {
        Pipeline::new(exec)
            .layout(fixture.layout.clone())
            .platform(PlatformTag::Linux)
    }

    #[derive(Default)]
    struct Recorder {
        started: Vec<StageKind>,
        finished: Vec<(StageKind, bool)>,
        warnings: usize,
    }

    impl PipelineObserver for Recorder {
        fn stage_started(&mut self, stage: &Stage) {
            self.started.push(stage.kind);
        }

        fn stage_finished(&mut self, result: &StageResult) {
            self.finished.push((result.stage, result.passed));
        }

        fn repair_warning(&mut self, _warning: &RepairWarning) {
            self.warnings += 1;
        }
    }

    #[test]
    fn test_cpu_build_runs_four_stages() {
        let fixture = BuildFixture::new(Backend::Cpu);
        let exec = fixture.passing_executor();
        let mut pipeline = pipeline(&fixture, exec);

        let report = pipeline.execute(&fixture.config);

        assert_eq!(
            report.stage_kinds(),
            [
                StageKind::Configure,
                StageKind::Compile,
                StageKind::Install,
                StageKind::Validate
            ]
        );
        assert_eq!(report.state, PipelineState::Succeeded);
        assert_eq!(report.exit_code(), 0);
        assert!(report.stages.iter().all(|s| s.passed));
        assert_eq!(report.artifacts.len(), 2);

        let settings = std::fs::read_to_string(&report.settings_path).unwrap();
        assert!(settings.contains("set(GGML_VULKAN ON CACHE BOOL \"\" FORCE)"));
        for flag in ["GGML_CUDA", "GGML_HIP", "GGML_METAL", "GGML_OPENCL"] {
            assert!(settings.contains(&format!("set({} OFF CACHE BOOL \"\" FORCE)", flag)));
        }

        let calls = pipeline.executor().calls();
        assert!(calls[1].ends_with("--parallel 4"));
        assert!(!calls.iter().any(|c| c.contains("pytest") || c.contains("pip wheel")));
    }

    #[test]
    fn test_cuda_compile_failure_stops_pipeline() {
        let fixture = BuildFixture::new(Backend::Cuda).with_config(|c| c.with_build_wheel(true));
        let mut exec = MockExecutor::new();
        exec.expect_prefix("cmake -S", MockProcessOutput::success("-- Configuring done"));
        exec.expect_prefix(
            "cmake --build",
            MockProcessOutput::failure(1, "nvcc fatal : Unsupported gpu architecture"),
        );
        let mut pipeline = pipeline(&fixture, exec);

        let report = pipeline.execute(&fixture.config);

        assert_eq!(report.state, PipelineState::Failed);
        assert_eq!(
            report.stage_kinds(),
            [StageKind::Configure, StageKind::Compile]
        );
        let compiling: Vec<_> = report
            .stages
            .iter()
            .filter(|s| s.stage == StageKind::Compile)
            .collect();
        assert_eq!(compiling.len(), 1);
        assert!(!compiling[0].passed);
        assert_eq!(compiling[0].exit_code, Some(1));
        assert!(report.artifacts.is_empty());
        assert!(!pipeline.executor().calls().iter().any(|c| c.contains("pip")));
        assert_eq!(report.failure_category(), Some(FailureCategory::Compile));
        assert_eq!(report.exit_code(), 4);
    }

    #[test]
    fn test_optional_stages_skipped_when_disabled() {
        let fixture = BuildFixture::new(Backend::Vulkan)
            .with_config(|c| c.with_run_tests(false).with_build_wheel(false));
        let exec = fixture.passing_executor();
        let report = pipeline(&fixture, exec).execute(&fixture.config);

        assert!(report.succeeded());
        assert!(report.stage(StageKind::Test).is_none());
        assert!(report.stage(StageKind::Package).is_none());
    }

    #[test]
    fn test_full_run_with_tests_and_repaired_wheel() {
        let fixture = BuildFixture::new(Backend::Rocm)
            .with_config(|c| c.with_run_tests(true).with_build_wheel(true));
        let mut exec = fixture.passing_executor();
        exec.expect_prefix(
            "auditwheel repair",
            MockProcessOutput::success("Fixed-up wheel written")
                .creates(fixture.repaired_wheel_path(), b"PK fixed"),
        );
        let mut recorder = Recorder::default();

        let report = pipeline(&fixture, exec).execute_with(&fixture.config, &mut recorder);

        assert!(report.succeeded());
        assert_eq!(report.stages.len(), 6);
        assert!(report.warnings.is_empty());
        assert_eq!(recorder.started, StageKind::ORDER);
        assert_eq!(recorder.finished.len(), 6);
        assert!(report
            .artifacts
            .iter()
            .any(|a| a.kind == ArtifactKind::WheelPackage
                && a.file_name() == FIXTURE_REPAIRED_WHEEL));
    }

    #[test]
    fn test_repair_failure_is_only_a_warning() {
        let fixture = BuildFixture::new(Backend::Cuda).with_config(|c| c.with_build_wheel(true));
        let mut exec = fixture.passing_executor();
        exec.expect_prefix("auditwheel", MockProcessOutput::failure(1, "cannot repair"));
        let mut recorder = Recorder::default();

        let report = pipeline(&fixture, exec).execute_with(&fixture.config, &mut recorder);

        assert_eq!(report.state, PipelineState::Succeeded);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(recorder.warnings, 1);
        assert!(fixture.config.output_dir().join(FIXTURE_WHEEL).is_file());

        let package = report.stage(StageKind::Package).unwrap();
        assert!(package.passed);
        assert_eq!(package.warnings.len(), 1);
    }

    #[test]
    fn test_missing_tool_is_execution_error() {
        let fixture = BuildFixture::new(Backend::Metal);
        let mut exec = MockExecutor::new();
        exec.expect_prefix("cmake -S", MockProcessOutput::success(""));
        exec.expect_prefix("cmake --build", fixture.compile_output());
        exec.expect_spawn_error("python3");

        let report = pipeline(&fixture, exec).execute(&fixture.config);

        assert_eq!(report.state, PipelineState::Failed);
        assert!(matches!(report.failure, Some(PipelineFailure::Execution(_))));
        assert_eq!(report.exit_code(), 3);

        let last = report.stages.last().unwrap();
        assert_eq!(last.stage, StageKind::Install);
        assert_eq!(last.exit_code, None);
    }

    #[test]
    fn test_zero_exit_without_libraries_fails_compile() {
        let fixture = BuildFixture::new(Backend::Opencl);
        let mut exec = MockExecutor::new();
        exec.expect_prefix("cmake -S", MockProcessOutput::success(""));
        exec.expect_prefix("cmake --build", MockProcessOutput::success("nothing to do"));

        let report = pipeline(&fixture, exec).execute(&fixture.config);

        match report.failure {
            Some(PipelineFailure::MissingArtifact(ref e)) => {
                assert_eq!(e.stage, StageKind::Compile);
                assert_eq!(e.missing, fixture.library_paths());
            }
            ref other => panic!("expected missing artifact, got {:?}", other),
        }
        assert_eq!(report.exit_code(), 4);
        assert_eq!(report.stages.len(), 2);
        assert!(!report.stages[1].passed);
    }

    #[test]
    fn test_empty_library_list_still_gates_compile() {
        let fixture = BuildFixture::new(Backend::Cpu);
        let mut exec = MockExecutor::new();
        exec.expect_prefix("cmake -S", MockProcessOutput::success(""));
        exec.expect_prefix("cmake --build", MockProcessOutput::success(""));

        let layout = PackageLayout {
            libraries: Vec::new(),
            ..fixture.layout.clone()
        };
        let report = pipeline(&fixture, exec).layout(layout).execute(&fixture.config);

        assert_eq!(report.state, PipelineState::Failed);
        assert!(report.artifacts.is_empty());
        match report.failure {
            Some(PipelineFailure::MissingArtifact(ref e)) => {
                assert_eq!(e.stage, StageKind::Compile)
            }
            ref other => panic!("expected missing artifact, got {:?}", other),
        }
        assert_eq!(report.exit_code(), 4);
    }

    #[test]
    fn test_missing_import_marker_fails_validate() {
        let fixture = BuildFixture::new(Backend::Vulkan);
        let mut exec = MockExecutor::new();
        exec.expect_contains("-c \"import", MockProcessOutput::success("partial import"));
        exec.expect_prefix("cmake -S", MockProcessOutput::success(""));
        exec.expect_prefix("cmake --build", fixture.compile_output());
        exec.expect_contains("pip install", MockProcessOutput::success(""));

        let report = pipeline(&fixture, exec).execute(&fixture.config);

        assert_eq!(report.stages.last().unwrap().stage, StageKind::Validate);
        assert_eq!(report.exit_code(), 6);
    }

    #[test]
    fn test_settings_written_even_when_configure_fails() {
        let fixture = BuildFixture::new(Backend::Cpu).with_config(|c| c.with_cpu_shim(None));
        let mut exec = MockExecutor::new();
        exec.expect_prefix("cmake -S", MockProcessOutput::failure(1, "CMake Error"));

        let report = pipeline(&fixture, exec).execute(&fixture.config);

        assert_eq!(report.stage_kinds(), [StageKind::Configure]);
        let settings = std::fs::read_to_string(&report.settings_path).unwrap();
        assert!(settings.contains("set(GGML_VULKAN OFF CACHE BOOL \"\" FORCE)"));
        assert_eq!(report.settings_digest, generate(&fixture.config).digest());
    }

    #[test]
    fn test_plan_runs_nothing() {
        let fixture = BuildFixture::new(Backend::Cuda)
            .with_config(|c| c.with_run_tests(true).with_build_wheel(true));
        let pipeline = pipeline(&fixture, MockExecutor::new());

        let stages = pipeline.plan(&fixture.config);

        assert_eq!(stages.len(), 6);
        assert!(pipeline.executor().calls().is_empty());
        assert!(!settings_path(fixture.config.build_root()).exists());
    }
}
