//! `kiln build` command

use anyhow::Result;

use crate::cli::BuildArgs;
use crate::commands::load_project;
use kiln::builder::settings::settings_path;
use kiln::core::RepairWarning;
use kiln::ops::pipeline::format::format_report_for_output;
use kiln::ops::pipeline::types::OutputFormat;
use kiln::ops::{Pipeline, PipelineObserver, Stage, StageResult};
use kiln::util::diagnostic::{emit, Diagnostic};
use kiln::util::process::SystemExecutor;
use kiln::util::shell::{format_duration, Shell, Spinner, Status};

/// Mirrors pipeline progress onto the shell.
struct ShellObserver<'a> {
    shell: &'a Shell,
    spinner: Option<Spinner>,
}

impl<'a> ShellObserver<'a> {
    fn new(shell: &'a Shell) -> Self {
        ShellObserver {
            shell,
            spinner: None,
        }
    }
}

impl PipelineObserver for ShellObserver<'_> {
    fn stage_started(&mut self, stage: &Stage) {
        for command in &stage.commands {
            self.shell
                .status(stage.kind.into(), command.process.display_command());
        }
        self.spinner = Some(self.shell.spinner(stage.kind.into(), stage.kind));
    }

    fn stage_finished(&mut self, result: &StageResult) {
        self.spinner = None;
        if result.passed {
            self.shell.status(
                Status::Passed,
                format!("{} ({})", result.stage, format_duration(result.elapsed)),
            );
        } else {
            self.shell
                .status(Status::Failed, format!("{}: {}", result.stage, result.message));
        }
    }

    fn repair_warning(&mut self, warning: &RepairWarning) {
        self.spinner = None;
        if !self.shell.is_quiet() && !self.shell.is_json() {
            emit(&Diagnostic::from(warning), self.shell.use_color());
        }
    }
}

pub fn execute(args: BuildArgs, shell: &Shell) -> Result<i32> {
    let project = load_project(&args.config)?;
    let config = &project.config;

    let executor = SystemExecutor::new().echo(shell.is_verbose());
    let mut pipeline = Pipeline::new(executor)
        .tools(project.tools)
        .layout(project.layout);

    if args.dry_run {
        print_plan(&pipeline, config, args.format)?;
        return Ok(0);
    }

    let report = {
        let mut observer = ShellObserver::new(shell);
        pipeline.execute_with(config, &mut observer)
    };

    match args.format {
        OutputFormat::Human => {
            if let Some(failure) = &report.failure {
                emit(&Diagnostic::from(failure), shell.use_color());
            } else {
                shell.status(
                    Status::Finished,
                    format!(
                        "{} backend in {}",
                        report.backend,
                        format_duration(report.total_duration)
                    ),
                );
            }
            if !shell.is_quiet() {
                print!(
                    "{}",
                    format_report_for_output(&report, args.format, shell.is_verbose())
                );
            }
        }
        OutputFormat::Json | OutputFormat::Github => {
            let rendered = format_report_for_output(&report, args.format, shell.is_verbose());
            println!("{}", rendered.trim_end());
        }
    }

    Ok(report.exit_code())
}

fn print_plan(
    pipeline: &Pipeline<SystemExecutor>,
    config: &kiln::BuildConfiguration,
    format: OutputFormat,
) -> Result<()> {
    let stages = pipeline.plan(config);
    let settings = kiln::generate(config);
    let path = settings_path(config.build_root());

    if format == OutputFormat::Json {
        let plan = serde_json::json!({
            "backend": config.backend(),
            "settings_path": path,
            "settings_digest": settings.digest(),
            "stages": stages.iter().map(|s| serde_json::json!({
                "stage": s.kind,
                "commands": s
                    .commands
                    .iter()
                    .map(|c| c.process.display_command())
                    .collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Settings: {} (sha256 {})", path.display(), settings.digest());
    for stage in &stages {
        println!("{}", stage.kind);
        for command in &stage.commands {
            println!("  $ {}", command.process.display_command());
        }
    }
    Ok(())
}
