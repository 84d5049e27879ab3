//! Runs the external commands of a single stage.

use std::time::Instant;

use crate::core::{ExecutionError, StageFailure};
use crate::ops::pipeline::stage::Stage;
use crate::ops::pipeline::types::StageResult;
use crate::util::process::CommandExecutor;

/// Executes stages through a [`CommandExecutor`].
pub struct StageRunner<'e, E: CommandExecutor> {
    executor: &'e mut E,
}

impl<'e, E: CommandExecutor> StageRunner<'e, E> {
    pub fn new(executor: &'e mut E) -> Self {
        StageRunner { executor }
    }

    /// Run every command of `stage` in order, stopping at the first failure.
    ///
    /// A command that runs and fails yields a failed [`StageResult`]; only a
    /// command that cannot be started at all is an [`ExecutionError`].
    pub fn run(&mut self, stage: &Stage) -> Result<StageResult, ExecutionError> {
        let start = Instant::now();
        let mut last = StageResult::pass(stage.kind, "nothing to run", start.elapsed());

        for command in &stage.commands {
            let command_line = command.process.display_command();
            tracing::debug!("[{}] {}", stage.kind, command_line);

            let outcome = self.executor.execute(&command.process).map_err(|e| {
                ExecutionError {
                    stage: stage.kind,
                    program: command.process.get_program().display().to_string(),
                    reason: e.to_string(),
                }
            })?;

            let result = StageResult::pass(stage.kind, "", start.elapsed())
                .with_command(&command_line)
                .with_exit_code(outcome.exit_code)
                .with_output(outcome.stdout_tail.clone(), outcome.stderr_tail.clone());

            if !outcome.success() {
                let message = match outcome.exit_code {
                    Some(code) => format!("`{}` exited with code {}", command_line, code),
                    None => format!("`{}` was terminated by a signal", command_line),
                };
                return Ok(result.into_failed(message));
            }

            if let Some(ref marker) = command.expect_stdout {
                if !outcome.stdout_tail.contains(marker.as_str()) {
                    let message = format!(
                        "`{}` exited successfully but did not print `{}`",
                        command_line, marker
                    );
                    return Ok(result.into_failed(message));
                }
            }

            last = result;
        }

        last.message = format!("{} finished", stage.kind);
        Ok(last)
    }
}

/// Describe a failed result as a [`StageFailure`].
pub fn stage_failure(result: &StageResult) -> StageFailure {
    let outcome = match result.exit_code {
        Some(0) => "did not produce the expected output".to_string(),
        Some(code) => format!("exited with code {}", code),
        None => "was terminated by a signal".to_string(),
    };
    StageFailure {
        stage: result.stage,
        command: result.command.clone(),
        exit_code: result.exit_code,
        outcome,
        tail: result.diagnostic_tail().to_string(),
    }
}
