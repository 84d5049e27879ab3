//! Test utilities and mocks for kiln unit tests.
//!
//! [`MockExecutor`] stands in for [`SystemExecutor`](crate::util::process::SystemExecutor):
//! it matches each command line against scripted expectations, records the
//! call, optionally writes the files a real tool would have produced, and
//! returns the scripted outcome.
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln::test_support::{MockExecutor, MockProcessOutput};
//!
//! let mut exec = MockExecutor::new();
//! exec.expect_prefix("cmake --build", MockProcessOutput::success("[100%] Built"));
//! exec.expect_spawn_error("auditwheel");
//! ```

pub mod fixtures;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::util::process::{CommandExecutor, ProcessBuilder, ProcessOutcome};

pub use fixtures::*;

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code; `None` simulates death by signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Simulate a program that cannot be started.
    pub spawn_error: bool,
    /// Files written when the command "runs".
    pub creates: Vec<(PathBuf, Vec<u8>)>,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            spawn_error: false,
            creates: Vec::new(),
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status: Some(status),
            stderr: stderr.into(),
            ..MockProcessOutput::success("")
        }
    }

    /// A process killed by a signal.
    pub fn killed() -> Self {
        MockProcessOutput {
            status: None,
            ..MockProcessOutput::success("")
        }
    }

    /// A program that is not installed.
    pub fn not_found() -> Self {
        MockProcessOutput {
            spawn_error: true,
            ..MockProcessOutput::success("")
        }
    }

    /// Write `contents` to `path` when the command runs.
    pub fn creates(mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        self.creates
            .push((path.as_ref().to_path_buf(), contents.as_ref().to_vec()));
        self
    }

    fn outcome(&self) -> ProcessOutcome {
        ProcessOutcome {
            exit_code: self.status,
            stdout_tail: self.stdout.clone(),
            stderr_tail: self.stderr.clone(),
        }
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

/// Pattern for matching commands in MockExecutor.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command contains substring.
    Contains(String),
    /// Match any command.
    Any,
}

impl CommandPattern {
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
            CommandPattern::Any => true,
        }
    }
}

/// Expectation for a command execution.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    pub pattern: CommandPattern,
    pub output: MockProcessOutput,
    /// Number of times this expectation can be used (None = unlimited).
    pub times: Option<usize>,
    pub used: usize,
}

impl CommandExpectation {
    pub fn new(pattern: CommandPattern, output: MockProcessOutput) -> Self {
        CommandExpectation {
            pattern,
            output,
            times: None,
            used: 0,
        }
    }

    /// Set the number of times this expectation can be used.
    pub fn times(mut self, n: usize) -> Self {
        self.times = Some(n);
        self
    }

    pub fn available(&self) -> bool {
        match self.times {
            Some(n) => self.used < n,
            None => true,
        }
    }
}

/// Scripted [`CommandExecutor`].
///
/// Expectations are tried in insertion order; the first available match
/// wins. An unmatched command fails to spawn, like a missing program.
#[derive(Debug, Default)]
pub struct MockExecutor {
    expectations: Vec<CommandExpectation>,
    calls: Vec<String>,
    processes: Vec<ProcessBuilder>,
    default_output: Option<MockProcessOutput>,
}

impl MockExecutor {
    pub fn new() -> Self {
        MockExecutor::default()
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&mut self, cmd: &str, output: MockProcessOutput) -> &mut Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Exact(cmd.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command starting with a prefix.
    pub fn expect_prefix(&mut self, prefix: &str, output: MockProcessOutput) -> &mut Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::StartsWith(prefix.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command containing a substring.
    pub fn expect_contains(&mut self, substring: &str, output: MockProcessOutput) -> &mut Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Contains(substring.to_string()),
            output,
        ))
    }

    /// Make every command starting with `program` fail to spawn.
    pub fn expect_spawn_error(&mut self, program: &str) -> &mut Self {
        self.expect_prefix(program, MockProcessOutput::not_found())
    }

    pub fn expect_pattern(&mut self, expectation: CommandExpectation) -> &mut Self {
        self.expectations.push(expectation);
        self
    }

    /// Set a default output for commands that don't match any expectation.
    pub fn set_default(&mut self, output: MockProcessOutput) -> &mut Self {
        self.default_output = Some(output);
        self
    }

    /// Command lines run so far.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Full process descriptions run so far.
    pub fn processes(&self) -> &[ProcessBuilder] {
        &self.processes
    }

    /// Verify that all expectations with a specific count were satisfied.
    pub fn verify(&self) -> Result<()> {
        for (i, exp) in self.expectations.iter().enumerate() {
            if let Some(expected) = exp.times {
                if exp.used != expected {
                    bail!(
                        "expectation {} was used {} times, expected {}",
                        i,
                        exp.used,
                        expected
                    );
                }
            }
        }
        Ok(())
    }

    fn scripted(&mut self, cmd: &str) -> Option<MockProcessOutput> {
        for exp in &mut self.expectations {
            if exp.pattern.matches(cmd) && exp.available() {
                exp.used += 1;
                return Some(exp.output.clone());
            }
        }
        self.default_output.clone()
    }
}

impl CommandExecutor for MockExecutor {
    fn execute(&mut self, process: &ProcessBuilder) -> io::Result<ProcessOutcome> {
        let cmd = process.display_command();
        self.calls.push(cmd.clone());
        self.processes.push(process.clone());

        let Some(output) = self.scripted(&cmd) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unexpected command: {}", cmd),
            ));
        };

        if output.spawn_error {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("program not found: {}", process.get_program().display()),
            ));
        }

        for (path, contents) in &output.creates {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
        }

        Ok(output.outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mock_executor_basic() {
        let mut exec = MockExecutor::new();
        exec.expect("cmake --version", MockProcessOutput::success("cmake version 3.28.1"));

        let outcome = exec
            .execute(&ProcessBuilder::new("cmake").arg("--version"))
            .unwrap();
        assert!(outcome.success());
        assert!(outcome.stdout_tail.contains("3.28.1"));
        assert_eq!(exec.calls(), ["cmake --version"]);
    }

    #[test]
    fn test_mock_executor_unexpected() {
        let mut exec = MockExecutor::new();
        let err = exec
            .execute(&ProcessBuilder::new("unknown"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_mock_executor_times_and_default() {
        let mut exec = MockExecutor::new();
        exec.expect_pattern(
            CommandExpectation::new(
                CommandPattern::Contains("pytest".into()),
                MockProcessOutput::failure(1, "1 failed"),
            )
            .times(1),
        );
        exec.set_default(MockProcessOutput::success("ok"));

        let cmd = ProcessBuilder::new("python3").args(["-m", "pytest"]);
        assert_eq!(exec.execute(&cmd).unwrap().exit_code, Some(1));
        assert_eq!(exec.execute(&cmd).unwrap().exit_code, Some(0));
        exec.verify().unwrap();
    }

    #[test]
    fn test_mock_executor_creates_files() {
        let tmp = TempDir::new().unwrap();
        let lib = tmp.path().join("bin").join("libllama.so");

        let mut exec = MockExecutor::new();
        exec.expect_prefix("cmake", MockProcessOutput::success("").creates(&lib, b"\x7fELF"));
        exec.execute(&ProcessBuilder::new("cmake")).unwrap();

        assert!(lib.is_file());
    }
}
