//! Preflight checks for the tools a build needs.
//!
//! ```bash
//! kiln doctor            # Quick check
//! kiln doctor --verbose  # Paths and versions
//! ```
//!
//! Checks performed:
//!
//! - Source tree (`CMakeLists.txt` in the source root)
//! - CMake, and the configured generator if any
//! - Python, pip, and pytest when tests are enabled
//! - The wheel repair tool when packaging is enabled (optional: repair
//!   falls back to the unrepaired wheel)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::builder::cmake::is_cmake_project;
use crate::core::{BuildConfiguration, PlatformTag, Tools};
use crate::util::process::{find_executable, CommandExecutor, ProcessBuilder};

/// Result of a single health check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,

    /// Whether the check passed
    pub passed: bool,

    /// Human-readable status message
    pub message: String,

    /// Path to the tool (if applicable)
    pub path: Option<PathBuf>,

    /// Version string (if applicable)
    pub version: Option<String>,

    /// How long the check took
    pub duration: Duration,

    /// Whether this check is required or optional
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.into(),
            passed: true,
            message: message.into(),
            path: None,
            version: None,
            duration: Duration::ZERO,
            required: true,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            passed: false,
            ..CheckResult::pass(name, message)
        }
    }

    /// Mark this check as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Summary of all health checks.
#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    pub checks: Vec<CheckResult>,
    pub total_duration: Duration,
    pub environment: BTreeMap<String, String>,
}

impl DoctorReport {
    pub fn new() -> Self {
        DoctorReport::default()
    }

    pub fn add(&mut self, check: CheckResult) {
        self.checks.push(check);
    }

    /// Check if all required checks passed.
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    pub fn required_failed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .count()
    }
}

/// Run every check for `config`, invoking tools through `executor`.
pub fn doctor<E: CommandExecutor>(
    config: &BuildConfiguration,
    tools: &Tools,
    platform: PlatformTag,
    executor: &mut E,
) -> DoctorReport {
    let start = Instant::now();
    let mut report = DoctorReport::new();

    report
        .environment
        .insert("platform".to_string(), platform.to_string());
    report
        .environment
        .insert("arch".to_string(), std::env::consts::ARCH.to_string());
    report
        .environment
        .insert("backend".to_string(), config.backend().to_string());

    report.add(check_source_tree(config.source_root()));
    report.add(check_tool(executor, "CMake", &tools.cmake, &["--version"]));

    if let Some(ref generator) = tools.generator {
        report.add(check_generator(generator));
    }

    report.add(check_tool(executor, "Python", &tools.python, &["--version"]));
    report.add(check_tool(
        executor,
        "pip",
        &tools.python,
        &["-m", "pip", "--version"],
    ));

    let pytest = check_tool(
        executor,
        "pytest",
        &tools.python,
        &["-m", "pytest", "--version"],
    );
    report.add(if config.run_tests() {
        pytest
    } else {
        pytest.optional()
    });

    if config.build_wheel() {
        report.add(check_repair_tool(tools, platform));
    }

    report.total_duration = start.elapsed();
    report
}

fn check_source_tree(source_root: &Path) -> CheckResult {
    if is_cmake_project(source_root) {
        CheckResult::pass(
            "Source tree",
            format!("{} has a CMakeLists.txt", source_root.display()),
        )
        .with_path(source_root.to_path_buf())
    } else {
        CheckResult::fail(
            "Source tree",
            format!("no CMakeLists.txt in {}", source_root.display()),
        )
    }
}

/// Run `program args...` and record its first output line as the version.
fn check_tool<E: CommandExecutor>(
    executor: &mut E,
    name: &str,
    program: &Path,
    args: &[&str],
) -> CheckResult {
    let start = Instant::now();
    let cmd = ProcessBuilder::new(program).args(args);

    let result = match executor.execute(&cmd) {
        Ok(outcome) if outcome.success() => {
            let text = if outcome.stdout_tail.trim().is_empty() {
                &outcome.stderr_tail
            } else {
                &outcome.stdout_tail
            };
            let version = text.lines().next().unwrap_or("").trim().to_string();
            let check = CheckResult::pass(name, format!("`{}` works", cmd.display_command()))
                .with_version(version);
            match find_executable(program) {
                Some(path) => check.with_path(path),
                None => check,
            }
        }
        Ok(outcome) => CheckResult::fail(
            name,
            format!(
                "`{}` exited with code {}",
                cmd.display_command(),
                outcome
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ),
        ),
        Err(e) => CheckResult::fail(
            name,
            format!("could not run `{}`: {}", program.display(), e),
        ),
    };

    result.with_duration(start.elapsed())
}

fn check_generator(generator: &str) -> CheckResult {
    let program = match generator.to_lowercase().as_str() {
        g if g.starts_with("ninja") => "ninja",
        g if g.contains("makefiles") => {
            if cfg!(windows) {
                "nmake"
            } else {
                "make"
            }
        }
        // Visual Studio and Xcode generators ship with their IDEs
        _ => {
            return CheckResult::pass("Generator", format!("{} (not checked)", generator))
                .optional()
        }
    };

    match find_executable(program) {
        Some(path) => {
            CheckResult::pass("Generator", format!("{} is available", program)).with_path(path)
        }
        None => CheckResult::fail(
            "Generator",
            format!(
                "`{}` not found on PATH (needed by the {} generator)",
                program, generator
            ),
        ),
    }
}

fn check_repair_tool(tools: &Tools, platform: PlatformTag) -> CheckResult {
    let tool = match (&tools.repair, platform.default_repair_tool()) {
        (_, None) => {
            return CheckResult::pass(
                "Wheel repair",
                format!("not supported on {}; the unrepaired wheel is used", platform),
            )
            .optional()
        }
        (Some(tool), Some(_)) => tool.clone(),
        (None, Some(default)) => PathBuf::from(default),
    };

    match find_executable(&tool) {
        Some(path) => CheckResult::pass("Wheel repair", format!("{} is available", tool.display()))
            .with_path(path)
            .optional(),
        None => CheckResult::fail(
            "Wheel repair",
            format!(
                "{} not found; wheels will be packaged unrepaired",
                tool.display()
            ),
        )
        .optional(),
    }
}

/// Format the doctor report for display.
pub fn format_report(report: &DoctorReport, verbose: bool) -> String {
    use std::fmt::Write;

    let mut output = String::new();

    let _ = writeln!(output, "kiln doctor");
    let _ = writeln!(output, "===========\n");

    if verbose {
        let _ = writeln!(output, "Environment:");
        for (key, value) in &report.environment {
            let _ = writeln!(output, "  {}: {}", key, value);
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "Checks:");
    for check in &report.checks {
        let status = if check.passed { "[OK]" } else { "[!!]" };
        let required = if check.required { "" } else { " (optional)" };
        let _ = writeln!(output, "  {} {}{}", status, check.name, required);

        if verbose || !check.passed {
            let _ = writeln!(output, "      {}", check.message);
        }
        if verbose {
            if let Some(path) = &check.path {
                let _ = writeln!(output, "      Path: {}", path.display());
            }
            if let Some(version) = &check.version {
                let _ = writeln!(output, "      Version: {}", version);
            }
        }
    }

    let _ = writeln!(output);

    let failed = report.failed_count();
    let required_failed = report.required_failed_count();

    let _ = writeln!(
        output,
        "Summary: {} passed, {} failed",
        report.passed_count(),
        failed
    );

    if required_failed > 0 {
        let _ = writeln!(
            output,
            "\n{} required check(s) failed. `kiln build` will not succeed.",
            required_failed
        );
    } else if failed > 0 {
        let _ = writeln!(
            output,
            "\nAll required checks passed. {} optional check(s) failed.",
            failed
        );
    } else {
        let _ = writeln!(output, "\nAll checks passed. Ready to build.");
    }

    output
}
