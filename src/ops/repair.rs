//! Wheel repair: vendor native dependencies into the wheel with the
//! platform's repair tool, leaving excluded libraries to the target host.
//!
//! Repair is best-effort. If the tool is unavailable or fails, the
//! unrepaired wheel is copied to the output directory and the problem is
//! reported as a [`RepairWarning`]. Only a failed copy is fatal.

use std::path::PathBuf;

use crate::core::{
    Artifact, ExclusionList, MissingArtifactError, PlatformTag, RepairWarning, StageKind,
};
use crate::util::fs::{copy_into, ensure_dir, files_with_extension};
use crate::util::process::{CommandExecutor, ProcessBuilder};

/// Result of repairing one wheel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// The wheel now in the output directory
    pub artifact: Artifact,
    /// Set when the unrepaired wheel was used
    pub warning: Option<RepairWarning>,
}

impl RepairOutcome {
    pub fn is_repaired(&self) -> bool {
        self.warning.is_none()
    }
}

/// Repairs wheels into an output directory.
pub struct PackageRepairer<'e, E: CommandExecutor> {
    executor: &'e mut E,
    output_dir: PathBuf,
    tool: Option<PathBuf>,
}

impl<'e, E: CommandExecutor> PackageRepairer<'e, E> {
    pub fn new(executor: &'e mut E, output_dir: impl Into<PathBuf>) -> Self {
        PackageRepairer {
            executor,
            output_dir: output_dir.into(),
            tool: None,
        }
    }

    /// Use a specific repair executable instead of the platform default.
    pub fn tool(mut self, tool: Option<PathBuf>) -> Self {
        self.tool = tool;
        self
    }

    /// Repair `wheel` into the output directory.
    pub fn repair(
        &mut self,
        wheel: &Artifact,
        exclusions: &ExclusionList,
        platform: PlatformTag,
    ) -> Result<RepairOutcome, MissingArtifactError> {
        let Some(cmd) = self.repair_command(wheel, exclusions, platform) else {
            return self.fallback(wheel, format!("wheel repair is not supported on {}", platform));
        };

        if let Err(e) = ensure_dir(&self.output_dir) {
            return self.fallback(wheel, format!("{:#}", e));
        }
        self.remove_previous(wheel);

        let command_line = cmd.display_command();
        tracing::info!("Repairing {}", wheel.file_name());
        tracing::debug!("{}", command_line);

        let outcome = match self.executor.execute(&cmd) {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = format!("could not run `{}`: {}", cmd.get_program().display(), e);
                return self.fallback(wheel, reason);
            }
        };

        if !outcome.success() {
            let detail = last_line(&outcome.stderr_tail)
                .or_else(|| last_line(&outcome.stdout_tail))
                .map(|l| format!(": {}", l))
                .unwrap_or_default();
            let reason = match outcome.exit_code {
                Some(code) => format!("`{}` exited with code {}{}", command_line, code, detail),
                None => format!("`{}` was terminated by a signal{}", command_line, detail),
            };
            return self.fallback(wheel, reason);
        }

        match self.repaired_wheel(wheel) {
            Some(path) => Ok(RepairOutcome {
                artifact: Artifact::wheel(path),
                warning: None,
            }),
            None => self.fallback(
                wheel,
                format!(
                    "`{}` finished but wrote no wheel to {}",
                    command_line,
                    self.output_dir.display()
                ),
            ),
        }
    }

    /// The repair invocation for `platform`, or `None` if unsupported.
    pub fn repair_command(
        &self,
        wheel: &Artifact,
        exclusions: &ExclusionList,
        platform: PlatformTag,
    ) -> Option<ProcessBuilder> {
        let default_tool = platform.default_repair_tool()?;
        let tool = self
            .tool
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_tool));

        let cmd = match platform {
            PlatformTag::Linux => exclusions.iter().fold(
                ProcessBuilder::new(tool)
                    .arg("repair")
                    .arg(wheel.path())
                    .arg("-w")
                    .arg(&self.output_dir),
                |cmd, prefix| cmd.arg("--exclude").arg(format!("{}*", prefix)),
            ),
            PlatformTag::MacOs => exclusions
                .iter()
                .fold(
                    ProcessBuilder::new(tool).arg("-w").arg(&self.output_dir),
                    |cmd, prefix| cmd.arg("--exclude").arg(prefix),
                )
                .arg(wheel.path()),
            PlatformTag::Windows | PlatformTag::Other => return None,
        };
        Some(cmd)
    }

    /// Find the wheel the tool wrote for `wheel`, matched on `name-version-`.
    fn repaired_wheel(&self, wheel: &Artifact) -> Option<PathBuf> {
        self.matching_wheels(wheel)
            .into_iter()
            .filter(|p| p.metadata().map(|m| m.len() > 0).unwrap_or(false))
            .max_by_key(|p| p.metadata().and_then(|m| m.modified()).ok())
    }

    /// Delete wheels of the same distribution left by an earlier run.
    fn remove_previous(&self, wheel: &Artifact) {
        for path in self.matching_wheels(wheel) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!("Could not remove {}: {}", path.display(), e);
            }
        }
    }

    fn matching_wheels(&self, wheel: &Artifact) -> Vec<PathBuf> {
        let prefix = distribution_prefix(&wheel.file_name());
        files_with_extension(&self.output_dir, "whl")
            .unwrap_or_default()
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn fallback(
        &self,
        wheel: &Artifact,
        reason: String,
    ) -> Result<RepairOutcome, MissingArtifactError> {
        tracing::warn!("Using unrepaired wheel {}: {}", wheel.file_name(), reason);

        let copied = copy_into(wheel.path(), &self.output_dir).map_err(|e| {
            tracing::debug!("Fallback copy failed: {:#}", e);
            MissingArtifactError {
                stage: StageKind::Package,
                what: "wheel".to_string(),
                missing: vec![self.output_dir.join(wheel.file_name())],
            }
        })?;

        Ok(RepairOutcome {
            artifact: Artifact::wheel(copied),
            warning: Some(RepairWarning {
                wheel: wheel.path.clone(),
                reason,
            }),
        })
    }
}

/// `name-version-` of a wheel file name.
fn distribution_prefix(file_name: &str) -> String {
    let mut parts = file_name.splitn(3, '-');
    match (parts.next(), parts.next()) {
        (Some(name), Some(version)) => format!("{}-{}-", name, version),
        _ => file_name.trim_end_matches(".whl").to_string(),
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}
