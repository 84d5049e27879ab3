//! Build configuration.
//!
//! A [`BuildConfiguration`] is resolved once per invocation from layered
//! [`BuildOptions`] (command line and environment, project config, global
//! config) and is never mutated afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::backend::Backend;
use crate::core::error::ConfigurationError;

/// CMake build type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildType {
    #[default]
    Release,
    Debug,
    RelWithDebInfo,
    MinSizeRel,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Release => "Release",
            BuildType::Debug => "Debug",
            BuildType::RelWithDebInfo => "RelWithDebInfo",
            BuildType::MinSizeRel => "MinSizeRel",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "release" => Ok(BuildType::Release),
            "debug" => Ok(BuildType::Debug),
            "relwithdebinfo" => Ok(BuildType::RelWithDebInfo),
            "minsizerel" => Ok(BuildType::MinSizeRel),
            _ => Err(ConfigurationError::invalid_value(
                "build type",
                s,
                "Release, Debug, RelWithDebInfo, MinSizeRel",
            )),
        }
    }
}

/// The backend compiled in alongside plain CPU kernels when `backend = "cpu"`.
pub const DEFAULT_CPU_SHIM: Option<Backend> = Some(Backend::Vulkan);

/// Parse a cpu shim value: an accelerator backend name, or `none`.
pub fn parse_cpu_shim(s: &str) -> Result<Option<Backend>, ConfigurationError> {
    match s.trim().to_lowercase().as_str() {
        "none" | "off" | "" => Ok(None),
        _ => {
            let backend: Backend = s.parse().map_err(|_| {
                ConfigurationError::invalid_value(
                    "cpu shim",
                    s,
                    "none, vulkan, cuda, rocm, metal, opencl",
                )
            })?;
            if !backend.is_accelerator() {
                return Err(ConfigurationError::rejected(
                    "cpu shim",
                    s,
                    "the cpu shim must be an accelerator backend or `none`",
                ));
            }
            Ok(Some(backend))
        }
    }
}

/// Unvalidated option values from one configuration layer.
///
/// Every field is optional; [`BuildOptions::or`] fills gaps from a lower
/// precedence layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub backend: Option<String>,
    pub threads: Option<String>,
    pub run_tests: Option<bool>,
    pub build_wheel: Option<bool>,
    pub build_type: Option<String>,
    pub cpu_shim: Option<String>,
    pub source_root: Option<PathBuf>,
    pub build_root: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl BuildOptions {
    /// Fill unset fields from `lower`.
    pub fn or(self, lower: BuildOptions) -> BuildOptions {
        BuildOptions {
            backend: self.backend.or(lower.backend),
            threads: self.threads.or(lower.threads),
            run_tests: self.run_tests.or(lower.run_tests),
            build_wheel: self.build_wheel.or(lower.build_wheel),
            build_type: self.build_type.or(lower.build_type),
            cpu_shim: self.cpu_shim.or(lower.cpu_shim),
            source_root: self.source_root.or(lower.source_root),
            build_root: self.build_root.or(lower.build_root),
            output_dir: self.output_dir.or(lower.output_dir),
        }
    }
}

/// Host logical core count, falling back to 1.
pub fn host_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolved, immutable configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildConfiguration {
    backend: Backend,
    threads: usize,
    run_tests: bool,
    build_wheel: bool,
    build_type: BuildType,
    cpu_shim: Option<Backend>,
    source_root: PathBuf,
    build_root: PathBuf,
    output_dir: PathBuf,
}

impl BuildConfiguration {
    /// A configuration with defaults for everything but backend and source root.
    pub fn new(backend: Backend, source_root: impl Into<PathBuf>) -> Self {
        let source_root = source_root.into();
        BuildConfiguration {
            backend,
            threads: host_threads(),
            run_tests: false,
            build_wheel: false,
            build_type: BuildType::default(),
            cpu_shim: DEFAULT_CPU_SHIM,
            build_root: source_root.join("build"),
            output_dir: source_root.join("dist"),
            source_root,
        }
    }

    /// Validate layered options into a configuration.
    ///
    /// Relative build and output directories are resolved against the source
    /// root. `cwd` is the source root when none is given.
    pub fn from_options(options: &BuildOptions, cwd: &Path) -> Result<Self, ConfigurationError> {
        let backend = match options.backend.as_deref() {
            Some(s) => s.parse()?,
            None => Backend::DEFAULT,
        };

        let threads = match options.threads.as_deref() {
            Some(s) => parse_threads(s)?,
            None => host_threads(),
        };

        let build_type = match options.build_type.as_deref() {
            Some(s) => s.parse()?,
            None => BuildType::default(),
        };

        let cpu_shim = match options.cpu_shim.as_deref() {
            Some(s) => parse_cpu_shim(s)?,
            None => DEFAULT_CPU_SHIM,
        };

        let source_root = match &options.source_root {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => cwd.join(p),
            None => cwd.to_path_buf(),
        };

        let build_root = resolve_under(&source_root, options.build_root.as_deref(), "build");
        let output_dir = resolve_under(&source_root, options.output_dir.as_deref(), "dist");

        Ok(BuildConfiguration {
            backend,
            threads,
            run_tests: options.run_tests.unwrap_or(false),
            build_wheel: options.build_wheel.unwrap_or(false),
            build_type,
            cpu_shim,
            source_root,
            build_root,
            output_dir,
        })
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_run_tests(mut self, run_tests: bool) -> Self {
        self.run_tests = run_tests;
        self
    }

    pub fn with_build_wheel(mut self, build_wheel: bool) -> Self {
        self.build_wheel = build_wheel;
        self
    }

    pub fn with_build_type(mut self, build_type: BuildType) -> Self {
        self.build_type = build_type;
        self
    }

    pub fn with_cpu_shim(mut self, shim: Option<Backend>) -> Self {
        self.cpu_shim = shim.filter(|b| b.is_accelerator());
        self
    }

    pub fn with_build_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_root = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn run_tests(&self) -> bool {
        self.run_tests
    }

    pub fn build_wheel(&self) -> bool {
        self.build_wheel
    }

    pub fn build_type(&self) -> BuildType {
        self.build_type
    }

    /// The accelerator compiled in for cpu builds; `None` for other backends.
    pub fn effective_cpu_shim(&self) -> Option<Backend> {
        match self.backend {
            Backend::Cpu => self.cpu_shim,
            _ => None,
        }
    }

    pub fn cpu_shim(&self) -> Option<Backend> {
        self.cpu_shim
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

fn parse_threads(s: &str) -> Result<usize, ConfigurationError> {
    let n: usize = s.trim().parse().map_err(|_| {
        ConfigurationError::rejected("thread count", s, "expected a positive integer")
    })?;
    if n == 0 {
        return Err(ConfigurationError::rejected(
            "thread count",
            s,
            "the thread count must be at least 1",
        ));
    }
    Ok(n)
}

fn resolve_under(root: &Path, dir: Option<&Path>, default: &str) -> PathBuf {
    match dir {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => root.join(p),
        None => root.join(default),
    }
}
