//! Configuration file support for kiln.
//!
//! kiln reads two configuration files:
//! - Global: `~/.kiln/config.toml` - User-wide defaults
//! - Project: `kiln.toml` in the source root - Project-specific overrides
//!
//! Project config takes precedence over global config. Command-line flags
//! and `KILN_*` environment variables take precedence over both. A broken
//! global config is ignored with a warning; a broken project config is a
//! [`ConfigurationError`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::project::{PackageLayout, Tools};
use crate::core::{BuildOptions, ConfigurationError};

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "kiln.toml";

/// kiln configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// External tool overrides
    pub tools: ToolsConfig,

    /// Package layout
    pub package: PackageConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Hardware backend (cpu, vulkan, cuda, rocm, metal, opencl)
    pub backend: Option<String>,

    /// Parallel compile jobs (None = host logical cores)
    pub threads: Option<usize>,

    /// Run the test stage
    pub run_tests: Option<bool>,

    /// Build and repair a wheel
    pub build_wheel: Option<bool>,

    /// CMake build type
    pub build_type: Option<String>,

    /// Accelerator compiled into cpu builds, or "none"
    pub cpu_shim: Option<String>,

    /// Build directory, relative to the source root
    pub build_dir: Option<PathBuf>,

    /// Wheel output directory, relative to the source root
    pub output_dir: Option<PathBuf>,
}

/// Tool overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub cmake: Option<PathBuf>,
    pub python: Option<PathBuf>,
    pub cli: Option<String>,
    pub repair: Option<PathBuf>,
    pub generator: Option<String>,
    #[serde(default)]
    pub cmake_args: Vec<String>,
}

/// Package layout overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageConfig {
    pub dir: Option<PathBuf>,
    pub module: Option<String>,
    pub marker: Option<String>,
    pub libraries: Option<Vec<String>>,
    pub library_dir: Option<PathBuf>,
    pub tests_dir: Option<PathBuf>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        let b = other.build;
        merge_opt(&mut self.build.backend, b.backend);
        merge_opt(&mut self.build.threads, b.threads);
        merge_opt(&mut self.build.run_tests, b.run_tests);
        merge_opt(&mut self.build.build_wheel, b.build_wheel);
        merge_opt(&mut self.build.build_type, b.build_type);
        merge_opt(&mut self.build.cpu_shim, b.cpu_shim);
        merge_opt(&mut self.build.build_dir, b.build_dir);
        merge_opt(&mut self.build.output_dir, b.output_dir);

        let t = other.tools;
        merge_opt(&mut self.tools.cmake, t.cmake);
        merge_opt(&mut self.tools.python, t.python);
        merge_opt(&mut self.tools.cli, t.cli);
        merge_opt(&mut self.tools.repair, t.repair);
        merge_opt(&mut self.tools.generator, t.generator);
        if !t.cmake_args.is_empty() {
            self.tools.cmake_args = t.cmake_args;
        }

        let p = other.package;
        merge_opt(&mut self.package.dir, p.dir);
        merge_opt(&mut self.package.module, p.module);
        merge_opt(&mut self.package.marker, p.marker);
        merge_opt(&mut self.package.libraries, p.libraries);
        merge_opt(&mut self.package.library_dir, p.library_dir);
        merge_opt(&mut self.package.tests_dir, p.tests_dir);
        if !p.exclude.is_empty() {
            self.package.exclude = p.exclude;
        }
    }

    /// The build options this config contributes as a precedence layer.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            backend: self.build.backend.clone(),
            threads: self.build.threads.map(|n| n.to_string()),
            run_tests: self.build.run_tests,
            build_wheel: self.build.build_wheel,
            build_type: self.build.build_type.clone(),
            cpu_shim: self.build.cpu_shim.clone(),
            source_root: None,
            build_root: self.build.build_dir.clone(),
            output_dir: self.build.output_dir.clone(),
        }
    }

    /// Tools with defaults filled in.
    pub fn tools(&self) -> Tools {
        let defaults = Tools::default();
        Tools {
            cmake: self.tools.cmake.clone().unwrap_or(defaults.cmake),
            python: self.tools.python.clone().unwrap_or(defaults.python),
            cli: self.tools.cli.clone().unwrap_or(defaults.cli),
            repair: self.tools.repair.clone(),
            generator: self.tools.generator.clone(),
            cmake_args: self.tools.cmake_args.clone(),
        }
    }

    /// Package layout with defaults filled in.
    pub fn layout(&self) -> Result<PackageLayout, ConfigurationError> {
        let defaults = PackageLayout::default();
        let p = &self.package;
        let layout = PackageLayout {
            dir: p.dir.clone().unwrap_or(defaults.dir),
            module: p.module.clone().unwrap_or(defaults.module),
            marker: p.marker.clone().unwrap_or(defaults.marker),
            libraries: p.libraries.clone().unwrap_or(defaults.libraries),
            library_dir: p.library_dir.clone().unwrap_or(defaults.library_dir),
            tests_dir: p.tests_dir.clone().unwrap_or(defaults.tests_dir),
            exclude: p.exclude.clone(),
        };
        layout.validate()?;
        Ok(layout)
    }
}

fn merge_opt<T>(slot: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *slot = other;
    }
}

/// Load a config file, falling back to defaults with a warning on error.
fn load_or_default(path: &Path) -> Config {
    Config::load(path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
        Config::default()
    })
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (kiln.toml)
/// 2. Global config (~/.kiln/config.toml)
/// 3. Defaults
pub fn load_config(
    global_path: Option<&Path>,
    project_path: &Path,
) -> Result<Config, ConfigurationError> {
    let mut config = Config::default();

    if let Some(global) = global_path.filter(|p| p.exists()) {
        config.merge(load_or_default(global));
    }

    if project_path.exists() {
        let project = Config::load(project_path).map_err(|e| {
            ConfigurationError::rejected(
                "config file",
                project_path.display().to_string(),
                format!("{:#}", e),
            )
        })?;
        config.merge(project);
    }

    Ok(config)
}

/// Get the global kiln config directory (~/.kiln).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".kiln"))
}

/// Get the global config path (~/.kiln/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (kiln.toml in the source root).
pub fn project_config_path(source_root: &Path) -> PathBuf {
    source_root.join(PROJECT_CONFIG_FILE)
}
