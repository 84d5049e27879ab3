//! Command implementations

pub mod build;
pub mod clean;
pub mod completions;
pub mod doctor;
pub mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::cli::ConfigArgs;
use kiln::core::{BuildConfiguration, PackageLayout, Tools};
use kiln::util::config::{global_config_path, load_config, project_config_path};

/// Everything a command needs to know about the project.
pub struct Project {
    pub config: BuildConfiguration,
    pub tools: Tools,
    pub layout: PackageLayout,
}

/// Resolve flags, `KILN_*` variables and config files into a project.
///
/// Precedence: command line and environment, then kiln.toml, then
/// `~/.kiln/config.toml`, then defaults.
pub fn load_project(args: &ConfigArgs) -> Result<Project> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let source_root: PathBuf = match &args.source_root {
        Some(p) => cwd.join(p),
        None => cwd.clone(),
    };

    let file = load_config(
        global_config_path().as_deref(),
        &project_config_path(&source_root),
    )?;

    let options = args.options().or(file.build_options());
    let config = BuildConfiguration::from_options(&options, &cwd)?;
    tracing::debug!("Resolved configuration: {:?}", config);

    Ok(Project {
        config,
        tools: file.tools(),
        layout: file.layout()?,
    })
}
