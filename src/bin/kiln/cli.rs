//! CLI definitions using clap.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};

use kiln::core::BuildOptions;
use kiln::ops::pipeline::types::OutputFormat;
use kiln::util::shell::ColorChoice;

/// Kiln - build a native library for one backend and package its Python wheel
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Stream tool output and enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Whether the selected command writes machine-readable output.
    pub fn wants_json(&self) -> bool {
        match &self.command {
            Commands::Build(args) => args.format == OutputFormat::Json,
            Commands::Settings(args) => args.json,
            _ => false,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure, compile, install, validate, test and package
    Build(BuildArgs),

    /// Print the generated CMake settings without building
    Settings(SettingsArgs),

    /// Check that the tools a build needs are installed
    Doctor(DoctorArgs),

    /// Remove the build and output directories
    Clean(CleanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Options that resolve into a build configuration.
///
/// Each flag can also be set through its `KILN_*` environment variable;
/// unset values fall back to kiln.toml, then to defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Compute backend: cpu, vulkan, cuda, rocm, metal, opencl
    #[arg(short, long, env = "KILN_BACKEND")]
    pub backend: Option<String>,

    /// Parallel compile jobs (positive integer)
    #[arg(short = 'j', long, env = "KILN_THREADS")]
    pub threads: Option<String>,

    /// Run the test suite after validation
    #[arg(
        long,
        env = "KILN_RUN_TESTS",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub run_tests: Option<bool>,

    /// Build and repair a wheel
    #[arg(
        long,
        env = "KILN_BUILD_WHEEL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub build_wheel: Option<bool>,

    /// CMake build type: Release, Debug, RelWithDebInfo, MinSizeRel
    #[arg(long, env = "KILN_BUILD_TYPE")]
    pub build_type: Option<String>,

    /// Accelerator compiled alongside the cpu backend, or `none`
    #[arg(long, env = "KILN_CPU_SHIM")]
    pub cpu_shim: Option<String>,

    /// Source tree containing CMakeLists.txt (defaults to the current directory)
    #[arg(long, env = "KILN_SOURCE_ROOT", value_name = "DIR")]
    pub source_root: Option<PathBuf>,

    /// Build directory, relative to the source root
    #[arg(long, env = "KILN_BUILD_DIR", value_name = "DIR")]
    pub build_dir: Option<PathBuf>,

    /// Directory receiving the final wheel, relative to the source root
    #[arg(long, env = "KILN_OUT_DIR", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}

impl ConfigArgs {
    /// The highest-precedence option layer.
    pub fn options(&self) -> BuildOptions {
        BuildOptions {
            backend: self.backend.clone(),
            threads: self.threads.clone(),
            run_tests: self.run_tests,
            build_wheel: self.build_wheel,
            build_type: self.build_type.clone(),
            cpu_shim: self.cpu_shim.clone(),
            source_root: self.source_root.clone(),
            build_root: self.build_dir.clone(),
            output_dir: self.out_dir.clone(),
        }
    }
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Print the planned stages and commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Report format: human, json, github
    #[arg(long, env = "KILN_FORMAT", default_value = "human")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct SettingsArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Print the settings as JSON instead of a CMake cache script
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args)]
pub struct CleanArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Keep the output directory
    #[arg(long)]
    pub keep_dist: bool,

    /// Show what would be removed
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
