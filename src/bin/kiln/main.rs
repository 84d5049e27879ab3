//! Kiln CLI - build a native library backend and package its Python wheel

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use kiln::core::ConfigurationError;
use kiln::util::diagnostic::{emit, suggestions, Diagnostic};
use kiln::util::process::install_interrupt_handler;
use kiln::util::Shell;

fn main() {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let default_filter = if cli.verbose {
        "kiln=debug"
    } else if cli.quiet {
        "kiln=warn"
    } else {
        "kiln=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    if let Err(e) = install_interrupt_handler() {
        tracing::debug!("Failed to install interrupt handler: {:#}", e);
    }

    let shell = Shell::from_flags(cli.quiet, cli.verbose, cli.color, cli.wants_json());

    let code = match run(cli, &shell) {
        Ok(code) => code,
        Err(e) => report_error(&e, &shell),
    };
    std::process::exit(code);
}

fn run(cli: Cli, shell: &Shell) -> Result<i32> {
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, shell),
        Commands::Settings(args) => commands::settings::execute(args, shell),
        Commands::Doctor(args) => commands::doctor::execute(args, shell),
        Commands::Clean(args) => commands::clean::execute(args, shell),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Print an error that escaped a command and pick the exit code.
fn report_error(e: &anyhow::Error, shell: &Shell) -> i32 {
    if let Some(config_error) = e.downcast_ref::<ConfigurationError>() {
        let mut diag = Diagnostic::error(config_error.to_string());
        if let Some(help) = &config_error.help {
            diag = diag.with_suggestion(help);
        }
        emit(&diag.with_suggestion(suggestions::CONFIGURATION), shell.use_color());
        return 2;
    }

    eprintln!("error: {:#}", e);
    1
}
