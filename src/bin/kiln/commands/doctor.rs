//! `kiln doctor` command

use anyhow::Result;

use crate::cli::DoctorArgs;
use crate::commands::load_project;
use kiln::core::PlatformTag;
use kiln::ops::doctor::{doctor, format_report};
use kiln::util::process::SystemExecutor;
use kiln::util::shell::Shell;

pub fn execute(args: DoctorArgs, shell: &Shell) -> Result<i32> {
    let project = load_project(&args.config)?;

    let mut executor = SystemExecutor::new();
    let report = doctor(
        &project.config,
        &project.tools,
        PlatformTag::host(),
        &mut executor,
    );

    print!("{}", format_report(&report, shell.is_verbose()));

    // Exit with error code if required checks failed
    Ok(if report.all_required_passed() { 0 } else { 1 })
}
