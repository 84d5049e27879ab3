//! `kiln clean` command

use anyhow::Result;

use crate::cli::CleanArgs;
use crate::commands::load_project;
use kiln::ops::{clean, CleanOptions};
use kiln::util::fs::relative_path;
use kiln::util::shell::{Shell, Status};

pub fn execute(args: CleanArgs, shell: &Shell) -> Result<i32> {
    let project = load_project(&args.config)?;

    let options = CleanOptions {
        keep_dist: args.keep_dist,
        dry_run: args.dry_run,
    };
    let removed = clean(&project.config, options)?;

    if removed.is_empty() {
        shell.note("nothing to clean");
    }
    for dir in removed {
        let status = if args.dry_run {
            Status::Skipped
        } else {
            Status::Removed
        };
        shell.status(
            status,
            format!(
                "{} ({} files, {} KiB)",
                relative_path(project.config.source_root(), &dir.path).display(),
                dir.files,
                dir.bytes / 1024
            ),
        );
    }

    Ok(0)
}
