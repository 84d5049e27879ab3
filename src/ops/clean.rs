//! Removal of build and output directories.

use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

use crate::core::BuildConfiguration;
use crate::util::fs::remove_dir_all_if_exists;

/// Which directories `kiln clean` removes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanOptions {
    /// Keep the output directory (built wheels)
    pub keep_dist: bool,
    /// Report what would be removed without touching anything
    pub dry_run: bool,
}

/// A directory that was (or would be) removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub path: PathBuf,
    pub files: usize,
    pub bytes: u64,
}

/// Remove the build root and, unless kept, the output directory.
///
/// Directories that do not exist are skipped.
pub fn clean(config: &BuildConfiguration, options: CleanOptions) -> Result<Vec<Removed>> {
    let mut targets = vec![config.build_root()];
    if !options.keep_dist {
        targets.push(config.output_dir());
    }

    let mut removed = Vec::new();
    for dir in targets {
        if !dir.exists() {
            continue;
        }
        // The output dir may live inside the build root.
        if removed.iter().any(|r: &Removed| dir.starts_with(&r.path)) {
            continue;
        }

        let (files, bytes) = measure(dir);
        if !options.dry_run {
            remove_dir_all_if_exists(dir)?;
        }
        tracing::debug!("Removed {} ({} files)", dir.display(), files);
        removed.push(Removed {
            path: dir.to_path_buf(),
            files,
            bytes,
        });
    }

    Ok(removed)
}

fn measure(dir: &Path) -> (usize, u64) {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(files, bytes), e| {
            let len = e.metadata().map(|m| m.len()).unwrap_or(0);
            (files + 1, bytes + len)
        })
}
