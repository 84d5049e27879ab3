//! External tools and package layout the pipeline drives.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::error::ConfigurationError;

/// Executables invoked by the pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tools {
    pub cmake: PathBuf,
    pub python: PathBuf,
    /// Command-line entry point installed by the package
    pub cli: String,
    /// Wheel repair tool; `None` uses the platform default
    pub repair: Option<PathBuf>,
    /// CMake generator passed with `-G`
    pub generator: Option<String>,
    /// Extra arguments for the configure command
    pub cmake_args: Vec<String>,
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            cmake: PathBuf::from("cmake"),
            python: PathBuf::from(default_python()),
            cli: "llama-chat".to_string(),
            repair: None,
            generator: None,
            cmake_args: Vec::new(),
        }
    }
}

fn default_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Marker printed by the import probe on success.
pub const DEFAULT_IMPORT_MARKER: &str = "kiln-import-ok";

/// Fewest distinct shared libraries a compile must produce.
pub const MIN_SHARED_LIBRARIES: usize = 2;

/// Where the Python package lives and what the build must produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageLayout {
    /// Package directory, relative to the source root
    pub dir: PathBuf,
    /// Import name checked by the validate stage
    pub module: String,
    /// Text the import probe prints on success
    pub marker: String,
    /// Shared libraries the compile stage must produce (bare names)
    pub libraries: Vec<String>,
    /// Directory holding the shared libraries, relative to the build root
    pub library_dir: PathBuf,
    /// Test directory, relative to the source root
    pub tests_dir: PathBuf,
    /// Extra library prefixes excluded from wheel repair
    pub exclude: Vec<String>,
}

impl Default for PackageLayout {
    fn default() -> Self {
        PackageLayout {
            dir: PathBuf::from("."),
            module: "llama_chat".to_string(),
            marker: DEFAULT_IMPORT_MARKER.to_string(),
            libraries: vec!["llama".to_string(), "ggml".to_string()],
            library_dir: PathBuf::from("bin"),
            tests_dir: PathBuf::from("tests"),
            exclude: Vec::new(),
        }
    }
}

impl PackageLayout {
    /// Reject a layout that would leave the compile output unchecked.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut names: Vec<&str> = self
            .libraries
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        names.sort_unstable();
        names.dedup();

        if names.len() < MIN_SHARED_LIBRARIES {
            return Err(ConfigurationError::rejected(
                "package.libraries",
                format!("[{}]", self.libraries.join(", ")),
                format!(
                    "list at least {} distinct shared libraries the compile must produce",
                    MIN_SHARED_LIBRARIES
                ),
            ));
        }
        Ok(())
    }

    pub fn package_dir(&self, source_root: &Path) -> PathBuf {
        source_root.join(&self.dir)
    }

    pub fn library_dir(&self, build_root: &Path) -> PathBuf {
        build_root.join(&self.library_dir)
    }

    pub fn tests_dir(&self, source_root: &Path) -> PathBuf {
        source_root.join(&self.tests_dir)
    }
}
