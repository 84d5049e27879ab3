//! Build outputs whose existence gates pipeline progress.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// What an artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    SharedLibrary,
    WheelPackage,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::SharedLibrary => write!(f, "shared library"),
            ArtifactKind::WheelPackage => write!(f, "wheel"),
        }
    }
}

/// A file on disk plus what kind of output it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn shared_library(path: impl Into<PathBuf>) -> Self {
        Artifact {
            path: path.into(),
            kind: ArtifactKind::SharedLibrary,
        }
    }

    pub fn wheel(path: impl Into<PathBuf>) -> Self {
        Artifact {
            path: path.into(),
            kind: ArtifactKind::WheelPackage,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file name, or the whole path when it has none.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.kind)
    }
}
