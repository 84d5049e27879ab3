//! Artifact verification.
//!
//! A stage whose tool exits zero but leaves no usable output is still a
//! failure; these checks gate progress on the files themselves.

use std::path::{Path, PathBuf};

use crate::core::{Artifact, ArtifactKind, MissingArtifactError, StageKind};
use crate::util::fs::files_with_extension;

/// Checks produced files on disk.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactInspector {
    stage: StageKind,
}

impl ArtifactInspector {
    /// Inspector attributing missing files to `stage`.
    pub fn new(stage: StageKind) -> Self {
        ArtifactInspector { stage }
    }

    /// Require every expected artifact to exist as a non-empty file.
    ///
    /// An empty expectation never passes.
    pub fn verify(&self, expected: &[Artifact]) -> Result<Vec<Artifact>, MissingArtifactError> {
        if expected.is_empty() {
            return Err(MissingArtifactError {
                stage: self.stage,
                what: "artifacts".to_string(),
                missing: Vec::new(),
            });
        }

        let missing: Vec<PathBuf> = expected
            .iter()
            .filter(|a| !is_nonempty_file(a.path()))
            .map(|a| a.path.clone())
            .collect();

        if !missing.is_empty() {
            return Err(MissingArtifactError {
                stage: self.stage,
                what: describe(expected),
                missing,
            });
        }

        for artifact in expected {
            tracing::debug!("Verified {}", artifact);
        }
        Ok(expected.to_vec())
    }

    /// Require at least one non-empty `*.whl` file in `dir`.
    pub fn find_wheels(&self, dir: &Path) -> Result<Vec<Artifact>, MissingArtifactError> {
        let wheels: Vec<Artifact> = files_with_extension(dir, "whl")
            .unwrap_or_default()
            .into_iter()
            .filter(|p| is_nonempty_file(p))
            .map(Artifact::wheel)
            .collect();

        if wheels.is_empty() {
            return Err(MissingArtifactError {
                stage: self.stage,
                what: "wheel".to_string(),
                missing: vec![dir.join("*.whl")],
            });
        }
        Ok(wheels)
    }
}

fn is_nonempty_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

fn describe(expected: &[Artifact]) -> String {
    match expected.first() {
        Some(a) if expected.len() == 1 => a.kind.to_string(),
        Some(a) => match a.kind {
            ArtifactKind::SharedLibrary => "shared libraries".to_string(),
            ArtifactKind::WheelPackage => "wheels".to_string(),
        },
        None => "artifacts".to_string(),
    }
}
