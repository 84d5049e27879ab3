//! Backend-specific CMake settings.
//!
//! [`generate`] maps a [`BuildConfiguration`] onto an ordered list of CMake
//! cache entries: a fixed baseline that switches every accelerator off,
//! followed by exactly one override block for the selected backend. The
//! mapping is pure, so the rendered settings file is byte-identical across
//! runs with the same configuration.

use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::core::{Backend, BuildConfiguration};
use crate::util::fs::write_string;

/// Location of the settings file, relative to the build root.
pub const SETTINGS_FILE: &str = "kiln/settings.cmake";

/// Bundled native sources, relative to the source root.
pub const DEFAULT_DEPENDENCY_DIR: &str = "vendor/llama.cpp";

const CUDA_ARCHITECTURES: &str = "70;75;80;86;89;90";
const AMDGPU_TARGETS: &str = "gfx906;gfx908;gfx90a;gfx1030;gfx1100";

/// A single cache value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
}

impl SettingValue {
    pub fn is_on(&self) -> bool {
        matches!(self, SettingValue::Bool(true))
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(true) => f.write_str("ON"),
            SettingValue::Bool(false) => f.write_str("OFF"),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        SettingValue::Bool(b)
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        SettingValue::Text(s.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        SettingValue::Text(s)
    }
}

/// Ordered mapping of CMake cache names to values.
///
/// Setting an existing name replaces its value where it stands, so an
/// override never moves an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedSettings {
    entries: Vec<(String, SettingValue)>,
}

impl GeneratedSettings {
    pub fn new() -> Self {
        GeneratedSettings::default()
    }

    /// Insert or replace an entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Accelerator flags currently switched on.
    pub fn enabled_accelerators(&self) -> Vec<&str> {
        Backend::accelerator_flags()
            .filter(|flag| self.get(flag).is_some_and(SettingValue::is_on))
            .collect()
    }

    /// Render as a CMake initial-cache script for `cmake -C`.
    pub fn render_cmake(&self) -> String {
        let mut out = String::new();
        out.push_str("# Generated by kiln. Do not edit; regenerate with `kiln settings`.\n");
        for (name, value) in &self.entries {
            match value {
                SettingValue::Bool(_) => {
                    let _ = writeln!(out, "set({} {} CACHE BOOL \"\" FORCE)", name, value);
                }
                SettingValue::Text(text) => {
                    let _ = writeln!(
                        out,
                        "set({} \"{}\" CACHE STRING \"\" FORCE)",
                        name,
                        escape_cmake(text)
                    );
                }
            }
        }
        out
    }

    /// SHA-256 of the rendered settings, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.render_cmake().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Write the rendered settings under `build_root`, returning the path.
    pub fn write(&self, build_root: &Path) -> Result<PathBuf> {
        let path = settings_path(build_root);
        write_string(&path, &self.render_cmake())?;
        tracing::debug!("Wrote {}", path.display());
        Ok(path)
    }
}

impl Serialize for GeneratedSettings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, &value.to_string())?;
        }
        map.end()
    }
}

/// Path of the settings file for a build root.
pub fn settings_path(build_root: &Path) -> PathBuf {
    build_root.join(SETTINGS_FILE)
}

/// Derive the settings for a configuration.
pub fn generate(config: &BuildConfiguration) -> GeneratedSettings {
    let mut settings = baseline(config);

    match config.backend() {
        Backend::Cpu => {
            settings.set("GGML_OPENMP", true);
            if let Some(flag) = config.effective_cpu_shim().and_then(|b| b.flag()) {
                settings.set(flag, true);
            }
        }
        Backend::Vulkan => {
            settings.set("GGML_VULKAN", true);
        }
        Backend::Cuda => {
            settings.set("GGML_CUDA", true);
            settings.set("CMAKE_CUDA_ARCHITECTURES", CUDA_ARCHITECTURES);
        }
        Backend::Rocm => {
            settings.set("GGML_HIP", true);
            settings.set("AMDGPU_TARGETS", AMDGPU_TARGETS);
        }
        Backend::Metal => {
            settings.set("GGML_METAL", true);
            settings.set("GGML_METAL_EMBED_LIBRARY", true);
        }
        Backend::Opencl => {
            settings.set("GGML_OPENCL", true);
            settings.set("GGML_OPENCL_EMBED_KERNELS", true);
        }
    }

    settings
}

fn baseline(config: &BuildConfiguration) -> GeneratedSettings {
    let mut settings = GeneratedSettings::new();
    settings.set("CMAKE_BUILD_TYPE", config.build_type().as_str());
    settings.set("BUILD_SHARED_LIBS", true);
    settings.set(
        "LLAMA_SOURCE_DIR",
        cmake_path(&config.source_root().join(DEFAULT_DEPENDENCY_DIR)),
    );
    settings.set("LLAMA_BUILD_TESTS", false);
    settings.set("LLAMA_BUILD_EXAMPLES", false);
    settings.set("GGML_NATIVE", false);
    for flag in Backend::accelerator_flags() {
        settings.set(flag, false);
    }
    settings
}

/// CMake wants forward slashes on every platform.
fn cmake_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

fn escape_cmake(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
