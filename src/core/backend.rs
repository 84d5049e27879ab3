//! Hardware acceleration backends.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigurationError;

/// The hardware acceleration target a build is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// No accelerator; plain CPU kernels.
    Cpu,
    /// Portable GPU backend through the Vulkan API.
    Vulkan,
    /// NVIDIA CUDA toolkit.
    Cuda,
    /// AMD ROCm/HIP toolkit.
    Rocm,
    /// Apple Metal.
    Metal,
    /// OpenCL.
    Opencl,
}

impl Backend {
    /// Every backend, in declaration order.
    pub const ALL: [Backend; 6] = [
        Backend::Cpu,
        Backend::Vulkan,
        Backend::Cuda,
        Backend::Rocm,
        Backend::Metal,
        Backend::Opencl,
    ];

    /// Backends that own an accelerator flag in the generated settings.
    pub const ACCELERATORS: [Backend; 5] = [
        Backend::Vulkan,
        Backend::Cuda,
        Backend::Rocm,
        Backend::Metal,
        Backend::Opencl,
    ];

    /// The backend used when none is configured.
    pub const DEFAULT: Backend = Backend::Vulkan;

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Cpu => "cpu",
            Backend::Vulkan => "vulkan",
            Backend::Cuda => "cuda",
            Backend::Rocm => "rocm",
            Backend::Metal => "metal",
            Backend::Opencl => "opencl",
        }
    }

    /// Whether this backend drives an accelerator.
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Backend::Cpu)
    }

    /// The CMake cache flag that enables this backend, if it has one.
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            Backend::Cpu => None,
            Backend::Vulkan => Some("GGML_VULKAN"),
            Backend::Cuda => Some("GGML_CUDA"),
            Backend::Rocm => Some("GGML_HIP"),
            Backend::Metal => Some("GGML_METAL"),
            Backend::Opencl => Some("GGML_OPENCL"),
        }
    }

    /// All accelerator flags, in baseline order.
    pub fn accelerator_flags() -> impl Iterator<Item = &'static str> {
        Backend::ACCELERATORS.iter().filter_map(|b| b.flag())
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::DEFAULT
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Backend::Cpu),
            "vulkan" => Ok(Backend::Vulkan),
            "cuda" => Ok(Backend::Cuda),
            "rocm" | "hip" => Ok(Backend::Rocm),
            "metal" => Ok(Backend::Metal),
            "opencl" => Ok(Backend::Opencl),
            _ => Err(ConfigurationError::invalid_value(
                "backend",
                s,
                "cpu, vulkan, cuda, rocm, metal, opencl",
            )),
        }
    }
}
