//! Native libraries deliberately left out of repaired wheels.
//!
//! The list is a backend-independent base plus additions for the selected
//! backend. Entries are library-name prefixes that the repair tool matches
//! against file names such as `libcudart.so.12`.

use serde::Serialize;

use crate::core::backend::Backend;

/// Prefixes excluded for every backend.
pub const BASE_EXCLUSIONS: &[&str] = &["libvulkan", "libgomp"];

/// Prefixes excluded only for `backend`, assumed present on the target host.
pub fn backend_exclusions(backend: Backend) -> &'static [&'static str] {
    match backend {
        Backend::Cuda => &[
            "libcuda",
            "libcudart",
            "libcublas",
            "libcublasLt",
            "libnvidia-ml",
        ],
        Backend::Rocm => &["libamdhip64", "libhipblas", "librocblas", "libhsa-runtime64"],
        Backend::Opencl => &["libOpenCL"],
        Backend::Cpu | Backend::Vulkan | Backend::Metal => &[],
    }
}

/// Ordered, de-duplicated set of library-name prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionList {
    prefixes: Vec<String>,
}

impl ExclusionList {
    /// An empty list.
    pub fn new() -> Self {
        ExclusionList::default()
    }

    /// Base prefixes plus the additions for `backend`.
    pub fn for_backend(backend: Backend) -> Self {
        let mut list = ExclusionList::new();
        list.extend(BASE_EXCLUSIONS.iter().copied());
        list.extend(backend_exclusions(backend).iter().copied());
        list
    }

    /// Add one prefix; blanks and duplicates are ignored.
    pub fn push(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        let prefix = prefix.trim();
        if prefix.is_empty() || self.prefixes.iter().any(|p| p == prefix) {
            return;
        }
        self.prefixes.push(prefix.to_string());
    }

    pub fn extend<I, S>(&mut self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for prefix in prefixes {
            self.push(prefix);
        }
    }

    /// Builder form of [`ExclusionList::extend`].
    pub fn with<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extend(prefixes);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(|p| p.as_str())
    }
}
