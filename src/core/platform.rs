//! Host platform detection.

use std::fmt;

use serde::Serialize;

/// Operating system family the orchestrator runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTag {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl PlatformTag {
    /// The platform this binary was compiled for.
    pub fn host() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` value.
    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" => PlatformTag::Linux,
            "macos" => PlatformTag::MacOs,
            "windows" => PlatformTag::Windows,
            _ => PlatformTag::Other,
        }
    }

    /// File name of a shared library called `name` on this platform.
    pub fn shared_library_name(&self, name: &str) -> String {
        match self {
            PlatformTag::Windows => format!("{}.dll", name),
            PlatformTag::MacOs => format!("lib{}.dylib", name),
            PlatformTag::Linux | PlatformTag::Other => format!("lib{}.so", name),
        }
    }

    /// Default wheel repair tool, if the platform supports repair.
    pub fn default_repair_tool(&self) -> Option<&'static str> {
        match self {
            PlatformTag::Linux => Some("auditwheel"),
            PlatformTag::MacOs => Some("delocate-wheel"),
            PlatformTag::Windows | PlatformTag::Other => None,
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlatformTag::Linux => "linux",
            PlatformTag::MacOs => "macos",
            PlatformTag::Windows => "windows",
            PlatformTag::Other => "other",
        };
        f.write_str(s)
    }
}
