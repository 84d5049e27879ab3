//! Build settings generation and CMake invocation.

pub mod cmake;
pub mod settings;

pub use cmake::CMakeBuilder;
pub use settings::{generate, GeneratedSettings, SettingValue};
