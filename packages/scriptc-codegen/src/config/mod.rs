//! Codegen configuration
//!
//! Two tiers:
//! - Preset: `CodegenConfig::preset(Preset::Release).build()?`
//! - YAML: `CodegenConfig::from_yaml_str(text)?`, preset plus field overrides
//!
//! Every path ends in `validate()`.

pub mod codegen_config;
pub mod error;
pub mod preset;

// Re-exports
pub use codegen_config::{CodegenConfig, CodegenConfigBuilder, OptimizationLevel, MAX_LOCALS_LIMIT};
pub use error::{ConfigError, ConfigResult};
pub use preset::Preset;
