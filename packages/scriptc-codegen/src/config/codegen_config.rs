//! Codegen configuration: preset defaults, builder overrides and YAML loading

use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;

/// Local-slot limit of the target executable format
pub const MAX_LOCALS_LIMIT: usize = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    #[default]
    Debug,
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodegenConfig {
    pub optimization: OptimizationLevel,
    /// Record a sequence point per statement that carries a span
    pub emit_sequence_points: bool,
    /// Local slots allowed per body
    pub max_locals: usize,
    /// Populate declarations and generate routines on the Rayon pool
    pub parallel: bool,
    /// Prefix stripped from unit paths before they are indexed
    pub base_directory: Option<String>,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Debug)
    }
}

impl CodegenConfig {
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Debug => Self {
                optimization: OptimizationLevel::Debug,
                emit_sequence_points: true,
                max_locals: MAX_LOCALS_LIMIT,
                parallel: false,
                base_directory: None,
            },
            Preset::Release => Self {
                optimization: OptimizationLevel::Release,
                emit_sequence_points: false,
                max_locals: MAX_LOCALS_LIMIT,
                parallel: true,
                base_directory: None,
            },
        }
    }

    /// Start a builder from a preset
    pub fn preset(preset: Preset) -> CodegenConfigBuilder {
        CodegenConfigBuilder {
            config: Self::from_preset(preset),
        }
    }

    /// Load from YAML; unspecified fields come from `preset` (default: debug)
    ///
    /// ```yaml
    /// preset: release
    /// max_locals: 1024
    /// base_directory: /srv/app
    /// ```
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        let preset = match raw.preset.as_deref() {
            Some(name) => Preset::parse(name)?,
            None => Preset::default(),
        };

        let mut builder = Self::preset(preset);
        if let Some(v) = raw.optimization {
            builder = builder.optimization(v);
        }
        if let Some(v) = raw.emit_sequence_points {
            builder = builder.emit_sequence_points(v);
        }
        if let Some(v) = raw.max_locals {
            builder = builder.max_locals(v);
        }
        if let Some(v) = raw.parallel {
            builder = builder.parallel(v);
        }
        if let Some(v) = raw.base_directory {
            builder = builder.base_directory(v);
        }
        builder.build()
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_locals == 0 || self.max_locals > MAX_LOCALS_LIMIT {
            return Err(ConfigError::range_with_hint(
                "max_locals",
                self.max_locals,
                1,
                MAX_LOCALS_LIMIT,
                "The target format addresses locals with 16-bit indices",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    preset: Option<String>,
    optimization: Option<OptimizationLevel>,
    emit_sequence_points: Option<bool>,
    max_locals: Option<usize>,
    parallel: Option<bool>,
    base_directory: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CodegenConfigBuilder {
    config: CodegenConfig,
}

impl CodegenConfigBuilder {
    pub fn optimization(mut self, v: OptimizationLevel) -> Self {
        self.config.optimization = v;
        self
    }

    pub fn emit_sequence_points(mut self, v: bool) -> Self {
        self.config.emit_sequence_points = v;
        self
    }

    pub fn max_locals(mut self, v: usize) -> Self {
        self.config.max_locals = v;
        self
    }

    pub fn parallel(mut self, v: bool) -> Self {
        self.config.parallel = v;
        self
    }

    pub fn base_directory(mut self, v: impl Into<String>) -> Self {
        self.config.base_directory = Some(v.into());
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> ConfigResult<CodegenConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
