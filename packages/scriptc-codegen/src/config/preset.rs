//! Preset configurations

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Configuration preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Development builds
    ///
    /// - Sequence points emitted
    /// - Receiver context assertions in instance methods
    /// - Sequential declaration population
    #[default]
    Debug,

    /// Production builds
    ///
    /// - No sequence points
    /// - Parallel declaration population and codegen
    Release,
}

impl Preset {
    /// Parse preset from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            _ => Err(ConfigError::UnknownPreset(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
