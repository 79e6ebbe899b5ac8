//! Shared module - types used across all features

pub mod models;

// Re-exports for convenience
pub use models::*;
