//! Error types for scriptc-codegen
//!
//! Codegen errors are fatal for one routine only and are turned into
//! diagnostics by the pipeline. Declaration and configuration errors abort the
//! whole compilation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Failure generating one routine or synthesized body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// Caller and callee parameter shapes are incompatible
    #[error("signature mismatch in {routine}: {message}")]
    SignatureMismatch { routine: String, message: String },

    /// More local or argument slots than the target format allows
    #[error("{routine} uses {count} {kind} slots, limit is {limit}")]
    CapacityExceeded {
        routine: String,
        kind: SlotKind,
        count: usize,
        limit: usize,
    },

    /// Malformed input graph or generator defect
    #[error("internal invariant violated in {routine}: {message}")]
    InvariantViolation { routine: String, message: String },

    /// Reference to a type the declaration table does not know
    #[error("{routine}: unresolved type '{name}'")]
    UnresolvedType { routine: String, name: String },

    /// Reference to a member missing on a known type
    #[error("{routine}: unresolved member '{member}'")]
    UnresolvedMember { routine: String, member: String },
}

impl CodegenError {
    pub fn signature(routine: impl Into<String>, message: impl Into<String>) -> Self {
        CodegenError::SignatureMismatch {
            routine: routine.into(),
            message: message.into(),
        }
    }

    pub fn invariant(routine: impl Into<String>, message: impl Into<String>) -> Self {
        CodegenError::InvariantViolation {
            routine: routine.into(),
            message: message.into(),
        }
    }

    /// Routine whose generation failed
    pub fn routine(&self) -> &str {
        match self {
            CodegenError::SignatureMismatch { routine, .. }
            | CodegenError::CapacityExceeded { routine, .. }
            | CodegenError::InvariantViolation { routine, .. }
            | CodegenError::UnresolvedType { routine, .. }
            | CodegenError::UnresolvedMember { routine, .. } => routine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Local,
    Argument,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Local => f.write_str("local"),
            SlotKind::Argument => f.write_str("argument"),
        }
    }
}

/// Kind of a top-level declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclarationKind {
    Function,
    Type,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationKind::Function => f.write_str("function"),
            DeclarationKind::Type => f.write_str("type"),
        }
    }
}

/// Declaration table population failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// Two unconditional declarations share a name
    #[error("cannot redeclare {kind} {name} in {second} (previously declared in {first})")]
    Redeclaration {
        kind: DeclarationKind,
        name: String,
        first: String,
        second: String,
    },
}

/// Whole-compilation failure
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Diagnostic reported to the caller; one per failed routine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub routine: String,
    pub message: String,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl From<&CodegenError> for Diagnostic {
    fn from(err: &CodegenError) -> Self {
        Diagnostic {
            severity: Severity::Error,
            routine: err.routine().to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

/// Result type alias for codegen operations
pub type Result<T> = std::result::Result<T, CodegenError>;
