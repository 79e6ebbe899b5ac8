//! Compilation result types

use std::sync::Arc;

use serde::Serialize;

use crate::errors::Diagnostic;
use crate::features::codegen::MethodBody;
use crate::features::declarations::DeclarationTable;

#[derive(Debug, Clone)]
pub struct CompilationOutput {
    /// Frozen declaration table the bodies were generated against
    pub table: Arc<DeclarationTable>,
    /// One body per routine and synthesized member, in file order
    pub bodies: Vec<MethodBody>,
    /// One error per body that failed to generate
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Serialize)]
struct Emitted<'a> {
    bodies: &'a [MethodBody],
    diagnostics: &'a [Diagnostic],
}

impl CompilationOutput {
    /// Body by name: `function` or `Type::member`, case-insensitive
    pub fn body(&self, name: &str) -> Option<&MethodBody> {
        let wanted = name.trim_start_matches('\\').to_ascii_lowercase();
        self.bodies.iter().find(|b| b.name.key() == wanted)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Diagnostic reported for `routine`, if its generation failed
    pub fn diagnostic(&self, routine: &str) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.routine.eq_ignore_ascii_case(routine))
    }

    /// Bodies and diagnostics as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Emitted {
            bodies: &self.bodies,
            diagnostics: &self.diagnostics,
        })
    }
}
