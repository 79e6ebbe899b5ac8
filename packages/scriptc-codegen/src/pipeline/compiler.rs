//! Compiler: declaration population followed by per-body code generation
//!
//! ```text
//! units ──populate──▶ DeclarationTable (frozen, Arc)
//!                          │
//!          work items ◀────┘  routines + synthesized bodies
//!              │
//!              ▼  (Rayon when `parallel`)
//!      MethodBody | Diagnostic
//! ```
//!
//! A routine that fails to generate becomes a diagnostic; the rest of the
//! compilation goes on. Declaration conflicts and bad configuration abort.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use super::result::CompilationOutput;
use crate::config::CodegenConfig;
use crate::errors::{CodegenError, CompileError, Diagnostic};
use crate::features::codegen::{CallSiteIds, CodegenEnv, MethodBody, MethodGenerator};
use crate::features::declarations::{DeclarationTable, PopulateOptions};
use crate::shared::models::SourceUnit;

#[derive(Debug, Clone)]
pub struct Compiler {
    config: CodegenConfig,
}

impl Compiler {
    pub fn new(config: CodegenConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodegenConfig {
        &self.config
    }

    /// Compile a whole program. The first unit is the script entry point.
    pub fn compile(&self, units: Vec<SourceUnit>) -> Result<CompilationOutput, CompileError> {
        self.config.validate()?;
        let start = Instant::now();

        let table = Arc::new(DeclarationTable::populate(
            units,
            PopulateOptions::from(&self.config),
        )?);

        let sites = CallSiteIds::new();
        let env = CodegenEnv {
            table: &table,
            config: &self.config,
            sites: &sites,
        };
        let generator = MethodGenerator::new(env);
        let items = MethodGenerator::work_items(&table);

        let results: Vec<Result<MethodBody, CodegenError>> = if self.config.parallel {
            crate::init_rayon();
            items.par_iter().map(|item| generator.generate(item)).collect()
        } else {
            items.iter().map(|item| generator.generate(item)).collect()
        };

        let mut bodies = Vec::with_capacity(results.len());
        let mut diagnostics = Vec::new();
        for result in results {
            match result {
                Ok(body) => bodies.push(body),
                Err(err) => {
                    warn!("{}", err);
                    diagnostics.push(Diagnostic::from(&err));
                }
            }
        }

        info!(
            "compiled {} bodies ({} failed, {} call sites) in {:?}",
            bodies.len(),
            diagnostics.len(),
            sites.issued(),
            start.elapsed()
        );

        Ok(CompilationOutput {
            table,
            bodies,
            diagnostics,
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CodegenConfig::default())
    }
}
