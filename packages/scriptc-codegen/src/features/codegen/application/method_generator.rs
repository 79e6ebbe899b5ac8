//! Per-body code generation use case
//!
//! Enumerates everything a compilation emits (every routine, conditional
//! ones included, plus the synthesized bodies of every type) and generates
//! one item at a time. Items are independent, so the pipeline may run them
//! on the Rayon pool.

use std::sync::Arc;

use tracing::debug;

use crate::config::OptimizationLevel;
use crate::errors::Result;
use crate::features::codegen::domain::{BodyKind, Instruction, MethodBody, MethodRef};
use crate::features::codegen::infrastructure::{
    synthesized, CodeGenerator, CodegenEnv, GraphEmitter, CONTEXT_FIELD,
};
use crate::features::declarations::{DeclarationTable, TypeEntry};
use crate::shared::models::{QualifiedName, Routine};

#[derive(Debug, Clone)]
pub enum WorkItem {
    Routine {
        routine: Arc<Routine>,
        file: String,
        /// Set for routines of conditional declarations
        site: Option<String>,
    },
    Constructor(Arc<TypeEntry>),
    TypeInitializer(Arc<TypeEntry>),
    StaticsInitializer(Arc<TypeEntry>),
    InvokeTrampoline(Arc<TypeEntry>),
}

impl WorkItem {
    pub fn display_name(&self) -> String {
        match self {
            WorkItem::Routine { routine, site, .. } => {
                routine_ref(routine).at_site(site.clone()).to_string()
            }
            WorkItem::Constructor(ty) => synthesized::body_ref(ty, MethodRef::CONSTRUCTOR).to_string(),
            WorkItem::TypeInitializer(ty) => {
                synthesized::body_ref(ty, MethodRef::TYPE_INITIALIZER).to_string()
            }
            WorkItem::StaticsInitializer(ty) => {
                synthesized::body_ref(ty, MethodRef::STATICS_INITIALIZER).to_string()
            }
            WorkItem::InvokeTrampoline(ty) => {
                synthesized::body_ref(ty, MethodRef::INVOKE_TRAMPOLINE).to_string()
            }
        }
    }
}

fn routine_ref(routine: &Routine) -> MethodRef {
    match &routine.owner {
        Some(owner) => MethodRef::method(owner, &routine.name),
        None => MethodRef::function(&QualifiedName::new(&routine.name)),
    }
}

pub struct MethodGenerator<'a> {
    env: CodegenEnv<'a>,
}

impl<'a> MethodGenerator<'a> {
    pub fn new(env: CodegenEnv<'a>) -> Self {
        Self { env }
    }

    /// Every body of the compilation, in file order
    pub fn work_items(table: &DeclarationTable) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = table
            .functions()
            .map(|f| WorkItem::Routine {
                routine: Arc::clone(&f.routine),
                file: f.file.clone(),
                site: f.site(),
            })
            .collect();

        for ty in table.types() {
            let site = ty.site();
            items.extend(ty.methods.iter().map(|m| WorkItem::Routine {
                routine: Arc::clone(m),
                file: ty.file.clone(),
                site: site.clone(),
            }));
            items.push(WorkItem::Constructor(Arc::clone(ty)));
            if ty.declares_app_statics() {
                items.push(WorkItem::TypeInitializer(Arc::clone(ty)));
            }
            if ty.declares_statics_holder() {
                items.push(WorkItem::StaticsInitializer(Arc::clone(ty)));
            }
            if ty.declares_magic_invoke() {
                items.push(WorkItem::InvokeTrampoline(Arc::clone(ty)));
            }
        }
        items
    }

    pub fn generate(&self, item: &WorkItem) -> Result<MethodBody> {
        let body = match item {
            WorkItem::Routine { routine, file, site } => {
                self.generate_routine_at(routine, file, site.clone())
            }
            WorkItem::Constructor(ty) => synthesized::constructor(self.env, ty),
            WorkItem::TypeInitializer(ty) => synthesized::type_initializer(self.env, ty),
            WorkItem::StaticsInitializer(ty) => synthesized::statics_initializer(self.env, ty),
            WorkItem::InvokeTrampoline(ty) => synthesized::invoke_trampoline(self.env, ty),
        }?;

        debug!(
            "generated {}: {} instructions, {} locals, max stack {}",
            body.name,
            body.instructions.len(),
            body.locals.len(),
            body.max_stack
        );
        Ok(body)
    }

    /// Linearize a routine's flow graph
    pub fn generate_routine(&self, routine: &Routine, file: &str) -> Result<MethodBody> {
        self.generate_routine_at(routine, file, None)
    }

    fn generate_routine_at(
        &self,
        routine: &Routine,
        file: &str,
        site: Option<String>,
    ) -> Result<MethodBody> {
        let name = routine_ref(routine).at_site(site);
        let mut gen = CodeGenerator::new(
            self.env,
            name.to_string(),
            routine.params.clone(),
            routine.is_static,
            true,
        );

        if self.env.config.optimization == OptimizationLevel::Debug
            && !routine.is_static
            && routine.threads_context
        {
            // The receiver must have been constructed with a context
            gen.emit_this()?;
            gen.emit(Instruction::LdFld(CONTEXT_FIELD.to_string()));
            gen.emit(Instruction::DebugAssertNotNull);
            gen.emit(Instruction::Pop);
        }

        let layout = GraphEmitter::new(gen, &routine.cfg).run()?;
        let assembled = layout.assembled;
        Ok(MethodBody {
            name,
            kind: BodyKind::Routine,
            params: routine.params.clone(),
            has_context: true,
            is_static: routine.is_static,
            source_file: file.to_string(),
            instructions: assembled.instructions,
            block_offsets: layout.block_offsets,
            regions: layout.regions,
            max_stack: assembled.max_stack,
            locals: assembled.locals,
            sequence_points: assembled.sequence_points,
            call_sites: assembled.call_sites,
        })
    }
}
