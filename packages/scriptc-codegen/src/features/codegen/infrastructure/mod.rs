mod call_sites;
mod code_generator;
mod graph_emitter;
mod il_builder;
mod local_slots;
pub mod synthesized;

pub use call_sites::CallSiteIds;
pub use code_generator::{CodeGenerator, CodegenEnv};
pub use graph_emitter::{GraphEmitter, Layout};
pub use il_builder::{Assembled, BranchKind, IlBuilder, Label};
pub use local_slots::LocalSlots;
pub use synthesized::CONTEXT_FIELD;
