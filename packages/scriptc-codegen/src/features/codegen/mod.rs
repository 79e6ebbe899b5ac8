//! Code generator
//!
//! Lowers routines and synthesized bodies into instruction streams for the
//! managed stack-machine target.
//!
//! Key features:
//! - Scope-ordered layout with lexically nested exception regions
//! - Branch elision and `leave`/`endfinally` out of protected regions
//! - Direct calls where the declaration table proves the target, call sites elsewhere
//! - Constructors, static initializers and `__invoke` trampolines

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{MethodGenerator, WorkItem};
pub use domain::{
    BodyKind, ExceptionRegion, Instruction, LocalId, LocalInfo, LocalKind, MethodBody, MethodRef,
    RegionKind, SequencePoint,
};
pub use infrastructure::{CallSiteIds, CodegenEnv, CONTEXT_FIELD};
