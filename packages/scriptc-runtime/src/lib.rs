/*
 * scriptc runtime - execution-time support for compiled scripts
 *
 * Layout:
 * - value      : Dynamically-typed values and argument conversions
 * - types      : Runtime type reflection (identity, base chain, member lookup)
 * - context    : Execution context (function registry, statics holders)
 * - dynamic    : Late-bound call sites (descriptors, binder, registry)
 *
 * Concurrency:
 * - Call-site caches are read without locks
 * - One context per execution, app statics shared by all of them
 */

#![allow(clippy::type_complexity)] // Native entry points are boxed closures
#![allow(clippy::new_without_default)] // Default impl not always needed

/// Error types
pub mod error;

/// Runtime values
pub mod value;

/// Runtime type reflection
pub mod types;

/// Execution context
pub mod context;

/// Dynamic call sites
pub mod dynamic;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use context::{AppStatics, Context, NativeFunction, StaticsHolder};
pub use dynamic::{
    ArgShape, BinderOptions, CallSite, CallSiteDescriptor, CallSiteId, CallSiteRegistry,
    MagicMethod, NameStrategy,
};
pub use error::{DispatchError, Result};
pub use types::{MethodInfo, ParamInfo, ParamKind, RuntimeType, RuntimeTypeId};
pub use value::{ArrayValue, Object, Repr, Value};
