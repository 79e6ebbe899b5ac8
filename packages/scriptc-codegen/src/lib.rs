/*
 * scriptc codegen - back end of the ahead-of-time script compiler
 *
 * Feature-First Hexagonal Architecture:
 * - shared/      : Bound program models (names, expressions, routines, units)
 * - features/    : Vertical slices (flow_graph → declarations → codegen)
 * - pipeline/    : Whole-program compilation
 * - config/      : Codegen configuration (presets, YAML)
 *
 * Performance:
 * - Declaration population and per-routine codegen on the Rayon pool
 * - Declaration table frozen before any routine is generated
 */

// Crate-level lint configuration
#![allow(clippy::too_many_arguments)] // Emitters thread builder, table and routine state
#![allow(clippy::type_complexity)] // Conflict maps keyed by name
#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::module_inception)] // Module naming intentional

/// Shared models
pub mod shared;

/// Feature modules (flow graph, declarations, codegen)
pub mod features;

/// Whole-program compilation
pub mod pipeline;

/// Configuration system
pub mod config;

/// Error types
pub mod errors;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use config::{CodegenConfig, ConfigError, OptimizationLevel, Preset};
pub use errors::{CodegenError, CompileError, DeclarationError, Diagnostic, Severity, SlotKind};
pub use features::codegen::{Instruction, MethodBody, MethodRef};
pub use features::declarations::DeclarationTable;
pub use features::flow_graph::{BlockId, ControlFlowGraph, EdgeId};
pub use pipeline::{CompilationOutput, Compiler};

// ═══════════════════════════════════════════════════════════════════════════
// Rayon Thread Pool
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize Rayon thread pool (75% of cores)
pub(crate) fn init_rayon() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let num_cpus = num_cpus::get();
        let threads = std::cmp::max(1, (num_cpus * 3) / 4);

        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            Ok(()) => tracing::debug!(
                "[scriptc-codegen] Rayon pool: {} threads (75% of {})",
                threads,
                num_cpus
            ),
            // The embedding application installed its own pool first.
            Err(e) => tracing::debug!("[scriptc-codegen] keeping existing Rayon pool: {}", e),
        }
    });
}
