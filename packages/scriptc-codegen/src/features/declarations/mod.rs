//! Declaration table
//!
//! Indexes the files, functions and types of a whole-program compilation.
//!
//! Key features:
//! - Parallel population with DashMap + Rayon
//! - Deterministic redeclaration reports in both population modes
//! - Conditional declarations kept out of the name index
//! - Populate-then-freeze: lookups never contend

pub mod domain;
pub mod infrastructure;

pub use domain::{
    DeclOrigin, Declaration, FileEntry, FunctionEntry, TypeEntry, MAGIC_INVOKE, USER_INITIALIZER,
};
pub use infrastructure::{normalize_path, DeclarationPopulator, DeclarationTable, PopulateOptions};
