//! Common test utilities
//!
//! - builders: bound-tree and flow-graph construction helpers
//! - machine: reference interpreter for emitted bodies

#![allow(dead_code)]

mod builders;
mod machine;

pub use builders::*;
pub use machine::*;
