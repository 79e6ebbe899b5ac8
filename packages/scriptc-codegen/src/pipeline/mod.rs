//! Whole-program compilation

pub mod compiler;
pub mod result;

pub use compiler::Compiler;
pub use result::CompilationOutput;
