//! Feature modules - Each feature follows Hexagonal Architecture
//!
//! Each feature contains:
//! - domain/         - Pure data model
//! - ports/          - Interface definitions (traits)
//! - application/    - Use cases
//! - infrastructure/ - Algorithms over the domain

pub mod codegen;
pub mod declarations;
pub mod flow_graph;
