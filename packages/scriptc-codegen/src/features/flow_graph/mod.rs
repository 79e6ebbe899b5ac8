//! Control-flow graph model
//!
//! Blocks connected by typed edges (sequential, conditional, try/catch/finally,
//! two-stage foreach, switch), stored in an index-addressed arena.

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{
    Block, BlockId, BlockKind, CaseBlock, CaseLabel, CatchBlock, ControlFlowGraph, Edge, EdgeId,
    EdgeKind, ForeachVar, ROOT_EXCEPTION,
};
pub use infrastructure::Reachability;
pub use ports::{walk_edge, GraphVisitor};
