mod block;
mod edge;
mod graph;

pub use block::{Block, BlockId, BlockKind};
pub use edge::{CaseBlock, CaseLabel, CatchBlock, Edge, EdgeId, EdgeKind, ForeachVar, ROOT_EXCEPTION};
pub use graph::ControlFlowGraph;
