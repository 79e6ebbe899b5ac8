//! Completeness check run before codegen

use crate::features::flow_graph::domain::{BlockId, ControlFlowGraph};

impl ControlFlowGraph {
    /// Reachable blocks other than the exit that still lack a terminator.
    /// Empty for a completely constructed graph.
    pub fn validate(&self) -> Vec<BlockId> {
        self.reachable_blocks()
            .into_iter()
            .filter(|&b| {
                let block = self.block(b);
                !block.is_exit() && block.outgoing().is_none()
            })
            .collect()
    }
}
