//! Reachability from the start block

use std::collections::VecDeque;
use std::convert::Infallible;

use rustc_hash::FxHashSet;

use crate::features::flow_graph::domain::{BlockId, ControlFlowGraph};
use crate::features::flow_graph::ports::{walk_edge, GraphVisitor};

/// Breadth-first discovery of every block reachable from the start
#[derive(Debug, Default)]
pub struct Reachability {
    seen: FxHashSet<BlockId>,
    order: Vec<BlockId>,
    queue: VecDeque<BlockId>,
}

impl Reachability {
    pub fn run(graph: &ControlFlowGraph) -> Vec<BlockId> {
        let mut visitor = Reachability::default();
        visitor.discover(graph.start());

        while let Some(block) = visitor.queue.pop_front() {
            if let Some(edge) = graph.outgoing(block) {
                walk_edge(&mut visitor, graph, edge).unwrap_or_else(|never| match never {});
            }
        }
        visitor.order
    }

    fn discover(&mut self, block: BlockId) {
        if self.seen.insert(block) {
            self.order.push(block);
            self.queue.push_back(block);
        }
    }
}

impl GraphVisitor for Reachability {
    type Error = Infallible;

    fn visit_target(&mut self, _graph: &ControlFlowGraph, target: BlockId) -> Result<(), Infallible> {
        self.discover(target);
        Ok(())
    }
}

impl ControlFlowGraph {
    /// Blocks reachable from the start, in discovery order
    pub fn reachable_blocks(&self) -> Vec<BlockId> {
        Reachability::run(self)
    }
}
