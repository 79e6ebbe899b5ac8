//! Control-flow graph arena
//!
//! The routine owns the arena; blocks and edges refer to each other by index,
//! so loops are ordinary cycles. Every `connect_*` creates the edge and
//! installs it as the source block's terminator in one step. Giving a block a
//! second terminator is a construction defect and panics.

use serde::{Deserialize, Serialize};

use super::block::{Block, BlockId, BlockKind};
use super::edge::{CaseBlock, CatchBlock, Edge, EdgeId, EdgeKind, ForeachVar};
use crate::shared::models::{BoundExpr, BoundStmt};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    blocks: Vec<Block>,
    edges: Vec<Edge>,
    start: BlockId,
    exit: BlockId,
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlowGraph {
    /// Graph with a start block (ordinal 0) and an exit block (ordinal 1)
    pub fn new() -> Self {
        let start = BlockId(0);
        let exit = BlockId(1);
        Self {
            blocks: vec![
                Block::new(start, BlockKind::Start),
                Block::new(exit, BlockKind::Exit),
            ],
            edges: Vec::new(),
            start,
            exit,
        }
    }

    pub fn start(&self) -> BlockId {
        self.start
    }

    pub fn exit(&self) -> BlockId {
        self.exit
    }

    /// New block; its ordinal is the next in creation order
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(id, BlockKind::Normal));
        id
    }

    pub fn push_statement(&mut self, block: BlockId, stmt: BoundStmt) {
        self.blocks[block.index()].statements.push(stmt);
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edge of `block`, if terminated
    pub fn outgoing(&self, block: BlockId) -> Option<&Edge> {
        self.block(block).outgoing.map(|e| self.edge(e))
    }

    /// Incoming edges; derived on demand, never stored
    pub fn predecessors(&self, block: BlockId) -> Vec<EdgeId> {
        self.edges
            .iter()
            .filter(|e| e.targets().contains(&block))
            .map(|e| e.id)
            .collect()
    }

    pub fn connect_simple(&mut self, from: BlockId, target: BlockId) -> EdgeId {
        self.install(from, EdgeKind::Simple { target })
    }

    pub fn connect_conditional(
        &mut self,
        from: BlockId,
        condition: BoundExpr,
        if_true: BlockId,
        if_false: BlockId,
    ) -> EdgeId {
        assert_ne!(
            if_true, if_false,
            "conditional edge from {} needs distinct targets",
            from
        );
        self.install(
            from,
            EdgeKind::Conditional {
                condition,
                if_true,
                if_false,
            },
        )
    }

    /// Try/catch/finally. Regions are delimited by ordinals, so the body, each
    /// handler, the finally block and the end block must have been created in
    /// that order.
    pub fn connect_try_catch(
        &mut self,
        from: BlockId,
        body: BlockId,
        catches: Vec<CatchBlock>,
        finally: Option<BlockId>,
        end: BlockId,
    ) -> EdgeId {
        let mut order = vec![body];
        order.extend(catches.iter().map(|c| c.target));
        order.extend(finally);
        order.push(end);
        assert!(
            order.windows(2).all(|w| w[0] < w[1]),
            "try/catch from {} has blocks out of source order: {:?}",
            from,
            order
        );
        assert!(
            from < body,
            "try/catch body {} must follow its entry block {}",
            body,
            from
        );

        self.install(
            from,
            EdgeKind::TryCatch {
                body,
                catches,
                finally,
                end,
            },
        )
    }

    pub fn connect_foreach_enumeree(
        &mut self,
        from: BlockId,
        enumeree: BoundExpr,
        target: BlockId,
    ) -> EdgeId {
        self.install(from, EdgeKind::ForeachEnumeree { enumeree, target })
    }

    /// Move-next edge of the loop started by `enumeree`; `from` must be the
    /// enumeree edge's target.
    pub fn connect_foreach_move_next(
        &mut self,
        from: BlockId,
        enumeree: EdgeId,
        key: Option<ForeachVar>,
        value: ForeachVar,
        body: BlockId,
        end: BlockId,
    ) -> EdgeId {
        match self.edge(enumeree).kind() {
            EdgeKind::ForeachEnumeree { target, .. } => assert_eq!(
                *target, from,
                "move-next block {} is not the target of {}",
                from, enumeree
            ),
            other => panic!("{} is not a foreach enumeree edge: {:?}", enumeree, other),
        }
        self.install(
            from,
            EdgeKind::ForeachMoveNext {
                enumeree,
                key,
                value,
                body,
                end,
            },
        )
    }

    pub fn connect_switch(
        &mut self,
        from: BlockId,
        scrutinee: BoundExpr,
        cases: Vec<CaseBlock>,
        end: BlockId,
    ) -> EdgeId {
        assert!(
            cases.iter().filter(|c| c.is_default()).count() <= 1,
            "switch from {} has more than one default case",
            from
        );
        self.install(
            from,
            EdgeKind::Switch {
                scrutinee,
                cases,
                end,
            },
        )
    }

    fn install(&mut self, from: BlockId, kind: EdgeKind) -> EdgeId {
        let block = &self.blocks[from.index()];
        assert!(!block.is_exit(), "the exit block cannot have a terminator");
        if let Some(existing) = block.outgoing {
            panic!("{} already terminated by {}", from, existing);
        }

        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            id,
            source: from,
            kind,
        });
        self.blocks[from.index()].outgoing = Some(id);
        id
    }
}
