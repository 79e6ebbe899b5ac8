//! Edge-kind visitor
//!
//! Traversals implement `GraphVisitor` and override the variants they care
//! about; `walk_edge` matches on the edge tag and calls the right method. The
//! default for every variant forwards each target to `visit_target`.

use crate::features::flow_graph::domain::{
    BlockId, CaseBlock, CatchBlock, ControlFlowGraph, Edge, EdgeId, EdgeKind, ForeachVar,
};
use crate::shared::models::BoundExpr;

pub trait GraphVisitor {
    type Error;

    fn visit_target(&mut self, graph: &ControlFlowGraph, target: BlockId) -> Result<(), Self::Error> {
        let _ = (graph, target);
        Ok(())
    }

    fn visit_simple(
        &mut self,
        graph: &ControlFlowGraph,
        edge: &Edge,
        target: BlockId,
    ) -> Result<(), Self::Error> {
        let _ = edge;
        self.visit_target(graph, target)
    }

    fn visit_conditional(
        &mut self,
        graph: &ControlFlowGraph,
        edge: &Edge,
        condition: &BoundExpr,
        if_true: BlockId,
        if_false: BlockId,
    ) -> Result<(), Self::Error> {
        let _ = (edge, condition);
        self.visit_target(graph, if_true)?;
        self.visit_target(graph, if_false)
    }

    fn visit_try_catch(
        &mut self,
        graph: &ControlFlowGraph,
        edge: &Edge,
        body: BlockId,
        catches: &[CatchBlock],
        finally: Option<BlockId>,
        end: BlockId,
    ) -> Result<(), Self::Error> {
        let _ = edge;
        self.visit_target(graph, body)?;
        for catch in catches {
            self.visit_target(graph, catch.target)?;
        }
        if let Some(finally) = finally {
            self.visit_target(graph, finally)?;
        }
        self.visit_target(graph, end)
    }

    fn visit_foreach_enumeree(
        &mut self,
        graph: &ControlFlowGraph,
        edge: &Edge,
        enumeree: &BoundExpr,
        target: BlockId,
    ) -> Result<(), Self::Error> {
        let _ = (edge, enumeree);
        self.visit_target(graph, target)
    }

    fn visit_foreach_move_next(
        &mut self,
        graph: &ControlFlowGraph,
        edge: &Edge,
        enumeree: EdgeId,
        key: Option<&ForeachVar>,
        value: &ForeachVar,
        body: BlockId,
        end: BlockId,
    ) -> Result<(), Self::Error> {
        let _ = (edge, enumeree, key, value);
        self.visit_target(graph, body)?;
        self.visit_target(graph, end)
    }

    fn visit_switch(
        &mut self,
        graph: &ControlFlowGraph,
        edge: &Edge,
        scrutinee: &BoundExpr,
        cases: &[CaseBlock],
        end: BlockId,
    ) -> Result<(), Self::Error> {
        let _ = (edge, scrutinee);
        for case in cases {
            self.visit_target(graph, case.target)?;
        }
        self.visit_target(graph, end)
    }
}

/// Dispatch `edge` to the visitor method of its kind
pub fn walk_edge<V: GraphVisitor + ?Sized>(
    visitor: &mut V,
    graph: &ControlFlowGraph,
    edge: &Edge,
) -> Result<(), V::Error> {
    match edge.kind() {
        EdgeKind::Simple { target } => visitor.visit_simple(graph, edge, *target),
        EdgeKind::Conditional {
            condition,
            if_true,
            if_false,
        } => visitor.visit_conditional(graph, edge, condition, *if_true, *if_false),
        EdgeKind::TryCatch {
            body,
            catches,
            finally,
            end,
        } => visitor.visit_try_catch(graph, edge, *body, catches, *finally, *end),
        EdgeKind::ForeachEnumeree { enumeree, target } => {
            visitor.visit_foreach_enumeree(graph, edge, enumeree, *target)
        }
        EdgeKind::ForeachMoveNext {
            enumeree,
            key,
            value,
            body,
            end,
        } => visitor.visit_foreach_move_next(graph, edge, *enumeree, key.as_ref(), value, *body, *end),
        EdgeKind::Switch {
            scrutinee,
            cases,
            end,
        } => visitor.visit_switch(graph, edge, scrutinee, cases, *end),
    }
}
