//! Flow graph linearization
//!
//! Layout walks the graph from the start block with a work queue per
//! protected scope. Try bodies, catch handlers and finally handlers are
//! delimited by block ordinal ranges; a scope places only blocks of its own
//! range and hands every other target to its parent once it is done, so each
//! handler comes out as one contiguous instruction range.
//!
//! Terminators:
//! - transfer to a block of the same scope: `br`, elided when it is placed next
//! - transfer out of a try or catch scope: `leave`
//! - transfer from a finally handler to its end block: `endfinally`
//! - the exit block is placed last and returns the `<ret>` slot

use std::collections::VecDeque;
use std::ops::Range;

use rustc_hash::{FxHashMap, FxHashSet};

use super::code_generator::CodeGenerator;
use super::il_builder::{Assembled, BranchKind, LabelMap};
use crate::errors::Result;
use crate::features::codegen::domain::{ExceptionRegion, Instruction, LocalId, RegionKind};
use crate::features::flow_graph::{
    walk_edge, BlockId, CaseBlock, CaseLabel, CatchBlock, ControlFlowGraph, Edge, EdgeId,
    EdgeKind, ForeachVar, GraphVisitor,
};
use crate::shared::models::{BinaryOp, BoundExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Root,
    Try,
    Catch,
    Finally,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    /// Ordinals owned by the scope; `None` for blocks outside every region
    range: Option<Range<u32>>,
    queue: VecDeque<BlockId>,
    /// Targets left through `leave`, placed by an enclosing scope
    escapes: Vec<BlockId>,
    /// End block of the construct, for finally handlers
    finally_exit: Option<BlockId>,
}

impl Scope {
    fn new(kind: ScopeKind, range: Option<Range<u32>>, seed: BlockId, finally_exit: Option<BlockId>) -> Self {
        Self {
            kind,
            range,
            queue: VecDeque::from([seed]),
            escapes: Vec::new(),
            finally_exit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Placed in the current scope
    Local,
    /// Exit block reached from outside every region
    Exit,
    /// Leaves one or more protected regions
    Leave,
    /// Normal completion of a finally handler
    EndFinally,
}

/// Linearized routine
#[derive(Debug)]
pub struct Layout {
    pub assembled: Assembled,
    pub block_offsets: Vec<(BlockId, usize)>,
    pub regions: Vec<ExceptionRegion>,
}

pub struct GraphEmitter<'a, 'g> {
    gen: CodeGenerator<'a>,
    graph: &'g ControlFlowGraph,
    labels: LabelMap<BlockId>,
    placed: FxHashSet<BlockId>,
    block_offsets: Vec<(BlockId, usize)>,
    regions: Vec<ExceptionRegion>,
    ranges: Vec<Range<u32>>,
    enumerators: FxHashMap<EdgeId, LocalId>,
    scope: Scope,
    outer: Vec<Scope>,
    exit_targeted: bool,
}

impl<'a, 'g> GraphEmitter<'a, 'g> {
    pub fn new(gen: CodeGenerator<'a>, graph: &'g ControlFlowGraph) -> Self {
        Self {
            gen,
            graph,
            labels: LabelMap::default(),
            placed: FxHashSet::default(),
            block_offsets: Vec::new(),
            regions: Vec::new(),
            ranges: protected_ranges(graph),
            enumerators: FxHashMap::default(),
            scope: Scope::new(ScopeKind::Root, None, graph.start(), None),
            outer: Vec::new(),
            exit_targeted: false,
        }
    }

    pub fn run(mut self) -> Result<Layout> {
        self.drain()?;
        if !self.outer.is_empty() {
            return Err(self.gen.invariant("protected scope left open"));
        }
        if self.exit_targeted {
            self.place_exit()?;
        }

        Ok(Layout {
            assembled: self.gen.finish()?,
            block_offsets: self.block_offsets,
            regions: self.regions,
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Placement
    // ═══════════════════════════════════════════════════════════════════

    fn drain(&mut self) -> Result<()> {
        while let Some(block) = self.scope.queue.pop_front() {
            if !self.placed.contains(&block) {
                self.place(block)?;
            }
        }
        Ok(())
    }

    fn begin_block(&mut self, block: BlockId) {
        self.placed.insert(block);
        let label = self.labels.get(&mut self.gen.il, block);
        self.gen.il.elide_branch_to(label);
        self.gen.il.mark_label(label);
        let offset = self.gen.il.offset();
        self.block_offsets.push((block, offset));
    }

    fn emit_statements(&mut self, block: BlockId) -> Result<()> {
        let graph = self.graph;
        for stmt in &graph.block(block).statements {
            self.gen.emit_statement(stmt)?;
        }
        if self.gen.il.depth() != 0 {
            return Err(self.gen.invariant(format!(
                "{} ends with {} values on the stack",
                block,
                self.gen.il.depth()
            )));
        }
        Ok(())
    }

    fn place(&mut self, block: BlockId) -> Result<()> {
        if self.region_of(block) != self.scope.range {
            return Err(self.gen.invariant(format!(
                "{} is reached from outside its protected region",
                block
            )));
        }

        self.begin_block(block);
        self.emit_statements(block)?;

        let graph = self.graph;
        match graph.outgoing(block) {
            Some(edge) => walk_edge(self, graph, edge),
            None => Err(self
                .gen
                .invariant(format!("{} has no outgoing edge", block))),
        }
    }

    fn place_exit(&mut self) -> Result<()> {
        let exit = self.graph.exit();
        self.begin_block(exit);
        self.emit_statements(exit)?;
        match self.gen.il.locals.existing_return_slot() {
            Some(slot) => self.gen.emit(Instruction::LdLoc(slot)),
            None => self.gen.emit(Instruction::LdNull),
        }
        self.gen.emit(Instruction::Ret);
        Ok(())
    }

    /// Lay out a nested scope starting at `seed`; returns its escapes
    fn emit_scope(
        &mut self,
        kind: ScopeKind,
        range: Range<u32>,
        seed: BlockId,
        finally_exit: Option<BlockId>,
    ) -> Result<Vec<BlockId>> {
        if self.placed.contains(&seed) {
            return Err(self
                .gen
                .invariant(format!("{} entered twice as a protected region", seed)));
        }

        let nested = Scope::new(kind, Some(range), seed, finally_exit);
        let parent = std::mem::replace(&mut self.scope, nested);
        self.outer.push(parent);

        let drained = self.drain();

        let parent = self
            .outer
            .pop()
            .ok_or_else(|| self.gen.invariant("unbalanced protected scopes"))?;
        let scope = std::mem::replace(&mut self.scope, parent);
        drained?;
        Ok(scope.escapes)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Routing
    // ═══════════════════════════════════════════════════════════════════

    /// Innermost protected range containing `block`
    fn region_of(&self, block: BlockId) -> Option<Range<u32>> {
        let ordinal = block.ordinal();
        self.ranges
            .iter()
            .filter(|r| r.contains(&ordinal))
            .min_by_key(|r| r.end - r.start)
            .cloned()
    }

    fn route(&self, target: BlockId) -> Result<Route> {
        let is_exit = target == self.graph.exit();
        let region = if is_exit { None } else { self.region_of(target) };
        if !is_exit && region == self.scope.range {
            return Ok(Route::Local);
        }

        // A target inside a region nested in this scope can only be
        // entered through its try edge.
        if let Some(region) = &region {
            let nested = match &self.scope.range {
                None => true,
                Some(own) => own.start <= region.start && region.end <= own.end,
            };
            if nested {
                return Err(self.gen.invariant(format!(
                    "branch to {} enters a protected region",
                    target
                )));
            }
        }

        match self.scope.kind {
            ScopeKind::Root if is_exit => Ok(Route::Exit),
            ScopeKind::Root => Err(self.gen.invariant(format!(
                "branch to {} enters a protected region",
                target
            ))),
            ScopeKind::Try | ScopeKind::Catch => Ok(Route::Leave),
            ScopeKind::Finally if self.scope.finally_exit == Some(target) => Ok(Route::EndFinally),
            ScopeKind::Finally => Err(self.gen.invariant(format!(
                "branch to {} leaves a finally handler",
                target
            ))),
        }
    }

    fn note_escape(&mut self, target: BlockId) {
        if target == self.graph.exit() {
            self.exit_targeted = true;
        } else {
            self.scope.escapes.push(target);
        }
    }

    /// Unconditional transfer; a local target not yet placed goes next
    fn transfer(&mut self, target: BlockId) -> Result<()> {
        if self.gen.il.last_is_unconditional() {
            // Dead terminator behind a `throw`
            return self.enqueue(target);
        }

        let label = self.labels.get(&mut self.gen.il, target);
        match self.route(target)? {
            Route::Local => {
                self.gen.il.branch(BranchKind::Always, label);
                if !self.placed.contains(&target) {
                    self.scope.queue.push_front(target);
                }
            }
            Route::Exit => {
                self.exit_targeted = true;
                self.gen.il.branch(BranchKind::Always, label);
            }
            Route::Leave => {
                self.note_escape(target);
                self.gen.il.branch(BranchKind::Leave, label);
            }
            Route::EndFinally => self.gen.emit(Instruction::EndFinally),
        }
        Ok(())
    }

    /// Conditional transfer consuming the top of stack
    fn branch_if(&mut self, kind: BranchKind, target: BlockId) -> Result<()> {
        let label = self.labels.get(&mut self.gen.il, target);
        match self.route(target)? {
            Route::Local | Route::Exit => {
                self.gen.il.branch(kind, label);
                self.enqueue(target)
            }
            Route::Leave | Route::EndFinally => {
                // Only unconditional forms leave a region: skip over one
                let skip = self.gen.il.define_label();
                self.gen.il.branch(negate(kind), skip);
                self.transfer(target)?;
                self.gen.il.mark_label(skip);
                Ok(())
            }
        }
    }

    /// Make `target` part of the layout without emitting a branch
    fn enqueue(&mut self, target: BlockId) -> Result<()> {
        match self.route(target)? {
            Route::Local => {
                if !self.placed.contains(&target) {
                    self.scope.queue.push_back(target);
                }
            }
            Route::Exit => self.exit_targeted = true,
            Route::Leave => self.note_escape(target),
            Route::EndFinally => {}
        }
        Ok(())
    }
}

impl GraphVisitor for GraphEmitter<'_, '_> {
    type Error = crate::errors::CodegenError;

    fn visit_simple(&mut self, _graph: &ControlFlowGraph, _edge: &Edge, target: BlockId) -> Result<()> {
        self.transfer(target)
    }

    fn visit_conditional(
        &mut self,
        _graph: &ControlFlowGraph,
        _edge: &Edge,
        condition: &BoundExpr,
        if_true: BlockId,
        if_false: BlockId,
    ) -> Result<()> {
        self.gen.emit_value(condition)?;
        self.branch_if(BranchKind::IfFalse, if_false)?;
        self.transfer(if_true)
    }

    fn visit_try_catch(
        &mut self,
        _graph: &ControlFlowGraph,
        _edge: &Edge,
        body: BlockId,
        catches: &[CatchBlock],
        finally: Option<BlockId>,
        end: BlockId,
    ) -> Result<()> {
        let first_handler = catches.first().map(|c| c.target).or(finally).unwrap_or(end);

        let try_start = self.gen.il.offset();
        let mut escapes =
            self.emit_scope(ScopeKind::Try, body.ordinal()..first_handler.ordinal(), body, None)?;
        let try_end = self.gen.il.offset();

        for (i, catch) in catches.iter().enumerate() {
            let next = catches
                .get(i + 1)
                .map(|c| c.target)
                .or(finally)
                .unwrap_or(end);

            let handler_start = self.gen.il.offset();
            self.gen.il.begin_handler(1);
            match &catch.variable {
                Some(var) => self.gen.store_variable(var)?,
                None => self.gen.emit(Instruction::Pop),
            }
            escapes.extend(self.emit_scope(
                ScopeKind::Catch,
                catch.target.ordinal()..next.ordinal(),
                catch.target,
                None,
            )?);
            let handler_end = self.gen.il.offset();

            self.regions.push(ExceptionRegion {
                kind: RegionKind::Catch(catch.type_name.clone()),
                try_start,
                try_end,
                handler_start,
                handler_end,
            });
        }

        if let Some(finally) = finally {
            let handler_start = self.gen.il.offset();
            self.gen.il.begin_handler(0);
            self.emit_scope(ScopeKind::Finally, finally.ordinal()..end.ordinal(), finally, Some(end))?;
            let handler_end = self.gen.il.offset();

            self.regions.push(ExceptionRegion {
                kind: RegionKind::Finally,
                try_start,
                try_end: handler_start,
                handler_start,
                handler_end,
            });
        }

        for target in escapes {
            if self.route(target)? == Route::EndFinally {
                return Err(self.gen.invariant(format!(
                    "leave to {} crosses the end of a finally handler",
                    target
                )));
            }
            self.enqueue(target)?;
        }
        self.enqueue(end)
    }

    fn visit_foreach_enumeree(
        &mut self,
        _graph: &ControlFlowGraph,
        edge: &Edge,
        enumeree: &BoundExpr,
        target: BlockId,
    ) -> Result<()> {
        self.gen.emit_value(enumeree)?;
        self.gen.emit(Instruction::GetEnumerator);
        let slot = *self
            .enumerators
            .entry(edge.id())
            .or_insert_with(|| self.gen.il.locals.enumerator());
        self.gen.emit(Instruction::StLoc(slot));
        self.transfer(target)
    }

    fn visit_foreach_move_next(
        &mut self,
        _graph: &ControlFlowGraph,
        edge: &Edge,
        enumeree: EdgeId,
        key: Option<&ForeachVar>,
        value: &ForeachVar,
        body: BlockId,
        end: BlockId,
    ) -> Result<()> {
        let Some(slot) = self.enumerators.get(&enumeree).copied() else {
            return Err(self.gen.invariant(format!(
                "{} advances the enumerator of {} before it is acquired",
                edge.source(),
                enumeree
            )));
        };

        self.gen.emit(Instruction::LdLoc(slot));
        self.gen.emit(Instruction::EnumMoveNext);
        self.branch_if(BranchKind::IfFalse, end)?;

        self.gen.emit(Instruction::LdLoc(slot));
        self.gen.emit(Instruction::EnumValue);
        self.gen.store_variable(&value.name)?;
        if let Some(key) = key {
            self.gen.emit(Instruction::LdLoc(slot));
            self.gen.emit(Instruction::EnumKey);
            self.gen.store_variable(&key.name)?;
        }
        self.transfer(body)
    }

    fn visit_switch(
        &mut self,
        _graph: &ControlFlowGraph,
        _edge: &Edge,
        scrutinee: &BoundExpr,
        cases: &[CaseBlock],
        end: BlockId,
    ) -> Result<()> {
        self.gen.emit_value(scrutinee)?;
        let tmp = self.gen.il.locals.temp();
        self.gen.emit(Instruction::StLoc(tmp));

        let mut default = None;
        for case in cases {
            match &case.label {
                CaseLabel::Default => default = default.or(Some(case.target)),
                CaseLabel::Value(value) => {
                    self.gen.emit(Instruction::LdLoc(tmp));
                    self.gen.emit_value(value)?;
                    self.gen.emit(Instruction::Binary(BinaryOp::Eq));
                    self.branch_if(BranchKind::IfTrue, case.target)?;
                }
            }
        }
        self.gen.il.locals.release(tmp);

        self.transfer(default.unwrap_or(end))?;
        self.enqueue(end)
    }
}

fn negate(kind: BranchKind) -> BranchKind {
    match kind {
        BranchKind::IfTrue => BranchKind::IfFalse,
        BranchKind::IfFalse => BranchKind::IfTrue,
        other => other,
    }
}

/// Ordinal ranges of every try body, catch handler and finally handler
fn protected_ranges(graph: &ControlFlowGraph) -> Vec<Range<u32>> {
    let mut ranges = Vec::new();
    for edge in graph.edges() {
        let EdgeKind::TryCatch {
            body,
            catches,
            finally,
            end,
        } = edge.kind()
        else {
            continue;
        };

        let mut bounds: Vec<u32> = vec![body.ordinal()];
        bounds.extend(catches.iter().map(|c| c.target.ordinal()));
        bounds.extend(finally.map(|f| f.ordinal()));
        bounds.push(end.ordinal());
        ranges.extend(bounds.windows(2).map(|w| w[0]..w[1]));
    }
    ranges
}
