//! Instruction stream builder
//!
//! Branches are emitted against labels and patched to instruction offsets in
//! `finish`. The builder tracks the evaluation stack depth through every
//! instruction: a branch records the depth its label expects, and marking a
//! label after an unconditional transfer restores it.

use rustc_hash::FxHashMap;

use scriptc_runtime::CallSiteDescriptor;

use super::local_slots::LocalSlots;
use crate::errors::{CodegenError, Result, SlotKind};
use crate::features::codegen::domain::{Instruction, LocalInfo, SequencePoint};
use crate::shared::models::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Always,
    IfTrue,
    IfFalse,
    Leave,
}

impl BranchKind {
    fn placeholder(self) -> Instruction {
        match self {
            BranchKind::Always => Instruction::Br(0),
            BranchKind::IfTrue => Instruction::BrTrue(0),
            BranchKind::IfFalse => Instruction::BrFalse(0),
            BranchKind::Leave => Instruction::Leave(0),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct LabelState {
    offset: Option<usize>,
    depth: Option<usize>,
}

/// Everything the builder produced, with branches resolved
#[derive(Debug)]
pub struct Assembled {
    pub instructions: Vec<Instruction>,
    pub max_stack: usize,
    pub locals: Vec<LocalInfo>,
    pub sequence_points: Vec<SequencePoint>,
    pub call_sites: Vec<CallSiteDescriptor>,
}

#[derive(Debug)]
pub struct IlBuilder {
    routine: String,
    instructions: Vec<Instruction>,
    labels: Vec<LabelState>,
    /// (instruction index, label) of every branch awaiting its offset
    fixups: Vec<(usize, Label)>,
    depth: usize,
    max_stack: usize,
    /// False after an unconditional transfer until the next label
    reachable: bool,
    /// Offsets observed from outside; instructions before them are never removed
    pinned: usize,
    pub(crate) locals: LocalSlots,
    sequence_points: Vec<SequencePoint>,
    call_sites: Vec<CallSiteDescriptor>,
    fault: Option<String>,
}

impl IlBuilder {
    pub fn new(routine: impl Into<String>) -> Self {
        Self {
            routine: routine.into(),
            instructions: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            depth: 0,
            max_stack: 0,
            reachable: true,
            pinned: 0,
            locals: LocalSlots::new(),
            sequence_points: Vec::new(),
            call_sites: Vec::new(),
            fault: None,
        }
    }

    pub fn routine(&self) -> &str {
        &self.routine
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Offset of the next instruction
    pub fn offset(&mut self) -> usize {
        self.pinned = self.instructions.len();
        self.instructions.len()
    }

    pub fn emit(&mut self, instruction: Instruction) {
        let (pops, pushes) = instruction.stack_effect();
        self.adjust(pops, pushes, &instruction);
        if let Instruction::CallSite(descriptor) = &instruction {
            self.call_sites.push(descriptor.clone());
        }
        if instruction.is_unconditional_transfer() {
            self.reachable = false;
        }
        self.instructions.push(instruction);
    }

    pub fn define_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(LabelState::default());
        label
    }

    pub fn is_marked(&self, label: Label) -> bool {
        self.labels[label.0 as usize].offset.is_some()
    }

    /// Bind `label` to the next instruction
    pub fn mark_label(&mut self, label: Label) {
        let offset = self.offset();
        let state = &mut self.labels[label.0 as usize];
        if state.offset.is_some() {
            self.fail(format!("label {:?} marked twice", label));
            return;
        }
        state.offset = Some(offset);

        match (self.reachable, state.depth) {
            (true, Some(expected)) if expected != self.depth => {
                let found = self.depth;
                self.fail(format!(
                    "stack depth {} falls into a label expecting {}",
                    found, expected
                ));
            }
            (true, _) => state.depth = Some(self.depth),
            (false, Some(expected)) => self.depth = expected,
            (false, None) => {
                self.depth = 0;
                state.depth = Some(0);
            }
        }
        self.reachable = true;
    }

    pub fn branch(&mut self, kind: BranchKind, label: Label) {
        let instruction = kind.placeholder();
        let (pops, _) = instruction.stack_effect();
        let index = self.instructions.len();
        self.emit(instruction);
        self.fixups.push((index, label));

        let depth = self.depth;
        let state = &mut self.labels[label.0 as usize];
        match state.depth {
            Some(expected) if expected != depth => {
                self.fail(format!(
                    "branch at depth {} to a label expecting {} (popped {})",
                    depth, expected, pops
                ));
            }
            _ => state.depth = Some(depth),
        }
    }

    /// Drop a trailing `Br` to `label` when the label is about to be marked
    /// right behind it.
    pub fn elide_branch_to(&mut self, label: Label) -> bool {
        let Some(last) = self.instructions.len().checked_sub(1) else {
            return false;
        };
        if last < self.pinned || !matches!(self.instructions[last], Instruction::Br(_)) {
            return false;
        }
        match self.fixups.last() {
            Some((index, target)) if *index == last && *target == label => {
                self.fixups.pop();
                self.instructions.pop();
                // Control now falls through into the label
                self.reachable = true;
                true
            }
            _ => false,
        }
    }

    pub fn last_is_unconditional(&self) -> bool {
        !self.reachable
    }

    /// Start of an exception handler; the runtime pushes `depth` values
    pub fn begin_handler(&mut self, depth: usize) {
        self.depth = depth;
        self.max_stack = self.max_stack.max(depth);
        self.reachable = true;
    }

    pub fn sequence_point(&mut self, span: Span) {
        let offset = self.offset();
        self.sequence_points.push(SequencePoint { offset, span });
    }

    /// Resolve every branch and check the slot budget
    pub fn finish(mut self, max_locals: usize) -> Result<Assembled> {
        if let Some(message) = self.fault.take() {
            return Err(CodegenError::invariant(self.routine, message));
        }

        for (index, label) in std::mem::take(&mut self.fixups) {
            let Some(target) = self.labels[label.0 as usize].offset else {
                return Err(CodegenError::invariant(
                    self.routine,
                    format!("branch at {} to a label that was never marked", index),
                ));
            };
            self.instructions[index].set_branch_target(target);
        }

        if self.locals.len() > max_locals {
            return Err(CodegenError::CapacityExceeded {
                routine: self.routine,
                kind: SlotKind::Local,
                count: self.locals.len(),
                limit: max_locals,
            });
        }

        Ok(Assembled {
            instructions: self.instructions,
            max_stack: self.max_stack,
            locals: self.locals.into_locals(),
            sequence_points: self.sequence_points,
            call_sites: self.call_sites,
        })
    }

    fn adjust(&mut self, pops: usize, pushes: usize, instruction: &Instruction) {
        if self.depth < pops {
            self.fail(format!(
                "stack underflow at {:?}: depth {}, pops {}",
                instruction, self.depth, pops
            ));
            self.depth = 0;
        } else {
            self.depth -= pops;
        }
        self.depth += pushes;
        self.max_stack = self.max_stack.max(self.depth);
    }

    fn fail(&mut self, message: String) {
        if self.fault.is_none() {
            self.fault = Some(message);
        }
    }
}

/// Label per key, created on first request
#[derive(Debug)]
pub struct LabelMap<K> {
    labels: FxHashMap<K, Label>,
}

impl<K: std::hash::Hash + Eq> Default for LabelMap<K> {
    fn default() -> Self {
        Self {
            labels: FxHashMap::default(),
        }
    }
}

impl<K: std::hash::Hash + Eq + Copy> LabelMap<K> {
    pub fn get(&mut self, il: &mut IlBuilder, key: K) -> Label {
        *self.labels.entry(key).or_insert_with(|| il.define_label())
    }
}
