//! Realized method body: the codegen output for one routine

use serde::{Deserialize, Serialize};

use scriptc_runtime::CallSiteDescriptor;

use super::instruction::{Instruction, LocalId, MethodRef};
use crate::features::flow_graph::BlockId;
use crate::shared::models::{ParamSig, QualifiedName, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    /// Compiled from a routine's flow graph
    Routine,
    Constructor,
    /// App-wide static field initialization, once per process
    TypeInitializer,
    /// Context-bound static field initialization, once per context
    StaticsInitializer,
    /// Forwards calls on callable instances to `__invoke`
    InvokeTrampoline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    /// Handler entered when the thrown value is an instance of the type
    Catch(QualifiedName),
    Finally,
}

/// Protected range `[try_start, try_end)` and its handler
/// `[handler_start, handler_end)`, as instruction offsets.
///
/// Regions are listed innermost first, so the first matching region wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRegion {
    pub kind: RegionKind,
    pub try_start: usize,
    pub try_end: usize,
    pub handler_start: usize,
    pub handler_end: usize,
}

impl ExceptionRegion {
    pub fn protects(&self, offset: usize) -> bool {
        self.try_start <= offset && offset < self.try_end
    }

    pub fn in_handler(&self, offset: usize) -> bool {
        self.handler_start <= offset && offset < self.handler_end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalKind {
    /// Source variable
    Variable,
    /// Scratch value with a bounded lifetime (switch scrutinee, forwarded argument)
    Temp,
    /// Iterator state of one foreach
    Enumerator,
    /// Value returned through the exit block
    ReturnValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalInfo {
    pub name: String,
    pub kind: LocalKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePoint {
    pub offset: usize,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    pub name: MethodRef,
    pub kind: BodyKind,
    /// Source parameters, loaded with `LdArg(1..)`
    pub params: Vec<ParamSig>,
    /// Argument 0 is the execution context
    pub has_context: bool,
    pub is_static: bool,
    /// Normalized path of the declaring file
    pub source_file: String,
    pub instructions: Vec<Instruction>,
    /// Offset of the first instruction of each placed block
    pub block_offsets: Vec<(BlockId, usize)>,
    pub regions: Vec<ExceptionRegion>,
    pub max_stack: usize,
    pub locals: Vec<LocalInfo>,
    pub sequence_points: Vec<SequencePoint>,
    pub call_sites: Vec<CallSiteDescriptor>,
}

impl MethodBody {
    pub fn block_offset(&self, block: BlockId) -> Option<usize> {
        self.block_offsets
            .iter()
            .find(|(b, _)| *b == block)
            .map(|(_, offset)| *offset)
    }

    pub fn local(&self, id: LocalId) -> Option<&LocalInfo> {
        self.locals.get(id.index())
    }

    /// Number of instructions matching `pred`
    pub fn count(&self, pred: impl Fn(&Instruction) -> bool) -> usize {
        self.instructions.iter().filter(|i| pred(i)).count()
    }
}
