//! Edges: the terminator of a block, one variant per control construct

use std::fmt;

use serde::{Deserialize, Serialize};

use super::block::BlockId;
use crate::shared::models::{BoundExpr, QualifiedName};

/// Root of the exception hierarchy; a catch filter of this type matches anything
pub const ROOT_EXCEPTION: &str = "Exception";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub(crate) u32);

impl EdgeId {
    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// One `catch (Type $var)` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchBlock {
    pub type_name: QualifiedName,
    pub variable: Option<String>,
    pub target: BlockId,
}

impl CatchBlock {
    pub fn new(type_name: impl Into<QualifiedName>, variable: Option<&str>, target: BlockId) -> Self {
        Self {
            type_name: type_name.into(),
            variable: variable.map(str::to_string),
            target,
        }
    }

    pub fn catches_anything(&self) -> bool {
        self.type_name.is(ROOT_EXCEPTION)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaseLabel {
    Value(BoundExpr),
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBlock {
    pub label: CaseLabel,
    pub target: BlockId,
}

impl CaseBlock {
    pub fn value(value: BoundExpr, target: BlockId) -> Self {
        Self {
            label: CaseLabel::Value(value),
            target,
        }
    }

    pub fn default(target: BlockId) -> Self {
        Self {
            label: CaseLabel::Default,
            target,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self.label, CaseLabel::Default)
    }
}

/// Variable bound by a foreach iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeachVar {
    pub name: String,
}

impl ForeachVar {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EdgeKind {
    Simple {
        target: BlockId,
    },
    Conditional {
        condition: BoundExpr,
        if_true: BlockId,
        if_false: BlockId,
    },
    TryCatch {
        body: BlockId,
        catches: Vec<CatchBlock>,
        finally: Option<BlockId>,
        /// Block following the whole construct
        end: BlockId,
    },
    /// Acquires the iterator; `target` is the move-next block
    ForeachEnumeree {
        enumeree: BoundExpr,
        target: BlockId,
    },
    /// Advances the iterator of `enumeree` and binds the current entry
    ForeachMoveNext {
        enumeree: EdgeId,
        key: Option<ForeachVar>,
        value: ForeachVar,
        body: BlockId,
        end: BlockId,
    },
    Switch {
        scrutinee: BoundExpr,
        cases: Vec<CaseBlock>,
        /// Block following the switch
        end: BlockId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub(crate) id: EdgeId,
    pub(crate) source: BlockId,
    pub(crate) kind: EdgeKind,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn source(&self) -> BlockId {
        self.source
    }

    pub fn kind(&self) -> &EdgeKind {
        &self.kind
    }

    /// Every block this edge can transfer control to
    pub fn targets(&self) -> Vec<BlockId> {
        match &self.kind {
            EdgeKind::Simple { target } => vec![*target],
            EdgeKind::Conditional {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            EdgeKind::TryCatch {
                body,
                catches,
                finally,
                end,
            } => {
                let mut targets = vec![*body];
                targets.extend(catches.iter().map(|c| c.target));
                targets.extend(*finally);
                targets.push(*end);
                targets
            }
            EdgeKind::ForeachEnumeree { target, .. } => vec![*target],
            EdgeKind::ForeachMoveNext { body, end, .. } => vec![*body, *end],
            EdgeKind::Switch { cases, end, .. } => {
                let mut targets: Vec<_> = cases.iter().map(|c| c.target).collect();
                targets.push(*end);
                targets
            }
        }
    }

    /// First catch clause handling an exception named `type_name`, by exact
    /// name or by the root exception type.
    pub fn handling_catch(&self, type_name: &str) -> Option<&CatchBlock> {
        match &self.kind {
            EdgeKind::TryCatch { catches, .. } => catches
                .iter()
                .find(|c| c.type_name.is(type_name) || c.catches_anything()),
            _ => None,
        }
    }

    pub fn is_try_catch(&self) -> bool {
        matches!(self.kind, EdgeKind::TryCatch { .. })
    }
}
