//! Basic blocks

use std::fmt;

use serde::{Deserialize, Serialize};

use super::edge::EdgeId;
use crate::shared::models::BoundStmt;

/// Arena index of a block; equal to the block's ordinal (creation order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub fn ordinal(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Start,
    Exit,
    Normal,
}

/// Straight-line statement sequence with at most one outgoing edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) kind: BlockKind,
    pub(crate) statements: Vec<BoundStmt>,
    pub(crate) outgoing: Option<EdgeId>,
}

impl Block {
    pub(crate) fn new(id: BlockId, kind: BlockKind) -> Self {
        Self {
            id,
            kind,
            statements: Vec::new(),
            outgoing: None,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn ordinal(&self) -> u32 {
        self.id.0
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn is_exit(&self) -> bool {
        self.kind == BlockKind::Exit
    }

    pub fn statements(&self) -> &[BoundStmt] {
        &self.statements
    }

    /// Terminator, `None` until the block is connected (always `None` for the exit)
    pub fn outgoing(&self) -> Option<EdgeId> {
        self.outgoing
    }
}
