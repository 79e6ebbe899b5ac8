//! Stack-machine instruction set of the managed target
//!
//! Calling convention: argument 0 of every body that has a context is the
//! execution context (`LdCtx`), source parameters follow from argument 1.
//! The receiver of instance bodies is loaded with `LdThis`. Every call pushes
//! the context explicitly.

use std::fmt;

use serde::{Deserialize, Serialize};

use scriptc_runtime::CallSiteDescriptor;

use crate::shared::models::{BinaryOp, QualifiedName, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub u32);

impl LocalId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Direct call target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    /// Declaring type; `None` for global functions
    pub owner: Option<QualifiedName>,
    pub name: String,
    /// Declaration site of a conditional declaration (`file#item`); keeps it
    /// apart from other declarations of the same name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

impl MethodRef {
    pub const CONSTRUCTOR: &'static str = ".ctor";
    pub const TYPE_INITIALIZER: &'static str = ".cctor";
    pub const STATICS_INITIALIZER: &'static str = "<init_statics>";
    pub const INVOKE_TRAMPOLINE: &'static str = "<invoke>";

    pub fn function(name: &QualifiedName) -> Self {
        Self {
            owner: None,
            name: name.as_str().to_string(),
            site: None,
        }
    }

    pub fn method(owner: &QualifiedName, name: &str) -> Self {
        Self {
            owner: Some(owner.clone()),
            name: name.to_string(),
            site: None,
        }
    }

    pub fn constructor(owner: &QualifiedName) -> Self {
        Self::method(owner, Self::CONSTRUCTOR)
    }

    pub fn at_site(mut self, site: Option<String>) -> Self {
        self.site = site;
        self
    }

    /// Case-insensitive identity, usable as a map key
    pub fn key(&self) -> String {
        let mut key = match &self.owner {
            Some(owner) => format!("{}::{}", owner.key(), self.name.to_ascii_lowercase()),
            None => self.name.to_ascii_lowercase(),
        };
        if let Some(site) = &self.site {
            key.push('@');
            key.push_str(&site.to_ascii_lowercase());
        }
        key
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{}::{}", owner, self.name)?,
            None => f.write_str(&self.name)?,
        }
        match &self.site {
            Some(site) => write!(f, "@{}", site),
            None => Ok(()),
        }
    }
}

/// One instruction. Branch operands are instruction offsets once the body is
/// realized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Nop,

    // Constants
    LdNull,
    LdBool(bool),
    LdLong(i64),
    LdDouble(f64),
    LdStr(String),

    // Arguments and locals
    LdCtx,
    LdThis,
    LdArg(u16),
    StArg(u16),
    LdLoc(LocalId),
    StLoc(LocalId),
    Dup,
    Pop,

    // Operators
    Binary(BinaryOp),
    Unary(UnaryOp),
    /// Pops `len` values, or `len` key/value pairs when `keyed`; a null key appends
    NewArray { len: usize, keyed: bool },
    IsInstance(QualifiedName),
    /// Exact runtime type equality, no subtyping
    IsExactType(QualifiedName),

    // Fields
    LdFld(String),
    StFld(String),
    /// App-wide static field; runs the type initializer on first touch
    LdSFld { ty: QualifiedName, field: String },
    StSFld { ty: QualifiedName, field: String },
    /// Context-bound static field; pops the context, runs the statics
    /// initializer the first time the context touches the type
    LdCtxSFld { ty: QualifiedName, field: String },
    StCtxSFld { ty: QualifiedName, field: String },

    // Calls
    /// Direct call; pops `[this,] ctx, argc values`, pushes the result
    Call { method: MethodRef, argc: usize, instance: bool },
    /// By-name call through the context's function registry; pops `ctx, argc values`
    CallGlobal { name: QualifiedName, argc: usize },
    /// Late-bound call; pops `receiver, ctx, pushed args`
    CallSite(CallSiteDescriptor),
    /// Allocate and construct; pops `ctx, argc values`, pushes the instance
    NewObj { ty: QualifiedName, argc: usize },
    /// Pops `ctx, value`
    Echo,

    // Iteration
    GetEnumerator,
    /// Pops the enumerator, pushes whether an entry is available
    EnumMoveNext,
    EnumKey,
    EnumValue,

    // Control
    Br(usize),
    BrTrue(usize),
    BrFalse(usize),
    /// Exit a protected region, running enclosing finally handlers
    Leave(usize),
    EndFinally,
    Throw,
    Ret,
    /// Fails loudly if the top of stack is null; leaves it in place
    DebugAssertNotNull,
}

impl Instruction {
    /// Values popped and pushed
    pub fn stack_effect(&self) -> (usize, usize) {
        use Instruction::*;
        match self {
            Nop | Br(_) | Leave(_) | EndFinally => (0, 0),
            LdNull | LdBool(_) | LdLong(_) | LdDouble(_) | LdStr(_) => (0, 1),
            LdCtx | LdThis | LdArg(_) | LdLoc(_) | LdSFld { .. } => (0, 1),
            StArg(_) | StLoc(_) | Pop | StSFld { .. } => (1, 0),
            Dup => (1, 2),
            Binary(_) => (2, 1),
            Unary(_) | IsInstance(_) | IsExactType(_) | LdFld(_) => (1, 1),
            NewArray { len, keyed } => (if *keyed { len * 2 } else { *len }, 1),
            StFld(_) => (2, 0),
            LdCtxSFld { .. } => (1, 1),
            StCtxSFld { .. } => (2, 0),
            Call { argc, instance, .. } => (argc + 1 + usize::from(*instance), 1),
            CallGlobal { argc, .. } | NewObj { argc, .. } => (argc + 1, 1),
            CallSite(site) => (site.pushed_arg_count() + 2, 1),
            Echo => (2, 0),
            GetEnumerator | EnumMoveNext | EnumKey | EnumValue => (1, 1),
            BrTrue(_) | BrFalse(_) | Throw | Ret => (1, 0),
            DebugAssertNotNull => (1, 1),
        }
    }

    /// Control never reaches the next instruction
    pub fn is_unconditional_transfer(&self) -> bool {
        matches!(
            self,
            Instruction::Br(_)
                | Instruction::Leave(_)
                | Instruction::EndFinally
                | Instruction::Throw
                | Instruction::Ret
        )
    }

    /// Branch target offset, if any
    pub fn branch_target(&self) -> Option<usize> {
        match self {
            Instruction::Br(t)
            | Instruction::BrTrue(t)
            | Instruction::BrFalse(t)
            | Instruction::Leave(t) => Some(*t),
            _ => None,
        }
    }

    pub(crate) fn set_branch_target(&mut self, target: usize) {
        match self {
            Instruction::Br(t)
            | Instruction::BrTrue(t)
            | Instruction::BrFalse(t)
            | Instruction::Leave(t) => *t = target,
            _ => {}
        }
    }
}
