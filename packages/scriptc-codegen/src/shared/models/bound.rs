//! Bound expressions and statements
//!
//! Produced by the semantic binder and consumed by the code generator. Names
//! are resolved to qualified names, but calls are not yet bound to targets.

use serde::{Deserialize, Serialize};

use scriptc_runtime::Repr;

use super::names::QualifiedName;
use super::span::Span;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Concat,

    // Comparison (loose)
    Eq,
    NotEq,
    Lt,
    Gt,

    // Comparison (strict)
    Identical,

    // Logical
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Target name of a method call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MethodName {
    Direct(String),
    /// `$obj->$name()`
    Computed(Box<BoundExpr>),
}

/// Supplied argument of a method call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub value: BoundExpr,
    /// `...$args`
    pub unpack: bool,
}

impl Argument {
    pub fn value(value: BoundExpr) -> Self {
        Self {
            value,
            unpack: false,
        }
    }

    pub fn unpack(value: BoundExpr) -> Self {
        Self {
            value,
            unpack: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundExpr {
    Literal(Literal),
    Variable(String),
    Assign {
        target: String,
        value: Box<BoundExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<BoundExpr>,
    },
    Call {
        function: QualifiedName,
        args: Vec<BoundExpr>,
    },
    MethodCall {
        receiver: Box<BoundExpr>,
        name: MethodName,
        args: Vec<Argument>,
        /// Exact receiver type, when the binder proved it
        receiver_type: Option<QualifiedName>,
    },
    New {
        ty: QualifiedName,
        args: Vec<BoundExpr>,
    },
    This,
    FieldLoad {
        receiver: Box<BoundExpr>,
        field: String,
    },
    FieldStore {
        receiver: Box<BoundExpr>,
        field: String,
        value: Box<BoundExpr>,
    },
    StaticFieldLoad {
        ty: QualifiedName,
        field: String,
    },
    StaticFieldStore {
        ty: QualifiedName,
        field: String,
        value: Box<BoundExpr>,
    },
    /// Array literal; entries without a key are appended
    Array(Vec<(Option<BoundExpr>, BoundExpr)>),
    InstanceOf {
        value: Box<BoundExpr>,
        ty: QualifiedName,
    },
}

impl BoundExpr {
    pub fn long(n: i64) -> Self {
        BoundExpr::Literal(Literal::Long(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        BoundExpr::Literal(Literal::String(s.into()))
    }

    pub fn null() -> Self {
        BoundExpr::Literal(Literal::Null)
    }

    pub fn var(name: impl Into<String>) -> Self {
        BoundExpr::Variable(name.into())
    }

    pub fn binary(op: BinaryOp, left: BoundExpr, right: BoundExpr) -> Self {
        BoundExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Whether evaluation needs the execution context.
    ///
    /// Static field access counts as context-bound because the field's own
    /// storage class is not known at this level.
    pub fn requires_context(&self) -> bool {
        match self {
            BoundExpr::Literal(_) | BoundExpr::Variable(_) | BoundExpr::This => false,
            BoundExpr::Call { .. }
            | BoundExpr::MethodCall { .. }
            | BoundExpr::New { .. }
            | BoundExpr::StaticFieldLoad { .. }
            | BoundExpr::StaticFieldStore { .. } => true,
            BoundExpr::Assign { value, .. } => value.requires_context(),
            BoundExpr::Binary { left, right, .. } => {
                left.requires_context() || right.requires_context()
            }
            BoundExpr::Unary { operand, .. } => operand.requires_context(),
            BoundExpr::FieldLoad { receiver, .. } => receiver.requires_context(),
            BoundExpr::FieldStore {
                receiver, value, ..
            } => receiver.requires_context() || value.requires_context(),
            BoundExpr::Array(items) => items.iter().any(|(k, v)| {
                k.as_ref().is_some_and(BoundExpr::requires_context) || v.requires_context()
            }),
            BoundExpr::InstanceOf { value, .. } => value.requires_context(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Expr(BoundExpr),
    Echo(BoundExpr),
    Return(Option<BoundExpr>),
    Throw(BoundExpr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundStmt {
    pub kind: StmtKind,
    pub span: Option<Span>,
}

impl BoundStmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, span: None }
    }

    pub fn expr(expr: BoundExpr) -> Self {
        Self::new(StmtKind::Expr(expr))
    }

    pub fn echo(expr: BoundExpr) -> Self {
        Self::new(StmtKind::Echo(expr))
    }

    pub fn ret(expr: Option<BoundExpr>) -> Self {
        Self::new(StmtKind::Return(expr))
    }

    pub fn throw(expr: BoundExpr) -> Self {
        Self::new(StmtKind::Throw(expr))
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// Declared type of a parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeHint {
    /// Any value
    Value,
    Bool,
    Long,
    Double,
    String,
    Array,
    Object(QualifiedName),
}

impl TypeHint {
    /// Whether a value declared as `self` can be passed where `callee` is expected
    pub fn can_be_passed_to(&self, callee: &TypeHint) -> bool {
        self == callee
            || matches!(callee, TypeHint::Value)
            || matches!((self, callee), (TypeHint::Long, TypeHint::Double))
    }

    /// Runtime representation used for argument conversion
    pub fn repr(&self) -> Repr {
        match self {
            TypeHint::Value => Repr::Value,
            TypeHint::Bool => Repr::Bool,
            TypeHint::Long => Repr::Long,
            TypeHint::Double => Repr::Double,
            TypeHint::String => Repr::String,
            TypeHint::Array => Repr::Array,
            TypeHint::Object(_) => Repr::Object,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    /// Satisfied from the current execution context, never from caller arguments
    Context,
    Value(TypeHint),
}

/// Formal parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSig {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<Literal>,
}

impl ParamSig {
    pub fn value(name: impl Into<String>, hint: TypeHint) -> Self {
        Self {
            name: name.into(),
            ty: ParamType::Value(hint),
            default: None,
        }
    }

    pub fn context() -> Self {
        Self {
            name: "<ctx>".to_string(),
            ty: ParamType::Context,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Literal) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_context(&self) -> bool {
        matches!(self.ty, ParamType::Context)
    }

    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }
}
