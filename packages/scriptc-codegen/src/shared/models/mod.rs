//! Shared models

pub mod bound;
mod names;
mod span;
pub mod syntax;

pub use bound::{
    Argument, BinaryOp, BoundExpr, BoundStmt, Literal, MethodName, ParamSig, ParamType, StmtKind,
    TypeHint, UnaryOp,
};
pub use names::QualifiedName;
pub use span::Span;
pub use syntax::{FieldDecl, Routine, SourceItem, SourceUnit, TypeDeclSyntax};
