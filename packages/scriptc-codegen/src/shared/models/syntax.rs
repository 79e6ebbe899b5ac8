//! Routines, type declarations and compilation units as handed over by the
//! semantic binder

use serde::{Deserialize, Serialize};

use super::bound::{BoundExpr, ParamSig};
use super::names::QualifiedName;
use crate::features::flow_graph::ControlFlowGraph;

/// A function or method with its bound control-flow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    /// Source-declared parameters; the context parameter is implicit
    pub params: Vec<ParamSig>,
    pub is_static: bool,
    /// Declaring type, for methods
    pub owner: Option<QualifiedName>,
    /// The receiver's type keeps its execution context in a field
    pub threads_context: bool,
    pub cfg: ControlFlowGraph,
}

impl Routine {
    pub fn function(name: impl Into<String>, params: Vec<ParamSig>, cfg: ControlFlowGraph) -> Self {
        Self {
            name: name.into(),
            params,
            is_static: true,
            owner: None,
            threads_context: false,
            cfg,
        }
    }

    pub fn method(
        owner: QualifiedName,
        name: impl Into<String>,
        params: Vec<ParamSig>,
        cfg: ControlFlowGraph,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            is_static: false,
            owner: Some(owner),
            threads_context: false,
            cfg,
        }
    }

    /// `Owner::name` for methods, `name` for functions
    pub fn display_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}::{}", owner, self.name),
            None => self.name.clone(),
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Parameters that consume a caller argument
    pub fn value_params(&self) -> impl Iterator<Item = &ParamSig> {
        self.params.iter().filter(|p| !p.is_context())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub is_static: bool,
    pub initializer: Option<BoundExpr>,
}

impl FieldDecl {
    pub fn instance(name: impl Into<String>, initializer: Option<BoundExpr>) -> Self {
        Self {
            name: name.into(),
            is_static: false,
            initializer,
        }
    }

    pub fn static_field(name: impl Into<String>, initializer: Option<BoundExpr>) -> Self {
        Self {
            name: name.into(),
            is_static: true,
            initializer,
        }
    }

    /// Static fields whose initializer needs a context live in per-context
    /// statics holders; all others in app-wide storage.
    pub fn requires_context(&self) -> bool {
        self.initializer
            .as_ref()
            .is_some_and(BoundExpr::requires_context)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDeclSyntax {
    pub name: QualifiedName,
    pub base: Option<QualifiedName>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<Routine>,
    pub threads_context: bool,
    /// Instances may be called as functions
    pub callable: bool,
}

impl TypeDeclSyntax {
    pub fn new(name: impl Into<QualifiedName>) -> Self {
        Self {
            name: name.into(),
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
            threads_context: false,
            callable: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceItem {
    Function(Routine),
    Type(TypeDeclSyntax),
    /// Declarations textually nested in a runtime-conditional construct
    Conditional(Vec<SourceItem>),
}

/// One source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUnit {
    pub path: String,
    pub items: Vec<SourceItem>,
}

impl SourceUnit {
    pub fn new(path: impl Into<String>, items: Vec<SourceItem>) -> Self {
        Self {
            path: path.into(),
            items,
        }
    }
}
