//! Declaration table entries

use std::sync::Arc;

use crate::shared::models::{FieldDecl, ParamSig, QualifiedName, Routine};

/// Magic method invoked when an instance is called as a function
pub const MAGIC_INVOKE: &str = "__invoke";

/// User-defined instance initializer
pub const USER_INITIALIZER: &str = "__construct";

/// Position of a declaration in caller order: unit index, then item index
/// within the unit (depth-first through conditional groups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclOrigin {
    pub unit: usize,
    pub item: usize,
}

/// Emitted site tag of a conditional declaration, `None` otherwise
fn declaration_site(conditional: bool, file: &str, origin: DeclOrigin) -> Option<String> {
    conditional.then(|| format!("{}#{}", file, origin.item))
}

#[derive(Debug)]
pub struct FunctionEntry {
    pub name: QualifiedName,
    /// Normalized path of the owning file
    pub file: String,
    pub conditional: bool,
    pub routine: Arc<Routine>,
    pub(crate) origin: DeclOrigin,
}

impl FunctionEntry {
    pub fn signature(&self) -> &[ParamSig] {
        &self.routine.params
    }

    /// Site tag carried by the bodies emitted for this declaration
    pub fn site(&self) -> Option<String> {
        declaration_site(self.conditional, &self.file, self.origin)
    }
}

#[derive(Debug)]
pub struct TypeEntry {
    pub name: QualifiedName,
    pub file: String,
    pub conditional: bool,
    pub base: Option<QualifiedName>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<Arc<Routine>>,
    /// Instances keep their execution context in a field
    pub threads_context: bool,
    pub callable: bool,
    pub(crate) origin: DeclOrigin,
}

impl TypeEntry {
    /// Site tag carried by every body emitted for this type
    pub fn site(&self) -> Option<String> {
        declaration_site(self.conditional, &self.file, self.origin)
    }

    /// Method declared directly on this type
    pub fn method(&self, name: &str) -> Option<&Arc<Routine>> {
        self.methods.iter().find(|m| m.is_named(name))
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.iter().filter(|f| !f.is_static)
    }

    pub fn static_fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.iter().filter(|f| f.is_static)
    }

    /// Has static fields bound to a context, kept in a per-context holder
    pub fn declares_statics_holder(&self) -> bool {
        self.static_fields().any(FieldDecl::requires_context)
    }

    /// Has static fields initialized once per process
    pub fn declares_app_statics(&self) -> bool {
        self.static_fields().any(|f| !f.requires_context())
    }

    /// Callable type that handles calls with `__invoke`
    pub fn declares_magic_invoke(&self) -> bool {
        self.callable && self.method(MAGIC_INVOKE).is_some()
    }

    /// Declares the `<ctx>` field: context-threading types and hierarchy roots
    pub fn declares_context_field(&self) -> bool {
        self.threads_context || self.base.is_none()
    }
}

#[derive(Debug, Clone)]
pub enum Declaration {
    Function(Arc<FunctionEntry>),
    Type(Arc<TypeEntry>),
}

impl Declaration {
    pub fn name(&self) -> &QualifiedName {
        match self {
            Declaration::Function(f) => &f.name,
            Declaration::Type(t) => &t.name,
        }
    }

    pub fn is_conditional(&self) -> bool {
        match self {
            Declaration::Function(f) => f.conditional,
            Declaration::Type(t) => t.conditional,
        }
    }
}

#[derive(Debug)]
pub struct FileEntry {
    /// Normalized, case-folded path
    pub path: String,
    /// Path as supplied by the caller
    pub source_path: String,
    pub unit: usize,
    /// Declarations in source order, conditional ones included
    pub declarations: Vec<Declaration>,
}

impl FileEntry {
    pub fn functions(&self) -> impl Iterator<Item = &Arc<FunctionEntry>> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<TypeEntry>> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Type(t) => Some(t),
            _ => None,
        })
    }

    /// Conditional function of this file with the given name, first in source order
    pub fn conditional_function(&self, name: &str) -> Option<&Arc<FunctionEntry>> {
        self.functions().find(|f| f.conditional && f.name.is(name))
    }
}
