//! Runtime type reflection: identity, base chain and member lookup by name

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;
use crate::value::{Repr, Value};

static NEXT_TYPE_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a runtime type; two types are the same type iff their ids match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeTypeId(u32);

impl RuntimeTypeId {
    fn next() -> Self {
        RuntimeTypeId(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Native entry point of a method: `(context, receiver, value arguments)`
///
/// Context-typed formals are not part of the argument vector; the context is
/// always passed explicitly as the first parameter.
pub type NativeMethod = Arc<dyn Fn(&Context, &Value, Vec<Value>) -> Result<Value> + Send + Sync>;

/// Formal parameter kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Satisfied from the ambient execution context
    Context,
    /// Satisfied from the next supplied argument, converted to `Repr`
    Value(Repr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: String,
    pub kind: ParamKind,
}

impl ParamInfo {
    pub fn context() -> Self {
        Self {
            name: "<ctx>".to_string(),
            kind: ParamKind::Context,
        }
    }

    pub fn value(name: impl Into<String>, repr: Repr) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Value(repr),
        }
    }

    pub fn is_context(&self) -> bool {
        matches!(self.kind, ParamKind::Context)
    }
}

/// Reflected method
pub struct MethodInfo {
    name: String,
    declaring_type: String,
    params: Vec<ParamInfo>,
    body: NativeMethod,
}

impl MethodInfo {
    pub fn new(
        name: impl Into<String>,
        params: Vec<ParamInfo>,
        body: impl Fn(&Context, &Value, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_type: String::new(),
            params,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn params(&self) -> &[ParamInfo] {
        &self.params
    }

    /// Number of formals that consume a supplied argument
    pub fn value_param_count(&self) -> usize {
        self.params.iter().filter(|p| !p.is_context()).count()
    }

    pub fn invoke(&self, ctx: &Context, receiver: &Value, args: Vec<Value>) -> Result<Value> {
        (self.body)(ctx, receiver, args)
    }
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInfo")
            .field("name", &self.name)
            .field("declaring_type", &self.declaring_type)
            .field("params", &self.params)
            .finish()
    }
}

/// Runtime type: name, identity, optional base, declared methods
pub struct RuntimeType {
    id: RuntimeTypeId,
    name: String,
    base: Option<Arc<RuntimeType>>,
    methods: Vec<Arc<MethodInfo>>,
}

impl RuntimeType {
    pub fn builder(name: impl Into<String>) -> RuntimeTypeBuilder {
        RuntimeTypeBuilder {
            name: name.into(),
            base: None,
            methods: Vec::new(),
        }
    }

    pub fn id(&self) -> RuntimeTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&Arc<RuntimeType>> {
        self.base.as_ref()
    }

    pub fn declared_methods(&self) -> &[Arc<MethodInfo>] {
        &self.methods
    }

    /// Method declared directly on this type (names are case-insensitive)
    pub fn declared_method(&self, name: &str) -> Option<&Arc<MethodInfo>> {
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Method lookup through the base chain; the most derived declaration wins
    pub fn find_method(&self, name: &str) -> Option<Arc<MethodInfo>> {
        let mut current = Some(self);
        while let Some(ty) = current {
            if let Some(method) = ty.declared_method(name) {
                return Some(Arc::clone(method));
            }
            current = ty.base.as_deref();
        }
        None
    }

    /// Whether `self` is `other` or derives from it (names compared case-insensitively)
    pub fn is_subtype_of(&self, other: &str) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.name.eq_ignore_ascii_case(other) {
                return true;
            }
            current = ty.base.as_deref();
        }
        false
    }
}

impl PartialEq for RuntimeType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RuntimeType {}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeType")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base", &self.base.as_ref().map(|b| b.name()))
            .field("methods", &self.methods.len())
            .finish()
    }
}

pub struct RuntimeTypeBuilder {
    name: String,
    base: Option<Arc<RuntimeType>>,
    methods: Vec<MethodInfo>,
}

impl RuntimeTypeBuilder {
    pub fn base(mut self, base: Arc<RuntimeType>) -> Self {
        self.base = Some(base);
        self
    }

    pub fn method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Arc<RuntimeType> {
        let name = self.name;
        let methods = self
            .methods
            .into_iter()
            .map(|mut m| {
                m.declaring_type = name.clone();
                Arc::new(m)
            })
            .collect();

        Arc::new(RuntimeType {
            id: RuntimeTypeId::next(),
            name,
            base: self.base,
            methods,
        })
    }
}
