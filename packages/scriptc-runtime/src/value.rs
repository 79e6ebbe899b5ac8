//! Runtime values and the conversions the binder applies to them

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::types::RuntimeType;

/// Declared runtime representation of a parameter or return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Repr {
    /// Any value, passed through unchanged
    Value,
    Bool,
    Long,
    Double,
    String,
    Array,
    Object,
}

impl Repr {
    pub fn as_str(&self) -> &'static str {
        match self {
            Repr::Value => "mixed",
            Repr::Bool => "bool",
            Repr::Long => "int",
            Repr::Double => "float",
            Repr::String => "string",
            Repr::Array => "array",
            Repr::Object => "object",
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered key/value array
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayValue {
    entries: Vec<(Value, Value)>,
}

impl ArrayValue {
    pub fn new(entries: Vec<(Value, Value)>) -> Self {
        Self { entries }
    }

    /// List with implicit integer keys 0..n
    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            entries: values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::Long(i as i64), v))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Script object: an instance of a runtime type with named fields
pub struct Object {
    ty: Arc<RuntimeType>,
    fields: RwLock<FxHashMap<String, Value>>,
}

impl Object {
    pub fn new(ty: Arc<RuntimeType>) -> Arc<Self> {
        Arc::new(Self {
            ty,
            fields: RwLock::new(FxHashMap::default()),
        })
    }

    /// Concrete runtime type of the instance
    pub fn runtime_type(&self) -> &Arc<RuntimeType> {
        &self.ty
    }

    pub fn field(&self, name: &str) -> Value {
        self.fields.read().get(name).cloned().unwrap_or_default()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.write().insert(name.to_string(), value);
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.read().contains_key(name)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object({})", self.ty.name())
    }
}

/// Dynamically-typed script value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(Arc<str>),
    Array(Arc<ArrayValue>),
    Object(Arc<Object>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Arc::new(ArrayValue::list(values)))
    }

    pub fn array(entries: Vec<(Value, Value)>) -> Self {
        Value::Array(Arc::new(ArrayValue::new(entries)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's kind, independent of any object type
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Long(_) => "int",
            Value::Double(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Kind name, or the class name for objects
    pub fn type_name(&self) -> &str {
        match self {
            Value::Object(obj) => obj.runtime_type().name(),
            other => other.kind_name(),
        }
    }

    pub fn as_object(&self) -> Option<&Arc<Object>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Arc<ArrayValue>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Long(n) => *n != 0,
            Value::Double(d) => *d != 0.0,
            Value::String(s) => !s.is_empty() && &**s != "0",
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(_) => true,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Null => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Long(n) => Some(*n as f64),
            Value::Double(d) => Some(*d),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Convert to the declared representation; `None` when no conversion exists
    pub fn convert_to(&self, repr: Repr) -> Option<Value> {
        match repr {
            Repr::Value => Some(self.clone()),
            Repr::Bool => Some(Value::Bool(self.truthy())),
            Repr::Long => match self {
                Value::Long(_) => Some(self.clone()),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::Long).or_else(|| {
                    s.trim().parse::<f64>().ok().map(|d| Value::Long(d as i64))
                }),
                other => other.as_number().map(|d| Value::Long(d as i64)),
            },
            Repr::Double => self.as_number().map(Value::Double),
            Repr::String => match self {
                Value::Array(_) | Value::Object(_) => None,
                other => Some(Value::string(other.to_string())),
            },
            Repr::Array => self.as_array().map(|_| self.clone()),
            Repr::Object => self.as_object().map(|_| self.clone()),
        }
    }

    /// Loose (`==`) comparison used by switch dispatch
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, v) | (v, Value::Null) => !v.truthy(),
            (Value::Bool(b), v) | (v, Value::Bool(b)) => *b == v.truthy(),
            (Value::String(a), Value::String(b)) => {
                match (self.as_number(), other.as_number()) {
                    (Some(x), Some(y)) => x == y,
                    _ => a == b,
                }
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len()
                    && a.entries()
                        .iter()
                        .zip(b.entries())
                        .all(|((ka, va), (kb, vb))| ka.loose_equals(kb) && va.loose_equals(vb))
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => f.write_str("1"),
            Value::Bool(false) => Ok(()),
            Value::Long(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => f.write_str(s),
            Value::Array(_) => f.write_str("Array"),
            Value::Object(obj) => write!(f, "Object({})", obj.runtime_type().name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Long(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{:?}", d),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(arr) => f.debug_map().entries(arr.entries().iter().map(|(k, v)| (k, v))).finish(),
            Value::Object(obj) => write!(f, "{:?}", obj),
        }
    }
}

impl PartialEq for Value {
    /// Strict identity-style equality (`===`)
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}
