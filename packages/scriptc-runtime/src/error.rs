//! Error types for scriptc-runtime
//!
//! Every variant is fatal at the call site that produced it; the executing
//! program's own error handling decides what happens next.

use thiserror::Error;

use crate::dynamic::CallSiteId;
use crate::value::{Repr, Value};

/// Dispatch and execution failures raised at run time
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Method call through a null receiver
    #[error("call to method '{method}' on null (call site {site})")]
    NullReceiver { site: CallSiteId, method: String },

    /// No method of that name on the receiver's concrete type
    #[error("call to undefined method {type_name}::{method}()")]
    UnresolvableMember { type_name: String, method: String },

    /// Supplied argument cannot be converted to the declared parameter representation
    #[error("argument {position} of {method}() expects {expected}, {found} given")]
    ArgumentConversion {
        method: String,
        position: usize,
        expected: Repr,
        found: &'static str,
    },

    /// A formal parameter has no corresponding supplied argument
    #[error("too few arguments to {method}(): {supplied} passed, {required} required")]
    SignatureMismatch {
        method: String,
        supplied: usize,
        required: usize,
    },

    /// A computed method name did not evaluate to a string
    #[error("method name must be a string, {found} given")]
    InvalidMethodName { found: &'static str },

    /// Call to a function that has not been declared in this context
    #[error("call to undefined function {name}()")]
    UndefinedFunction { name: String },

    /// Conditional function declared twice in one context
    #[error("cannot redeclare function {name}()")]
    FunctionRedeclared { name: String },

    /// A script-level exception propagating out of native code
    #[error("uncaught exception of type {type_name}")]
    Thrown { type_name: String, value: Value },

    /// Failure inside the invoked method body
    #[error("invocation failed: {0}")]
    Invocation(String),
}

impl DispatchError {
    /// Wrap a script value as a propagating exception
    pub fn thrown(value: Value) -> Self {
        DispatchError::Thrown {
            type_name: value.type_name().to_string(),
            value,
        }
    }

    pub fn invocation(msg: impl Into<String>) -> Self {
        DispatchError::Invocation(msg.into())
    }

    /// Whether the error carries a script exception that handlers may catch
    pub fn is_thrown(&self) -> bool {
        matches!(self, DispatchError::Thrown { .. })
    }
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, DispatchError>;
