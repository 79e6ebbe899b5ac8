//! Call-site descriptors emitted by the code generator
//!
//! A descriptor is the cache-key contract between compile time and run
//! time: the generator assigns each late-bound call a unique id and records
//! how the target name is selected and what the supplied arguments look like.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of a static call-site location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSiteId(pub u32);

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Well-known magic methods addressed by symbol instead of by source name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MagicMethod {
    Invoke,
    ToString,
    Construct,
}

impl MagicMethod {
    pub fn method_name(&self) -> &'static str {
        match self {
            MagicMethod::Invoke => "__invoke",
            MagicMethod::ToString => "__tostring",
            MagicMethod::Construct => "__construct",
        }
    }
}

/// How the target method name is selected
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameStrategy {
    /// Name known at compile time
    Direct(String),
    /// Name computed at run time; passed as the first supplied argument
    Computed,
    /// Well-known symbolic name
    Magic(MagicMethod),
}

/// Shape of one supplied argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgShape {
    /// A single value
    Value,
    /// An array whose values are spread into the argument list
    Unpack,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSiteDescriptor {
    pub id: CallSiteId,
    pub strategy: NameStrategy,
    pub args: Vec<ArgShape>,
}

impl CallSiteDescriptor {
    pub fn new(id: CallSiteId, strategy: NameStrategy, args: Vec<ArgShape>) -> Self {
        Self { id, strategy, args }
    }

    /// Method name for display; computed names are shown as `{computed}`
    pub fn display_name(&self) -> &str {
        match &self.strategy {
            NameStrategy::Direct(name) => name,
            NameStrategy::Computed => "{computed}",
            NameStrategy::Magic(m) => m.method_name(),
        }
    }

    /// Number of values the caller pushes for this site, excluding the receiver
    pub fn pushed_arg_count(&self) -> usize {
        self.args.len()
    }
}
