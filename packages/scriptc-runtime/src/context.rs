//! Execution context threaded through every generated call
//!
//! A `Context` owns what is bound to one script execution: the runtime
//! function registry (conditional declarations register here when their
//! declaring branch runs), the per-context statics holders, and the output
//! buffer. Statics that do not depend on a context live in `AppStatics`,
//! shared by every context of the process.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::error::{DispatchError, Result};
use crate::value::Value;

/// Native function registered by name in a context
pub type NativeFunction = Arc<dyn Fn(&Context, Vec<Value>) -> Result<Value> + Send + Sync>;

fn key(name: &str) -> String {
    name.trim_start_matches('\\').to_ascii_lowercase()
}

/// Storage for static fields bound to one context
pub struct StaticsHolder {
    type_name: String,
    fields: RwLock<FxHashMap<String, Value>>,
    /// Error of a failed initializer, reported on every later access
    failure: OnceCell<DispatchError>,
}

impl StaticsHolder {
    fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            fields: RwLock::new(FxHashMap::default()),
            failure: OnceCell::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, field: &str) -> Value {
        self.fields.read().get(field).cloned().unwrap_or_default()
    }

    pub fn set(&self, field: &str, value: Value) {
        self.fields.write().insert(field.to_string(), value);
    }
}

enum InitState {
    Running,
    Done,
    Failed(DispatchError),
}

/// Process-wide static fields initialized by type initializers
#[derive(Default)]
pub struct AppStatics {
    fields: DashMap<(String, String), Value>,
    initialized: DashMap<String, InitState>,
}

impl AppStatics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run `init` the first time the type's statics are touched.
    ///
    /// The type is marked before `init` runs, so an initializer that reads its
    /// own statics observes defaults instead of recursing. A failed
    /// initializer is not retried: its error is returned on every later access.
    pub fn ensure_initialized(&self, type_name: &str, init: impl FnOnce() -> Result<()>) -> Result<()> {
        let k = key(type_name);
        match self.initialized.entry(k.clone()) {
            Entry::Occupied(state) => {
                return match state.get() {
                    InitState::Failed(err) => Err(err.clone()),
                    InitState::Running | InitState::Done => Ok(()),
                };
            }
            Entry::Vacant(slot) => {
                slot.insert(InitState::Running);
            }
        }

        trace!("running type initializer for {}", type_name);
        let outcome = init();
        let state = match &outcome {
            Ok(()) => InitState::Done,
            Err(err) => {
                warn!("type initializer for {} failed: {}", type_name, err);
                InitState::Failed(err.clone())
            }
        };
        self.initialized.insert(k, state);
        outcome
    }

    pub fn get(&self, type_name: &str, field: &str) -> Value {
        self.fields
            .get(&(key(type_name), field.to_string()))
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn set(&self, type_name: &str, field: &str, value: Value) {
        self.fields.insert((key(type_name), field.to_string()), value);
    }
}

pub struct Context {
    app: Arc<AppStatics>,
    functions: DashMap<String, NativeFunction>,
    statics: DashMap<String, Arc<StaticsHolder>>,
    output: Mutex<String>,
}

impl Context {
    pub fn new(app: Arc<AppStatics>) -> Self {
        Self {
            app,
            functions: DashMap::new(),
            statics: DashMap::new(),
            output: Mutex::new(String::new()),
        }
    }

    pub fn app(&self) -> &Arc<AppStatics> {
        &self.app
    }

    /// Register a function; the runtime registration event for conditional declarations
    pub fn declare_function(
        &self,
        name: &str,
        f: impl Fn(&Context, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Result<()> {
        match self.functions.entry(key(name)) {
            Entry::Occupied(_) => Err(DispatchError::FunctionRedeclared {
                name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(f));
                Ok(())
            }
        }
    }

    pub fn is_function_declared(&self, name: &str) -> bool {
        self.functions.contains_key(&key(name))
    }

    /// Call a function by name through the registry
    pub fn call_function(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        // Clone out of the map so the shard lock is not held during the call.
        let f = self
            .functions
            .get(&key(name))
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| DispatchError::UndefinedFunction {
                name: name.to_string(),
            })?;
        f(self, args)
    }

    /// Statics holder of `type_name`, created and initialized on first access
    ///
    /// The holder is published before `init` runs so that the initializer can
    /// store into it. If `init` fails, this and every later access of the
    /// holder in this context return its error.
    pub fn statics(
        &self,
        type_name: &str,
        init: impl FnOnce(&Context, &Arc<StaticsHolder>) -> Result<()>,
    ) -> Result<Arc<StaticsHolder>> {
        let k = key(type_name);
        let existing = self.statics.get(&k).map(|holder| Arc::clone(holder.value()));
        if let Some(holder) = existing {
            return match holder.failure.get() {
                Some(err) => Err(err.clone()),
                None => Ok(holder),
            };
        }

        let holder = Arc::new(StaticsHolder::new(type_name));
        let published = Arc::clone(
            self.statics
                .entry(k)
                .or_insert_with(|| Arc::clone(&holder))
                .value(),
        );

        if Arc::ptr_eq(&published, &holder) {
            trace!("initializing context statics of {}", type_name);
            if let Err(err) = init(self, &holder) {
                warn!("context statics initializer for {} failed: {}", type_name, err);
                let _ = holder.failure.set(err.clone());
                return Err(err);
            }
        } else if let Some(err) = published.failure.get() {
            return Err(err.clone());
        }
        Ok(published)
    }

    pub fn has_statics(&self, type_name: &str) -> bool {
        self.statics.contains_key(&key(type_name))
    }

    pub fn echo(&self, text: &str) {
        self.output.lock().push_str(text);
    }

    pub fn output(&self) -> String {
        self.output.lock().clone()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(AppStatics::new())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("functions", &self.functions.len())
            .field("statics", &self.statics.len())
            .finish()
    }
}
