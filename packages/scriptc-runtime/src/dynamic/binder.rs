//! Dynamic call-site binder
//!
//! Resolves a late-bound method call against the receiver's concrete runtime
//! type and caches the resulting binding under a type guard, so that later
//! invocations of the same site with the same type skip the lookup.
//!
//! Cache layout: a fixed array of one-shot slots (polymorphic inline cache).
//! A slot holds a guard together with its outcome and is published with a
//! single `OnceCell::set`, so a reader can never observe a guard paired with
//! another type's binding. Readers take no lock. Writers serialize on a
//! writer-only mutex and re-check the cache before resolving. Once every slot
//! is used the site is megamorphic: later misses replace a single
//! most-recent entry instead, so a site that settles on one type after a
//! polymorphic warm-up resolves that type once.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::call_site::{ArgShape, CallSiteDescriptor, CallSiteId, NameStrategy};
use crate::context::Context;
use crate::error::{DispatchError, Result};
use crate::types::{MethodInfo, ParamKind, RuntimeType, RuntimeTypeId};
use crate::value::{Repr, Value};

/// Binder tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinderOptions {
    /// Guarded bindings kept per site before it turns megamorphic
    pub max_polymorphism: usize,
}

impl Default for BinderOptions {
    fn default() -> Self {
        Self { max_polymorphism: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Guard {
    receiver: RuntimeTypeId,
    /// Lowercased name, only for computed-name sites
    name: Option<String>,
    argc: usize,
}

#[derive(Debug, Clone, Copy)]
enum ArgBinding {
    Context,
    Supplied { index: usize, repr: Repr },
}

/// Method resolved for one guard, with its argument plan
#[derive(Debug)]
pub struct Binding {
    method: Arc<MethodInfo>,
    plan: Vec<ArgBinding>,
}

impl Binding {
    pub fn method(&self) -> &Arc<MethodInfo> {
        &self.method
    }

    fn invoke(&self, ctx: &Context, receiver: &Value, supplied: &[Value]) -> Result<Value> {
        let mut values = Vec::with_capacity(self.plan.len());
        for (position, arg) in self.plan.iter().enumerate() {
            // Context formals are satisfied by `ctx` itself.
            let ArgBinding::Supplied { index, repr } = *arg else {
                continue;
            };
            let value = &supplied[index];
            let converted = value
                .convert_to(repr)
                .ok_or_else(|| DispatchError::ArgumentConversion {
                    method: self.method.name().to_string(),
                    position: position + 1,
                    expected: repr,
                    found: value.kind_name(),
                })?;
            values.push(converted);
        }
        self.method.invoke(ctx, receiver, values)
    }
}

struct CacheEntry {
    guard: Guard,
    outcome: Result<Arc<Binding>>,
}

/// Shared state of one static call site
pub struct CallSite {
    descriptor: CallSiteDescriptor,
    entries: Box<[OnceCell<CacheEntry>]>,
    published: AtomicUsize,
    megamorphic: AtomicBool,
    /// Most recent binding once the slots are exhausted, replaced whole
    recent: RwLock<Option<Arc<CacheEntry>>>,
    writer: Mutex<()>,
    resolutions: AtomicUsize,
}

impl CallSite {
    pub fn new(descriptor: CallSiteDescriptor, options: BinderOptions) -> Self {
        let entries = (0..options.max_polymorphism)
            .map(|_| OnceCell::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            descriptor,
            entries,
            published: AtomicUsize::new(0),
            megamorphic: AtomicBool::new(false),
            recent: RwLock::new(None),
            writer: Mutex::new(()),
            resolutions: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> CallSiteId {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &CallSiteDescriptor {
        &self.descriptor
    }

    /// Number of member resolutions performed (cache misses)
    pub fn resolution_count(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    /// Number of guarded bindings published in the polymorphic slots
    pub fn cached_bindings(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }

    pub fn is_megamorphic(&self) -> bool {
        self.megamorphic.load(Ordering::Acquire)
    }

    /// Spread `Unpack` arguments into a flat argument list
    pub fn flatten_args(&self, pushed: Vec<Value>) -> Result<Vec<Value>> {
        if !self.descriptor.args.contains(&ArgShape::Unpack) {
            return Ok(pushed);
        }

        let mut flat = Vec::with_capacity(pushed.len());
        for (value, shape) in pushed.into_iter().zip(self.descriptor.args.iter()) {
            match shape {
                ArgShape::Value => flat.push(value),
                ArgShape::Unpack => {
                    let arr = value.as_array().ok_or_else(|| {
                        DispatchError::invocation(format!(
                            "only arrays can be unpacked, {} given",
                            value.kind_name()
                        ))
                    })?;
                    flat.extend(arr.values().cloned());
                }
            }
        }
        Ok(flat)
    }

    /// Invoke the site: resolve (or reuse) the binding for the receiver's
    /// concrete type and call it with the ambient context.
    pub fn invoke(&self, ctx: &Context, receiver: &Value, args: &[Value]) -> Result<Value> {
        let object = match receiver {
            Value::Object(obj) => obj,
            Value::Null => {
                return Err(DispatchError::NullReceiver {
                    site: self.id(),
                    method: self.descriptor.display_name().to_string(),
                })
            }
            other => {
                return Err(DispatchError::UnresolvableMember {
                    type_name: other.kind_name().to_string(),
                    method: self.descriptor.display_name().to_string(),
                })
            }
        };

        let (name, supplied) = self.split_name(args)?;
        let guard = Guard {
            receiver: object.runtime_type().id(),
            name: match self.descriptor.strategy {
                NameStrategy::Computed => Some(name.to_ascii_lowercase()),
                _ => None,
            },
            argc: supplied.len(),
        };

        let binding = match self.lookup(&guard) {
            Some(outcome) => outcome?,
            None => self.rebind(guard, object.runtime_type(), &name)?,
        };
        binding.invoke(ctx, receiver, supplied)
    }

    fn split_name<'a>(&'a self, args: &'a [Value]) -> Result<(Cow<'a, str>, &'a [Value])> {
        match &self.descriptor.strategy {
            NameStrategy::Direct(name) => Ok((Cow::Borrowed(name.as_str()), args)),
            NameStrategy::Magic(magic) => Ok((Cow::Borrowed(magic.method_name()), args)),
            NameStrategy::Computed => match args.split_first() {
                Some((Value::String(name), rest)) => Ok((Cow::Owned(name.to_string()), rest)),
                Some((other, _)) => Err(DispatchError::InvalidMethodName {
                    found: other.kind_name(),
                }),
                None => Err(DispatchError::InvalidMethodName { found: "null" }),
            },
        }
    }

    fn lookup(&self, guard: &Guard) -> Option<Result<Arc<Binding>>> {
        let published = self.published.load(Ordering::Acquire);
        let cached = self.entries[..published]
            .iter()
            .filter_map(OnceCell::get)
            .find(|entry| entry.guard == *guard)
            .map(|entry| entry.outcome.clone());
        if cached.is_some() || !self.is_megamorphic() {
            return cached;
        }

        self.recent
            .read()
            .as_ref()
            .filter(|entry| entry.guard == *guard)
            .map(|entry| entry.outcome.clone())
    }

    fn rebind(&self, guard: Guard, ty: &RuntimeType, name: &str) -> Result<Arc<Binding>> {
        let _writer = self.writer.lock();
        if let Some(outcome) = self.lookup(&guard) {
            return outcome;
        }

        let outcome = resolve(ty, name, guard.argc);
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        debug!(
            "call site {} bound {}::{} ({})",
            self.id(),
            ty.name(),
            name,
            if outcome.is_ok() { "ok" } else { "failed" }
        );

        let entry = CacheEntry {
            guard,
            outcome: outcome.clone(),
        };
        let slot = self.published.load(Ordering::Relaxed);
        if slot < self.entries.len() {
            // Slot index is only ever claimed under the writer lock.
            if self.entries[slot].set(entry).is_ok() {
                self.published.store(slot + 1, Ordering::Release);
            }
        } else {
            *self.recent.write() = Some(Arc::new(entry));
            if !self.megamorphic.swap(true, Ordering::AcqRel) {
                warn!(
                    "call site {} turned megamorphic after {} bindings",
                    self.id(),
                    self.entries.len()
                );
            }
        }
        outcome
    }
}

impl std::fmt::Debug for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSite")
            .field("descriptor", &self.descriptor)
            .field("cached_bindings", &self.cached_bindings())
            .field("megamorphic", &self.is_megamorphic())
            .field("resolutions", &self.resolution_count())
            .finish()
    }
}

/// Late-bound member resolution against the concrete runtime type
fn resolve(ty: &RuntimeType, name: &str, argc: usize) -> Result<Arc<Binding>> {
    let method = ty
        .find_method(name)
        .ok_or_else(|| DispatchError::UnresolvableMember {
            type_name: ty.name().to_string(),
            method: name.to_string(),
        })?;

    let mut plan = Vec::with_capacity(method.params().len());
    let mut next = 0;
    for param in method.params() {
        match param.kind {
            ParamKind::Context => plan.push(ArgBinding::Context),
            ParamKind::Value(repr) => {
                if next >= argc {
                    return Err(DispatchError::SignatureMismatch {
                        method: format!("{}::{}", method.declaring_type(), method.name()),
                        supplied: argc,
                        required: method.value_param_count(),
                    });
                }
                plan.push(ArgBinding::Supplied { index: next, repr });
                next += 1;
            }
        }
    }

    Ok(Arc::new(Binding { method, plan }))
}
