//! Reference interpreter for emitted bodies
//!
//! Executes a `CompilationOutput` the way the managed target would: one
//! frame per body, exception regions searched innermost first, `leave`
//! running the finally handlers it crosses. Method calls that reach a call
//! site go through the real runtime binder, so tests observe its caching.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;

use scriptc_codegen::features::codegen::{Instruction, MethodBody, MethodRef, RegionKind};
use scriptc_codegen::features::declarations::TypeEntry;
use scriptc_codegen::shared::models::{BinaryOp, ParamSig, ParamType, QualifiedName, UnaryOp};
use scriptc_codegen::CompilationOutput;
use scriptc_runtime::{
    ArrayValue, BinderOptions, CallSiteRegistry, Context, DispatchError, MethodInfo, Object,
    ParamInfo, Repr, RuntimeType, Value,
};

/// Value stored in an object field for a stored execution context
pub const CONTEXT_MARK: &str = "<context>";

type Exec<T> = Result<T, DispatchError>;

#[derive(Debug)]
struct Cursor {
    entries: Arc<ArrayValue>,
    position: Option<usize>,
}

impl Cursor {
    fn current(&self) -> Exec<&(Value, Value)> {
        self.position
            .and_then(|p| self.entries.entries().get(p))
            .ok_or_else(|| DispatchError::invocation("enumerator is not positioned on an entry"))
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Value(Value),
    Ctx,
    Enumerator(Rc<RefCell<Cursor>>),
}

impl Slot {
    fn into_value(self) -> Value {
        match self {
            Slot::Value(v) => v,
            Slot::Ctx => Value::string(CONTEXT_MARK),
            Slot::Enumerator(_) => Value::Null,
        }
    }
}

/// Pending completion of a finally handler
#[derive(Debug)]
enum Pending {
    Leave { target: usize, remaining: Vec<usize> },
    Rethrow(DispatchError),
}

enum Flow {
    Next,
    Jump(usize),
    Leave(usize),
    EndFinally,
    Return(Value),
}

/// A loaded program
pub struct Image {
    me: Weak<Image>,
    output: CompilationOutput,
    bodies: FxHashMap<String, usize>,
    types: OnceCell<FxHashMap<String, Arc<RuntimeType>>>,
    sites: CallSiteRegistry,
    app: Arc<scriptc_runtime::AppStatics>,
}

impl Image {
    pub fn load(output: CompilationOutput) -> Arc<Image> {
        Self::load_with(output, BinderOptions::default())
    }

    pub fn load_with(output: CompilationOutput, options: BinderOptions) -> Arc<Image> {
        let bodies = output
            .bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.key(), i))
            .collect();
        Arc::new_cyclic(|me| Image {
            me: me.clone(),
            output,
            bodies,
            types: OnceCell::new(),
            sites: CallSiteRegistry::new(options),
            app: scriptc_runtime::AppStatics::new(),
        })
    }

    pub fn output(&self) -> &CompilationOutput {
        &self.output
    }

    pub fn sites(&self) -> &CallSiteRegistry {
        &self.sites
    }

    /// Fresh context sharing this image's app-wide statics
    pub fn context(&self) -> Context {
        Context::new(Arc::clone(&self.app))
    }

    pub fn runtime_type(&self, name: &str) -> Option<Arc<RuntimeType>> {
        self.types().get(QualifiedName::new(name).key()).cloned()
    }

    /// Call global function `name` with its value arguments
    pub fn call(&self, ctx: &Context, name: &str, args: Vec<Value>) -> Exec<Value> {
        let body = self.body(&MethodRef::function(&QualifiedName::new(name)).key())?;
        let frame_args = frame_args(&body.params, args);
        self.run(ctx, body, None, frame_args)
    }

    /// Run body `ty::name` directly on `this`
    pub fn call_method(
        &self,
        ctx: &Context,
        ty: &str,
        name: &str,
        this: Value,
        args: Vec<Value>,
    ) -> Exec<Value> {
        let body = self.body(&MethodRef::method(&QualifiedName::new(ty), name).key())?;
        let frame_args = frame_args(&body.params, args);
        self.run(ctx, body, Some(this), frame_args)
    }

    /// `new ty(args)`
    pub fn construct(&self, ctx: &Context, ty: &str, args: Vec<Value>) -> Exec<Value> {
        let mut slots = vec![Slot::Ctx];
        slots.extend(args.into_iter().map(Slot::Value));
        self.new_object(ctx, &QualifiedName::new(ty), slots)
    }

    /// Register body `name` in `ctx` under its function name, as running the
    /// branch of a conditional declaration does
    pub fn declare(&self, ctx: &Context, name: &str) -> Exec<()> {
        let index = *self
            .bodies
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| DispatchError::invocation(format!("no body for {}", name)))?;
        let image = self
            .me
            .upgrade()
            .ok_or_else(|| DispatchError::invocation("image unloaded"))?;
        let function = self.output.bodies[index].name.name.clone();
        ctx.declare_function(&function, move |ctx, args| {
            let body = &image.output.bodies[index];
            image.run(ctx, body, None, frame_args(&body.params, args))
        })
    }

    fn body(&self, key: &str) -> Exec<&MethodBody> {
        self.bodies
            .get(key)
            .map(|&i| &self.output.bodies[i])
            .ok_or_else(|| DispatchError::invocation(format!("no body for {}", key)))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Runtime types
    // ═══════════════════════════════════════════════════════════════════

    fn types(&self) -> &FxHashMap<String, Arc<RuntimeType>> {
        self.types.get_or_init(|| {
            let mut built = FxHashMap::default();
            let table = Arc::clone(&self.output.table);
            for entry in table.types().filter(|t| !t.conditional) {
                self.build_type(entry, &mut built);
            }
            built
        })
    }

    fn build_type(
        &self,
        entry: &Arc<TypeEntry>,
        built: &mut FxHashMap<String, Arc<RuntimeType>>,
    ) -> Arc<RuntimeType> {
        if let Some(ty) = built.get(entry.name.key()) {
            return Arc::clone(ty);
        }

        let mut builder = RuntimeType::builder(entry.name.as_str());
        let base = entry
            .base
            .as_ref()
            .and_then(|b| self.output.table.type_entry(b.as_str()).cloned());
        if let Some(base) = base {
            builder = builder.base(self.build_type(&base, built));
        }

        for method in entry.methods.iter().filter(|m| !m.is_static) {
            let key = MethodRef::method(&entry.name, &method.name).key();
            let params = method.params.clone();
            let infos = params
                .iter()
                .map(|p| match &p.ty {
                    ParamType::Context => ParamInfo::context(),
                    ParamType::Value(hint) => ParamInfo::value(&p.name, hint.repr()),
                })
                .collect();
            let image = self.me.clone();
            builder = builder.method(MethodInfo::new(
                &method.name,
                infos,
                move |ctx, receiver, values| {
                    let image = image
                        .upgrade()
                        .ok_or_else(|| DispatchError::invocation("image unloaded"))?;
                    let body = image.body(&key)?;
                    image.run(ctx, body, Some(receiver.clone()), frame_args(&params, values))
                },
            ));
        }

        let ty = builder.build();
        built.insert(entry.name.key().to_string(), Arc::clone(&ty));
        ty
    }

    fn new_object(&self, ctx: &Context, ty: &QualifiedName, args: Vec<Slot>) -> Exec<Value> {
        let runtime_type = self
            .runtime_type(ty.as_str())
            .ok_or_else(|| DispatchError::invocation(format!("type {} is not loaded", ty)))?;
        let instance = Value::Object(Object::new(runtime_type));
        let ctor = self.body(&MethodRef::constructor(ty).key())?;
        self.run(ctx, ctor, Some(instance.clone()), args)?;
        Ok(instance)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════

    fn run(&self, ctx: &Context, body: &MethodBody, this: Option<Value>, mut args: Vec<Slot>) -> Exec<Value> {
        let mut locals = vec![Slot::Value(Value::Null); body.locals.len()];
        let mut stack: Vec<Slot> = Vec::with_capacity(body.max_stack);
        let mut pending: Vec<Pending> = Vec::new();
        let mut pc = 0;

        loop {
            let instruction = body.instructions.get(pc).ok_or_else(|| {
                DispatchError::invocation(format!("{} ran past its last instruction", body.name))
            })?;
            let flow = self.step(ctx, instruction, &this, &mut args, &mut locals, &mut stack);

            pc = match flow {
                Ok(Flow::Next) => pc + 1,
                Ok(Flow::Jump(target)) => target,
                Ok(Flow::Return(value)) => return Ok(value),
                Ok(Flow::Leave(target)) => {
                    stack.clear();
                    let mut finallies: Vec<usize> = body
                        .regions
                        .iter()
                        .filter(|r| r.kind == RegionKind::Finally)
                        .filter(|r| r.protects(pc) && !r.protects(target))
                        .map(|r| r.handler_start)
                        .collect();
                    if finallies.is_empty() {
                        target
                    } else {
                        let first = finallies.remove(0);
                        pending.push(Pending::Leave {
                            target,
                            remaining: finallies,
                        });
                        first
                    }
                }
                Ok(Flow::EndFinally) => match pending.pop() {
                    Some(Pending::Leave {
                        target,
                        mut remaining,
                    }) => {
                        if remaining.is_empty() {
                            target
                        } else {
                            let next = remaining.remove(0);
                            pending.push(Pending::Leave { target, remaining });
                            next
                        }
                    }
                    Some(Pending::Rethrow(err)) => unwind(body, pc, err, &mut stack, &mut pending)?,
                    None => {
                        return Err(DispatchError::invocation("endfinally outside a finally handler"))
                    }
                },
                Err(err) => unwind(body, pc, err, &mut stack, &mut pending)?,
            };
        }
    }

    fn step(
        &self,
        ctx: &Context,
        instruction: &Instruction,
        this: &Option<Value>,
        args: &mut Vec<Slot>,
        locals: &mut [Slot],
        stack: &mut Vec<Slot>,
    ) -> Exec<Flow> {
        use Instruction::*;

        match instruction {
            Nop => {}
            LdNull => push(stack, Value::Null),
            LdBool(b) => push(stack, Value::Bool(*b)),
            LdLong(n) => push(stack, Value::Long(*n)),
            LdDouble(d) => push(stack, Value::Double(*d)),
            LdStr(s) => push(stack, Value::string(s)),
            LdCtx => stack.push(Slot::Ctx),
            LdThis => {
                let this = this
                    .clone()
                    .ok_or_else(|| DispatchError::invocation("no receiver in a static body"))?;
                push(stack, this);
            }
            LdArg(i) => stack.push(args.get(*i as usize).cloned().unwrap_or(Slot::Value(Value::Null))),
            StArg(i) => {
                let value = pop(stack)?;
                let i = *i as usize;
                if args.len() <= i {
                    args.resize(i + 1, Slot::Value(Value::Null));
                }
                args[i] = value;
            }
            LdLoc(id) => stack.push(locals[id.index()].clone()),
            StLoc(id) => locals[id.index()] = pop(stack)?,
            Dup => {
                let top = stack
                    .last()
                    .cloned()
                    .ok_or_else(|| DispatchError::invocation("dup on an empty stack"))?;
                stack.push(top);
            }
            Pop => {
                pop(stack)?;
            }
            Binary(op) => {
                let right = pop_value(stack)?;
                let left = pop_value(stack)?;
                push(stack, binary(*op, &left, &right));
            }
            Unary(op) => {
                let operand = pop_value(stack)?;
                push(
                    stack,
                    match op {
                        UnaryOp::Not => Value::Bool(!operand.truthy()),
                        UnaryOp::Neg => binary(BinaryOp::Sub, &Value::Long(0), &operand),
                    },
                );
            }
            NewArray { len, keyed } => {
                let count = if *keyed { len * 2 } else { *len };
                let items = pop_n(stack, count)?;
                let mut entries = Vec::with_capacity(*len);
                let mut next_index = 0;
                let mut add = |key: Value, value: Value, entries: &mut Vec<(Value, Value)>| {
                    let key = match key {
                        Value::Null => Value::Long(next_index),
                        other => other,
                    };
                    if let Value::Long(n) = key {
                        next_index = next_index.max(n + 1);
                    }
                    entries.push((key, value));
                };
                if *keyed {
                    let mut items = items.into_iter().map(Slot::into_value);
                    while let (Some(k), Some(v)) = (items.next(), items.next()) {
                        add(k, v, &mut entries);
                    }
                } else {
                    for v in items {
                        add(Value::Null, v.into_value(), &mut entries);
                    }
                }
                push(stack, Value::array(entries));
            }
            IsInstance(ty) => {
                let value = pop_value(stack)?;
                let is = value
                    .as_object()
                    .is_some_and(|o| o.runtime_type().is_subtype_of(ty.as_str()));
                push(stack, Value::Bool(is));
            }
            IsExactType(ty) => {
                let value = pop_value(stack)?;
                let is = value.as_object().is_some_and(|o| ty.is(o.runtime_type().name()));
                push(stack, Value::Bool(is));
            }
            LdFld(name) => {
                let receiver = pop_value(stack)?;
                let object = receiver.as_object().ok_or_else(|| {
                    DispatchError::invocation(format!("read of ->{} on {}", name, receiver.kind_name()))
                })?;
                push(stack, object.field(name));
            }
            StFld(name) => {
                let value = pop(stack)?.into_value();
                let receiver = pop_value(stack)?;
                let object = receiver.as_object().ok_or_else(|| {
                    DispatchError::invocation(format!("write of ->{} on {}", name, receiver.kind_name()))
                })?;
                object.set_field(name, value);
            }
            LdSFld { ty, field } => {
                self.ensure_type_initialized(ctx, ty)?;
                push(stack, self.app.get(ty.as_str(), field));
            }
            StSFld { ty, field } => {
                let value = pop_value(stack)?;
                self.ensure_type_initialized(ctx, ty)?;
                self.app.set(ty.as_str(), field, value);
            }
            LdCtxSFld { ty, field } => {
                pop(stack)?;
                let holder = self.context_statics(ctx, ty)?;
                push(stack, holder.get(field));
            }
            StCtxSFld { ty, field } => {
                let value = pop_value(stack)?;
                pop(stack)?;
                let holder = self.context_statics(ctx, ty)?;
                holder.set(field, value);
            }
            Call {
                method,
                argc,
                instance,
            } => {
                let call_args = pop_n(stack, argc + 1)?;
                let receiver = if *instance { Some(pop_value(stack)?) } else { None };
                let body = self.body(&method.key())?;
                let result = self.run(ctx, body, receiver, call_args)?;
                push(stack, result);
            }
            CallGlobal { name, argc } => {
                let values = pop_n(stack, *argc)?.into_iter().map(Slot::into_value).collect();
                pop(stack)?;
                let result = ctx.call_function(name.as_str(), values)?;
                push(stack, result);
            }
            CallSite(descriptor) => {
                let pushed = pop_n(stack, descriptor.pushed_arg_count())?
                    .into_iter()
                    .map(Slot::into_value)
                    .collect();
                pop(stack)?;
                let receiver = pop_value(stack)?;
                let site = self.sites.site(descriptor);
                let args = site.flatten_args(pushed)?;
                let result = site.invoke(ctx, &receiver, &args)?;
                push(stack, result);
            }
            NewObj { ty, argc } => {
                let call_args = pop_n(stack, argc + 1)?;
                let instance = self.new_object(ctx, ty, call_args)?;
                push(stack, instance);
            }
            Echo => {
                let value = pop_value(stack)?;
                pop(stack)?;
                ctx.echo(&value.to_string());
            }
            GetEnumerator => {
                let value = pop_value(stack)?;
                let entries = value.as_array().cloned().ok_or_else(|| {
                    DispatchError::invocation(format!("foreach over {}", value.kind_name()))
                })?;
                stack.push(Slot::Enumerator(Rc::new(RefCell::new(Cursor {
                    entries,
                    position: None,
                }))));
            }
            EnumMoveNext => {
                let cursor = pop_enumerator(stack)?;
                let mut cursor = cursor.borrow_mut();
                let next = cursor.position.map_or(0, |p| p + 1);
                cursor.position = Some(next);
                push(stack, Value::Bool(next < cursor.entries.len()));
            }
            EnumKey => {
                let cursor = pop_enumerator(stack)?;
                let key = cursor.borrow().current()?.0.clone();
                push(stack, key);
            }
            EnumValue => {
                let cursor = pop_enumerator(stack)?;
                let value = cursor.borrow().current()?.1.clone();
                push(stack, value);
            }
            Br(target) => return Ok(Flow::Jump(*target)),
            BrTrue(target) => {
                if pop_value(stack)?.truthy() {
                    return Ok(Flow::Jump(*target));
                }
            }
            BrFalse(target) => {
                if !pop_value(stack)?.truthy() {
                    return Ok(Flow::Jump(*target));
                }
            }
            Leave(target) => return Ok(Flow::Leave(*target)),
            EndFinally => return Ok(Flow::EndFinally),
            Throw => return Err(DispatchError::thrown(pop_value(stack)?)),
            Ret => return Ok(Flow::Return(pop(stack)?.into_value())),
            DebugAssertNotNull => {
                if matches!(stack.last(), Some(Slot::Value(Value::Null)) | None) {
                    return Err(DispatchError::invocation("debug assertion: value is null"));
                }
            }
        }
        Ok(Flow::Next)
    }

    fn ensure_type_initialized(&self, ctx: &Context, ty: &QualifiedName) -> Exec<()> {
        let key = MethodRef::method(ty, MethodRef::TYPE_INITIALIZER).key();
        self.app.ensure_initialized(ty.as_str(), || match self.bodies.get(&key) {
            Some(_) => self.run(ctx, self.body(&key)?, None, Vec::new()).map(|_| ()),
            None => Ok(()),
        })
    }

    fn context_statics(
        &self,
        ctx: &Context,
        ty: &QualifiedName,
    ) -> Exec<Arc<scriptc_runtime::StaticsHolder>> {
        let key = MethodRef::method(ty, MethodRef::STATICS_INITIALIZER).key();
        ctx.statics(ty.as_str(), |ctx, _| match self.bodies.get(&key) {
            Some(_) => self.run(ctx, self.body(&key)?, None, vec![Slot::Ctx]).map(|_| ()),
            None => Ok(()),
        })
    }
}

/// Handler offset for `err` raised at `pc`, or the error when no region takes it
fn unwind(
    body: &MethodBody,
    pc: usize,
    err: DispatchError,
    stack: &mut Vec<Slot>,
    pending: &mut Vec<Pending>,
) -> Exec<usize> {
    let value = match &err {
        DispatchError::Thrown { value, .. } => value.clone(),
        _ => return Err(err),
    };

    for region in body.regions.iter().filter(|r| r.protects(pc)) {
        match &region.kind {
            RegionKind::Catch(ty) if catches(ty, &value) => {
                stack.clear();
                stack.push(Slot::Value(value));
                return Ok(region.handler_start);
            }
            RegionKind::Catch(_) => {}
            RegionKind::Finally => {
                stack.clear();
                pending.push(Pending::Rethrow(err));
                return Ok(region.handler_start);
            }
        }
    }
    Err(err)
}

fn catches(ty: &QualifiedName, value: &Value) -> bool {
    ty.is("Exception")
        || value
            .as_object()
            .is_some_and(|o| o.runtime_type().is_subtype_of(ty.as_str()))
}

/// Frame arguments: the context in slot 0, then one slot per parameter
fn frame_args(params: &[ParamSig], values: Vec<Value>) -> Vec<Slot> {
    let mut values = values.into_iter();
    let mut slots = vec![Slot::Ctx];
    for param in params {
        slots.push(match param.ty {
            ParamType::Context => Slot::Ctx,
            ParamType::Value(_) => Slot::Value(values.next().unwrap_or_default()),
        });
    }
    slots
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => match (left, right) {
            (Value::Long(a), Value::Long(b)) => Value::Long(match op {
                BinaryOp::Add => a.wrapping_add(*b),
                BinaryOp::Sub => a.wrapping_sub(*b),
                _ => a.wrapping_mul(*b),
            }),
            _ => {
                let a = number(left);
                let b = number(right);
                Value::Double(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    _ => a * b,
                })
            }
        },
        BinaryOp::Concat => Value::string(format!("{}{}", left, right)),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::Lt => Value::Bool(number(left) < number(right)),
        BinaryOp::Gt => Value::Bool(number(left) > number(right)),
        BinaryOp::Identical => Value::Bool(left == right),
        BinaryOp::And => Value::Bool(left.truthy() && right.truthy()),
        BinaryOp::Or => Value::Bool(left.truthy() || right.truthy()),
    }
}

fn number(value: &Value) -> f64 {
    match value.convert_to(Repr::Double) {
        Some(Value::Double(d)) => d,
        _ => 0.0,
    }
}

fn push(stack: &mut Vec<Slot>, value: Value) {
    stack.push(Slot::Value(value));
}

fn pop(stack: &mut Vec<Slot>) -> Exec<Slot> {
    stack
        .pop()
        .ok_or_else(|| DispatchError::invocation("stack underflow"))
}

fn pop_value(stack: &mut Vec<Slot>) -> Exec<Value> {
    pop(stack).map(Slot::into_value)
}

fn pop_n(stack: &mut Vec<Slot>, n: usize) -> Exec<Vec<Slot>> {
    if stack.len() < n {
        return Err(DispatchError::invocation("stack underflow"));
    }
    Ok(stack.split_off(stack.len() - n))
}

fn pop_enumerator(stack: &mut Vec<Slot>) -> Exec<Rc<RefCell<Cursor>>> {
    match pop(stack)? {
        Slot::Enumerator(cursor) => Ok(cursor),
        _ => Err(DispatchError::invocation("expected an enumerator")),
    }
}
