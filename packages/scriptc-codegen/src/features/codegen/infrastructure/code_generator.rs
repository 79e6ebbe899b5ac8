//! Expression and statement lowering
//!
//! `CodeGenerator` owns the instruction builder of one body and lowers bound
//! trees into it. Calls are bound here: declared functions and methods on a
//! proven receiver type become direct calls, conditional functions go through
//! the context's registry, and every other method call gets a call site.

use scriptc_runtime::{ArgShape, CallSiteDescriptor, NameStrategy};
use tracing::trace;

use super::call_sites::CallSiteIds;
use super::il_builder::{Assembled, BranchKind, IlBuilder};
use crate::config::CodegenConfig;
use crate::errors::{CodegenError, Result, SlotKind};
use crate::features::codegen::domain::{Instruction, MethodRef};
use crate::features::declarations::DeclarationTable;
use crate::shared::models::{
    Argument, BinaryOp, BoundExpr, BoundStmt, FieldDecl, Literal, MethodName, ParamSig,
    ParamType, QualifiedName, StmtKind,
};

/// Compilation-wide inputs shared by every body
#[derive(Debug, Clone, Copy)]
pub struct CodegenEnv<'a> {
    pub table: &'a DeclarationTable,
    pub config: &'a CodegenConfig,
    pub sites: &'a CallSiteIds,
}

#[derive(Debug)]
pub struct CodeGenerator<'a> {
    pub(crate) env: CodegenEnv<'a>,
    pub(crate) il: IlBuilder,
    params: Vec<ParamSig>,
    is_static: bool,
    has_context: bool,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        env: CodegenEnv<'a>,
        routine: impl Into<String>,
        params: Vec<ParamSig>,
        is_static: bool,
        has_context: bool,
    ) -> Self {
        Self {
            env,
            il: IlBuilder::new(routine),
            params,
            is_static,
            has_context,
        }
    }

    pub fn routine(&self) -> &str {
        self.il.routine()
    }

    pub fn params(&self) -> &[ParamSig] {
        &self.params
    }

    pub fn finish(self) -> Result<Assembled> {
        self.il.finish(self.env.config.max_locals)
    }

    pub(crate) fn invariant(&self, message: impl Into<String>) -> CodegenError {
        CodegenError::invariant(self.routine(), message)
    }

    pub fn emit(&mut self, instruction: Instruction) {
        self.il.emit(instruction);
    }

    pub fn emit_ctx(&mut self) -> Result<()> {
        if !self.has_context {
            return Err(self.invariant("execution context is not available in this body"));
        }
        self.il.emit(Instruction::LdCtx);
        Ok(())
    }

    pub fn emit_this(&mut self) -> Result<()> {
        if self.is_static {
            return Err(self.invariant("`this` used in a static body"));
        }
        self.il.emit(Instruction::LdThis);
        Ok(())
    }

    pub fn emit_literal(&mut self, literal: &Literal) {
        self.il.emit(match literal {
            Literal::Null => Instruction::LdNull,
            Literal::Bool(b) => Instruction::LdBool(*b),
            Literal::Long(n) => Instruction::LdLong(*n),
            Literal::Double(d) => Instruction::LdDouble(*d),
            Literal::String(s) => Instruction::LdStr(s.clone()),
        });
    }

    // ═══════════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════════

    pub fn emit_statement(&mut self, stmt: &BoundStmt) -> Result<()> {
        if self.env.config.emit_sequence_points {
            if let Some(span) = stmt.span {
                self.il.sequence_point(span);
            }
        }

        match &stmt.kind {
            StmtKind::Expr(expr) => self.emit_effect(expr),
            StmtKind::Echo(expr) => {
                self.emit_ctx()?;
                self.emit_value(expr)?;
                self.il.emit(Instruction::Echo);
                Ok(())
            }
            StmtKind::Return(expr) => {
                match expr {
                    Some(expr) => self.emit_value(expr)?,
                    None => self.il.emit(Instruction::LdNull),
                }
                let slot = self.il.locals.return_slot();
                self.il.emit(Instruction::StLoc(slot));
                Ok(())
            }
            StmtKind::Throw(expr) => {
                self.emit_value(expr)?;
                self.il.emit(Instruction::Throw);
                Ok(())
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════

    /// Evaluate `expr` leaving its value on the stack
    pub fn emit_value(&mut self, expr: &BoundExpr) -> Result<()> {
        match expr {
            BoundExpr::Literal(lit) => {
                self.emit_literal(lit);
                Ok(())
            }
            BoundExpr::Variable(name) => self.load_variable(name),
            BoundExpr::Assign { target, value } => {
                self.emit_value(value)?;
                self.il.emit(Instruction::Dup);
                self.store_variable(target)
            }
            BoundExpr::Binary { op, left, right } => match op {
                BinaryOp::And | BinaryOp::Or => self.emit_logical(*op, left, right),
                _ => {
                    self.emit_value(left)?;
                    self.emit_value(right)?;
                    self.il.emit(Instruction::Binary(*op));
                    Ok(())
                }
            },
            BoundExpr::Unary { op, operand } => {
                self.emit_value(operand)?;
                self.il.emit(Instruction::Unary(*op));
                Ok(())
            }
            BoundExpr::Call { function, args } => self.emit_call(function, args),
            BoundExpr::MethodCall {
                receiver,
                name,
                args,
                receiver_type,
            } => self.emit_method_call(receiver, name, args, receiver_type.as_ref()),
            BoundExpr::New { ty, args } => self.emit_new(ty, args),
            BoundExpr::This => self.emit_this(),
            BoundExpr::FieldLoad { receiver, field } => {
                self.emit_value(receiver)?;
                self.il.emit(Instruction::LdFld(field.clone()));
                Ok(())
            }
            BoundExpr::FieldStore {
                receiver,
                field,
                value,
            } => {
                self.emit_value(receiver)?;
                self.emit_value(value)?;
                let tmp = self.il.locals.temp();
                self.il.emit(Instruction::StLoc(tmp));
                self.il.emit(Instruction::LdLoc(tmp));
                self.il.emit(Instruction::StFld(field.clone()));
                self.il.emit(Instruction::LdLoc(tmp));
                self.il.locals.release(tmp);
                Ok(())
            }
            BoundExpr::StaticFieldLoad { ty, field } => self.emit_static_load(ty, field),
            BoundExpr::StaticFieldStore { ty, field, value } => {
                self.emit_static_store(ty, field, value, true)
            }
            BoundExpr::Array(items) => {
                let keyed = items.iter().any(|(key, _)| key.is_some());
                for (key, value) in items {
                    if keyed {
                        match key {
                            Some(key) => self.emit_value(key)?,
                            None => self.il.emit(Instruction::LdNull),
                        }
                    }
                    self.emit_value(value)?;
                }
                self.il.emit(Instruction::NewArray {
                    len: items.len(),
                    keyed,
                });
                Ok(())
            }
            BoundExpr::InstanceOf { value, ty } => {
                self.emit_value(value)?;
                self.il.emit(Instruction::IsInstance(ty.clone()));
                Ok(())
            }
        }
    }

    /// Evaluate `expr` for its side effects only
    pub fn emit_effect(&mut self, expr: &BoundExpr) -> Result<()> {
        match expr {
            BoundExpr::Assign { target, value } => {
                self.emit_value(value)?;
                self.store_variable(target)
            }
            BoundExpr::FieldStore {
                receiver,
                field,
                value,
            } => {
                self.emit_value(receiver)?;
                self.emit_value(value)?;
                self.il.emit(Instruction::StFld(field.clone()));
                Ok(())
            }
            BoundExpr::StaticFieldStore { ty, field, value } => {
                self.emit_static_store(ty, field, value, false)
            }
            _ => {
                self.emit_value(expr)?;
                self.il.emit(Instruction::Pop);
                Ok(())
            }
        }
    }

    fn emit_logical(&mut self, op: BinaryOp, left: &BoundExpr, right: &BoundExpr) -> Result<()> {
        // Short-circuit: the deciding operand jumps straight to the result
        let (test, decided) = match op {
            BinaryOp::And => (BranchKind::IfFalse, false),
            _ => (BranchKind::IfTrue, true),
        };
        let short = self.il.define_label();
        let end = self.il.define_label();

        self.emit_value(left)?;
        self.il.branch(test, short);
        self.emit_value(right)?;
        self.il.branch(test, short);
        self.il.emit(Instruction::LdBool(!decided));
        self.il.branch(BranchKind::Always, end);
        self.il.mark_label(short);
        self.il.emit(Instruction::LdBool(decided));
        self.il.mark_label(end);
        Ok(())
    }

    fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    pub fn load_variable(&mut self, name: &str) -> Result<()> {
        match self.param_index(name) {
            Some(i) if self.params[i].is_context() => self.emit_ctx(),
            Some(i) => {
                let slot = arg_slot(self.routine(), i)?;
                self.il.emit(Instruction::LdArg(slot));
                Ok(())
            }
            None => {
                let slot = self.il.locals.variable(name);
                self.il.emit(Instruction::LdLoc(slot));
                Ok(())
            }
        }
    }

    /// Pop the top of stack into variable `name`
    pub fn store_variable(&mut self, name: &str) -> Result<()> {
        match self.param_index(name) {
            Some(i) if self.params[i].is_context() => {
                Err(self.invariant(format!("assignment to context parameter '{}'", name)))
            }
            Some(i) => {
                let slot = arg_slot(self.routine(), i)?;
                self.il.emit(Instruction::StArg(slot));
                Ok(())
            }
            None => {
                let slot = self.il.locals.variable(name);
                self.il.emit(Instruction::StLoc(slot));
                Ok(())
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Calls
    // ═══════════════════════════════════════════════════════════════════

    /// Push one value per callee parameter: the context for context
    /// parameters, the next supplied argument or the declared default for
    /// the others. Surplus arguments are still evaluated.
    pub fn emit_arguments<'e>(
        &mut self,
        params: &[ParamSig],
        supplied: impl IntoIterator<Item = &'e BoundExpr>,
        callee: &str,
    ) -> Result<usize> {
        let mut supplied = supplied.into_iter();
        for param in params {
            match &param.ty {
                ParamType::Context => self.emit_ctx()?,
                ParamType::Value(_) => match (supplied.next(), &param.default) {
                    (Some(arg), _) => self.emit_value(arg)?,
                    (None, Some(default)) => self.emit_literal(default),
                    (None, None) => {
                        return Err(CodegenError::signature(
                            self.routine(),
                            format!("{}() requires an argument for '{}'", callee, param.name),
                        ))
                    }
                },
            }
        }
        for extra in supplied {
            self.emit_effect(extra)?;
        }
        Ok(params.len())
    }

    fn emit_call(&mut self, function: &QualifiedName, args: &[BoundExpr]) -> Result<()> {
        let table = self.env.table;
        match table.function(function.as_str()) {
            Some(entry) => {
                self.emit_ctx()?;
                let argc = self.emit_arguments(&entry.routine.params, args, entry.name.as_str())?;
                self.il.emit(Instruction::Call {
                    method: MethodRef::function(&entry.name),
                    argc,
                    instance: false,
                });
            }
            None => {
                trace!("{}: {}() bound through the function registry", self.routine(), function);
                self.emit_ctx()?;
                for arg in args {
                    self.emit_value(arg)?;
                }
                self.il.emit(Instruction::CallGlobal {
                    name: function.clone(),
                    argc: args.len(),
                });
            }
        }
        Ok(())
    }

    fn emit_method_call(
        &mut self,
        receiver: &BoundExpr,
        name: &MethodName,
        args: &[Argument],
        receiver_type: Option<&QualifiedName>,
    ) -> Result<()> {
        let table = self.env.table;
        if let (MethodName::Direct(method), Some(ty)) = (name, receiver_type) {
            let resolved = table
                .resolve_method(ty.as_str(), method)
                .filter(|(_, target)| !target.is_static);
            if let Some((decl, target)) = resolved.filter(|_| args.iter().all(|a| !a.unpack)) {
                self.emit_value(receiver)?;
                self.emit_ctx()?;
                let argc = self.emit_arguments(
                    &target.params,
                    args.iter().map(|a| &a.value),
                    &target.display_name(),
                )?;
                self.il.emit(Instruction::Call {
                    method: MethodRef::method(&decl.name, &target.name),
                    argc,
                    instance: true,
                });
                return Ok(());
            }
        }

        self.emit_value(receiver)?;
        self.emit_ctx()?;
        let mut shapes = Vec::with_capacity(args.len() + 1);
        let strategy = match name {
            MethodName::Direct(method) => NameStrategy::Direct(method.clone()),
            MethodName::Computed(expr) => {
                self.emit_value(expr)?;
                shapes.push(ArgShape::Value);
                NameStrategy::Computed
            }
        };
        for arg in args {
            self.emit_value(&arg.value)?;
            shapes.push(if arg.unpack {
                ArgShape::Unpack
            } else {
                ArgShape::Value
            });
        }

        let descriptor = CallSiteDescriptor::new(self.env.sites.next(), strategy, shapes);
        trace!(
            "{}: call site {} for ->{}()",
            self.routine(),
            descriptor.id,
            descriptor.display_name()
        );
        self.il.emit(Instruction::CallSite(descriptor));
        Ok(())
    }

    fn emit_new(&mut self, ty: &QualifiedName, args: &[BoundExpr]) -> Result<()> {
        let table = self.env.table;
        if let Some(entry) = table.type_entry(ty.as_str()) {
            self.emit_ctx()?;
            let argc = match table.resolve_initializer(entry) {
                Some((_, init)) => self.emit_arguments(&init.params, args, &init.display_name())?,
                None => {
                    for arg in args {
                        self.emit_effect(arg)?;
                    }
                    0
                }
            };
            self.il.emit(Instruction::NewObj {
                ty: entry.name.clone(),
                argc,
            });
            return Ok(());
        }

        if !table.declares_type(ty.as_str()) {
            return Err(CodegenError::UnresolvedType {
                routine: self.routine().to_string(),
                name: ty.to_string(),
            });
        }

        // Conditionally declared: the constructor signature is only known at run time
        self.emit_ctx()?;
        for arg in args {
            self.emit_value(arg)?;
        }
        self.il.emit(Instruction::NewObj {
            ty: ty.clone(),
            argc: args.len(),
        });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Static fields
    // ═══════════════════════════════════════════════════════════════════

    /// Declaring type of the static field and whether it is context-bound
    fn resolve_static(&self, ty: &QualifiedName, field: &str) -> Result<(QualifiedName, bool)> {
        let table = self.env.table;
        match table.resolve_static_field(ty.as_str(), field) {
            Some(decl) => {
                let context_bound = decl.field(field).is_some_and(FieldDecl::requires_context);
                Ok((decl.name.clone(), context_bound))
            }
            None if table.declares_type(ty.as_str()) => Err(CodegenError::UnresolvedMember {
                routine: self.routine().to_string(),
                member: format!("{}::${}", ty, field),
            }),
            None => Err(CodegenError::UnresolvedType {
                routine: self.routine().to_string(),
                name: ty.to_string(),
            }),
        }
    }

    fn emit_static_load(&mut self, ty: &QualifiedName, field: &str) -> Result<()> {
        let (owner, context_bound) = self.resolve_static(ty, field)?;
        let field = field.to_string();
        if context_bound {
            self.emit_ctx()?;
            self.il.emit(Instruction::LdCtxSFld { ty: owner, field });
        } else {
            self.il.emit(Instruction::LdSFld { ty: owner, field });
        }
        Ok(())
    }

    fn emit_static_store(
        &mut self,
        ty: &QualifiedName,
        field: &str,
        value: &BoundExpr,
        keep_value: bool,
    ) -> Result<()> {
        let (owner, context_bound) = self.resolve_static(ty, field)?;
        let field = field.to_string();

        if !context_bound {
            self.emit_value(value)?;
            if keep_value {
                self.il.emit(Instruction::Dup);
            }
            self.il.emit(Instruction::StSFld { ty: owner, field });
            return Ok(());
        }

        if !keep_value {
            self.emit_ctx()?;
            self.emit_value(value)?;
            self.il.emit(Instruction::StCtxSFld { ty: owner, field });
            return Ok(());
        }

        self.emit_value(value)?;
        let tmp = self.il.locals.temp();
        self.il.emit(Instruction::StLoc(tmp));
        self.emit_ctx()?;
        self.il.emit(Instruction::LdLoc(tmp));
        self.il.emit(Instruction::StCtxSFld { ty: owner, field });
        self.il.emit(Instruction::LdLoc(tmp));
        self.il.locals.release(tmp);
        Ok(())
    }
}

/// Argument slot of source parameter `index`; slot 0 is the context
pub(crate) fn arg_slot(routine: &str, index: usize) -> Result<u16> {
    u16::try_from(index + 1).map_err(|_| CodegenError::CapacityExceeded {
        routine: routine.to_string(),
        kind: SlotKind::Argument,
        count: index + 2,
        limit: usize::from(u16::MAX) + 1,
    })
}
