//! Bodies with no source counterpart
//!
//! Constructors, static storage initializers and the magic invocation
//! trampoline are generated from a type's declaration with the same
//! `CodeGenerator` used for routines.

use std::sync::Arc;

use scriptc_runtime::{ArgShape, CallSiteDescriptor, MagicMethod, NameStrategy};

use super::code_generator::{arg_slot, CodeGenerator, CodegenEnv};
use super::il_builder::BranchKind;
use crate::errors::{CodegenError, Result};
use crate::features::codegen::domain::{BodyKind, Instruction, MethodBody, MethodRef};
use crate::features::declarations::TypeEntry;
use crate::shared::models::{FieldDecl, ParamSig, ParamType, QualifiedName, TypeHint};

/// Instance field holding the context an object was created in
pub const CONTEXT_FIELD: &str = "<ctx>";

/// Name of the synthesized member `member` of `entry`
pub fn body_ref(entry: &TypeEntry, member: &str) -> MethodRef {
    MethodRef::method(&entry.name, member).at_site(entry.site())
}

/// Instance constructor
///
/// ```text
/// this.<ctx> = assert_not_null(ctx)        roots and context-threading types
/// base::.ctor(this, ctx, mapped args)      derived types
/// this.field = initializer                 per instance field, in order
/// if exact_type(this) == T:
///     Decl::__construct(this, ctx, args)   nearest declaring type
/// ```
pub fn constructor(env: CodegenEnv<'_>, entry: &Arc<TypeEntry>) -> Result<MethodBody> {
    let table = env.table;
    let name = body_ref(entry, MethodRef::CONSTRUCTOR);
    let initializer = table.resolve_initializer(entry);
    let params = initializer
        .as_ref()
        .map(|(_, init)| init.params.clone())
        .unwrap_or_default();
    let mut gen = CodeGenerator::new(env, name.to_string(), params, false, true);

    if entry.declares_context_field() {
        gen.emit_this()?;
        gen.emit_ctx()?;
        gen.emit(Instruction::DebugAssertNotNull);
        gen.emit(Instruction::StFld(CONTEXT_FIELD.to_string()));
    }

    if let Some(base) = &entry.base {
        forward_to_base(&mut gen, base)?;
    }

    for field in entry.instance_fields() {
        gen.emit_this()?;
        emit_initial_value(&mut gen, field)?;
        gen.emit(Instruction::StFld(field.name.clone()));
    }

    if let Some((decl, init)) = &initializer {
        // Derived constructors forward here too; only the most derived one
        // runs the user initializer.
        let skip = gen.il.define_label();
        gen.emit_this()?;
        gen.emit(Instruction::IsExactType(entry.name.clone()));
        gen.il.branch(BranchKind::IfFalse, skip);
        gen.emit_this()?;
        gen.emit_ctx()?;
        let argc = pass_through(&mut gen)?;
        gen.emit(Instruction::Call {
            method: MethodRef::method(&decl.name, &init.name).at_site(decl.site()),
            argc,
            instance: true,
        });
        gen.emit(Instruction::Pop);
        gen.il.mark_label(skip);
    }

    gen.emit(Instruction::LdNull);
    gen.emit(Instruction::Ret);
    package(gen, name, BodyKind::Constructor, false, true, &entry.file)
}

fn forward_to_base(gen: &mut CodeGenerator<'_>, base: &QualifiedName) -> Result<()> {
    let table = gen.env.table;
    let target = match table.type_entry(base.as_str()) {
        Some(base_entry) => {
            let params = table
                .resolve_initializer(base_entry)
                .map(|(_, init)| init.params.clone())
                .unwrap_or_default();
            Some((base_entry.name.clone(), params))
        }
        None if table.declares_type(base.as_str()) => None,
        None => {
            return Err(CodegenError::UnresolvedType {
                routine: gen.routine().to_string(),
                name: base.to_string(),
            })
        }
    };

    gen.emit_this()?;
    gen.emit_ctx()?;
    let (base_name, argc) = match target {
        Some((base_name, params)) => {
            let argc = map_positional(gen, &params, &base_name)?;
            (base_name, argc)
        }
        // Conditional base: its signature is unknown until run time
        None => (base.clone(), pass_through(gen)?),
    };
    gen.emit(Instruction::Call {
        method: MethodRef::constructor(&base_name),
        argc,
        instance: true,
    });
    gen.emit(Instruction::Pop);
    Ok(())
}

/// Push the callee's arguments from our own parameters, in order.
///
/// Context parameters take the current context. Value parameters consume the
/// next value parameter of ours when its type can be passed, fall back to
/// the callee's default, and are a signature mismatch otherwise.
fn map_positional(gen: &mut CodeGenerator<'_>, callee: &[ParamSig], owner: &QualifiedName) -> Result<usize> {
    let own: Vec<(usize, TypeHint)> = gen
        .params()
        .iter()
        .enumerate()
        .filter_map(|(i, p)| match &p.ty {
            ParamType::Value(hint) => Some((i, hint.clone())),
            ParamType::Context => None,
        })
        .collect();
    let mut cursor = own.into_iter();

    for param in callee {
        let ParamType::Value(expected) = &param.ty else {
            gen.emit_ctx()?;
            continue;
        };
        match (cursor.next(), &param.default) {
            (Some((i, hint)), _) if hint.can_be_passed_to(expected) => {
                let slot = arg_slot(gen.routine(), i)?;
                gen.emit(Instruction::LdArg(slot));
            }
            (Some((i, hint)), _) => {
                return Err(CodegenError::signature(
                    gen.routine(),
                    format!(
                        "parameter '{}' of type {:?} cannot be passed to '{}' of {}::.ctor, which expects {:?}",
                        gen.params()[i].name,
                        hint,
                        param.name,
                        owner,
                        expected
                    ),
                ))
            }
            (None, Some(default)) => gen.emit_literal(default),
            (None, None) => {
                return Err(CodegenError::signature(
                    gen.routine(),
                    format!(
                        "no argument for required parameter '{}' of {}::.ctor",
                        param.name, owner
                    ),
                ))
            }
        }
    }
    Ok(callee.len())
}

/// Push every parameter of ours unchanged
fn pass_through(gen: &mut CodeGenerator<'_>) -> Result<usize> {
    let count = gen.params().len();
    for i in 0..count {
        if gen.params()[i].is_context() {
            gen.emit_ctx()?;
        } else {
            let slot = arg_slot(gen.routine(), i)?;
            gen.emit(Instruction::LdArg(slot));
        }
    }
    Ok(count)
}

fn emit_initial_value(gen: &mut CodeGenerator<'_>, field: &FieldDecl) -> Result<()> {
    match &field.initializer {
        Some(init) => gen.emit_value(init),
        None => {
            gen.emit(Instruction::LdNull);
            Ok(())
        }
    }
}

/// Initializer of app-wide static fields; runs once per process
pub fn type_initializer(env: CodegenEnv<'_>, entry: &Arc<TypeEntry>) -> Result<MethodBody> {
    let name = body_ref(entry, MethodRef::TYPE_INITIALIZER);
    let mut gen = CodeGenerator::new(env, name.to_string(), Vec::new(), true, false);

    for field in entry.static_fields().filter(|f| !f.requires_context()) {
        emit_initial_value(&mut gen, field)?;
        gen.emit(Instruction::StSFld {
            ty: entry.name.clone(),
            field: field.name.clone(),
        });
    }
    gen.emit(Instruction::LdNull);
    gen.emit(Instruction::Ret);
    package(gen, name, BodyKind::TypeInitializer, true, false, &entry.file)
}

/// Initializer of context-bound static fields; runs the first time a
/// context touches the type's statics holder
pub fn statics_initializer(env: CodegenEnv<'_>, entry: &Arc<TypeEntry>) -> Result<MethodBody> {
    let name = body_ref(entry, MethodRef::STATICS_INITIALIZER);
    let mut gen = CodeGenerator::new(env, name.to_string(), Vec::new(), true, true);

    for field in entry.static_fields().filter(|f| f.requires_context()) {
        gen.emit_ctx()?;
        emit_initial_value(&mut gen, field)?;
        gen.emit(Instruction::StCtxSFld {
            ty: entry.name.clone(),
            field: field.name.clone(),
        });
    }
    gen.emit(Instruction::LdNull);
    gen.emit(Instruction::Ret);
    package(gen, name, BodyKind::StaticsInitializer, true, true, &entry.file)
}

/// Forwards a call on a callable instance to `__invoke` through a call site
pub fn invoke_trampoline(env: CodegenEnv<'_>, entry: &Arc<TypeEntry>) -> Result<MethodBody> {
    let name = body_ref(entry, MethodRef::INVOKE_TRAMPOLINE);
    let params = vec![ParamSig::value("args", TypeHint::Array)];
    let mut gen = CodeGenerator::new(env, name.to_string(), params, false, true);

    gen.emit_this()?;
    gen.emit_ctx()?;
    let args = arg_slot(gen.routine(), 0)?;
    gen.emit(Instruction::LdArg(args));
    gen.emit(Instruction::CallSite(CallSiteDescriptor::new(
        env.sites.next(),
        NameStrategy::Magic(MagicMethod::Invoke),
        vec![ArgShape::Unpack],
    )));
    gen.emit(Instruction::Ret);
    package(gen, name, BodyKind::InvokeTrampoline, false, true, &entry.file)
}

fn package(
    gen: CodeGenerator<'_>,
    name: MethodRef,
    kind: BodyKind,
    is_static: bool,
    has_context: bool,
    source_file: &str,
) -> Result<MethodBody> {
    let params = gen.params().to_vec();
    let assembled = gen.finish()?;
    Ok(MethodBody {
        name,
        kind,
        params,
        has_context,
        is_static,
        source_file: source_file.to_string(),
        instructions: assembled.instructions,
        block_offsets: Vec::new(),
        regions: Vec::new(),
        max_stack: assembled.max_stack,
        locals: assembled.locals,
        sequence_points: assembled.sequence_points,
        call_sites: assembled.call_sites,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodegenConfig;
    use crate::features::codegen::infrastructure::CallSiteIds;
    use crate::features::declarations::{DeclarationTable, PopulateOptions};
    use crate::features::flow_graph::ControlFlowGraph;
    use crate::shared::models::{BoundExpr, Literal, Routine, SourceItem, SourceUnit, TypeDeclSyntax};

    fn with_table<R>(items: Vec<SourceItem>, f: impl FnOnce(CodegenEnv<'_>, &DeclarationTable) -> R) -> R {
        let table = DeclarationTable::populate(
            vec![SourceUnit::new("types.php", items)],
            PopulateOptions::default(),
        )
        .unwrap();
        let config = CodegenConfig::default();
        let sites = CallSiteIds::new();
        let env = CodegenEnv {
            table: &table,
            config: &config,
            sites: &sites,
        };
        f(env, &table)
    }

    fn init(owner: &str, params: Vec<ParamSig>) -> Routine {
        Routine::method(
            QualifiedName::new(owner),
            "__construct",
            params,
            ControlFlowGraph::new(),
        )
    }

    #[test]
    fn test_root_constructor_sets_context_field() {
        let ty = TypeDeclSyntax::new("Point");
        with_table(vec![SourceItem::Type(ty)], |env, table| {
            let entry = table.type_entry("point").unwrap();
            let body = constructor(env, entry).unwrap();
            assert_eq!(
                &body.instructions[..4],
                &[
                    Instruction::LdThis,
                    Instruction::LdCtx,
                    Instruction::DebugAssertNotNull,
                    Instruction::StFld(CONTEXT_FIELD.to_string()),
                ]
            );
            assert_eq!(body.kind, BodyKind::Constructor);
        });
    }

    #[test]
    fn test_base_forwarding_uses_callee_default() {
        let mut base = TypeDeclSyntax::new("Base");
        base.methods.push(init(
            "Base",
            vec![
                ParamSig::value("a", TypeHint::Long),
                ParamSig::value("b", TypeHint::String).with_default(Literal::String("x".into())),
            ],
        ));
        let mut derived = TypeDeclSyntax::new("Derived");
        derived.base = Some(QualifiedName::new("Base"));
        derived.methods.push(init("Derived", vec![ParamSig::value("n", TypeHint::Long)]));

        with_table(
            vec![SourceItem::Type(base), SourceItem::Type(derived)],
            |env, table| {
                let entry = table.type_entry("Derived").unwrap();
                let body = constructor(env, entry).unwrap();
                // Derived is not a root and does not thread its context
                assert_eq!(
                    &body.instructions[..6],
                    &[
                        Instruction::LdThis,
                        Instruction::LdCtx,
                        Instruction::LdArg(1),
                        Instruction::LdStr("x".into()),
                        Instruction::Call {
                            method: MethodRef::constructor(&QualifiedName::new("Base")),
                            argc: 2,
                            instance: true
                        },
                        Instruction::Pop,
                    ]
                );
            },
        );
    }

    #[test]
    fn test_base_forwarding_rejects_incompatible_parameter() {
        let mut base = TypeDeclSyntax::new("Base");
        base.methods.push(init("Base", vec![ParamSig::value("a", TypeHint::Long)]));
        let mut derived = TypeDeclSyntax::new("Derived");
        derived.base = Some(QualifiedName::new("Base"));
        derived.methods.push(init("Derived", vec![ParamSig::value("s", TypeHint::String)]));

        with_table(
            vec![SourceItem::Type(base), SourceItem::Type(derived)],
            |env, table| {
                let entry = table.type_entry("Derived").unwrap();
                let err = constructor(env, entry).unwrap_err();
                assert!(matches!(err, CodegenError::SignatureMismatch { .. }));
            },
        );
    }

    #[test]
    fn test_static_fields_split_by_storage() {
        let mut ty = TypeDeclSyntax::new("Config");
        ty.fields.push(FieldDecl::static_field("limit", Some(BoundExpr::long(10))));
        ty.fields.push(FieldDecl::static_field(
            "started",
            Some(BoundExpr::Call {
                function: QualifiedName::new("now"),
                args: vec![],
            }),
        ));

        with_table(vec![SourceItem::Type(ty)], |env, table| {
            let entry = table.type_entry("Config").unwrap();
            let cctor = type_initializer(env, entry).unwrap();
            assert!(!cctor.has_context);
            assert_eq!(cctor.count(|i| matches!(i, Instruction::StSFld { .. })), 1);

            let statics = statics_initializer(env, entry).unwrap();
            assert!(statics.has_context);
            assert_eq!(statics.count(|i| matches!(i, Instruction::StCtxSFld { .. })), 1);
        });
    }

    #[test]
    fn test_invoke_trampoline_uses_magic_name() {
        let mut ty = TypeDeclSyntax::new("Handler");
        ty.callable = true;
        ty.methods.push(Routine::method(
            QualifiedName::new("Handler"),
            "__invoke",
            vec![],
            ControlFlowGraph::new(),
        ));

        with_table(vec![SourceItem::Type(ty)], |env, table| {
            let entry = table.type_entry("Handler").unwrap();
            let body = invoke_trampoline(env, entry).unwrap();
            assert_eq!(body.call_sites.len(), 1);
            assert_eq!(
                body.call_sites[0].strategy,
                NameStrategy::Magic(MagicMethod::Invoke)
            );
            assert_eq!(body.call_sites[0].args, vec![ArgShape::Unpack]);
        });
    }
}
