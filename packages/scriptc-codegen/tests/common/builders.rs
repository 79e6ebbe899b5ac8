//! Test data builders
//!
//! Bound trees and graphs are verbose to write by hand; these helpers keep
//! test programs close to the scripts they stand for.

use scriptc_codegen::config::{CodegenConfig, Preset};
use scriptc_codegen::shared::models::{
    Argument, BoundExpr, BoundStmt, FieldDecl, Literal, MethodName, ParamSig, QualifiedName,
    Routine, SourceItem, SourceUnit, TypeDeclSyntax,
};
use scriptc_codegen::{CompilationOutput, Compiler, ControlFlowGraph};

// ═══════════════════════════════════════════════════════════════════════════
// Expressions and statements
// ═══════════════════════════════════════════════════════════════════════════

pub fn long(n: i64) -> BoundExpr {
    BoundExpr::long(n)
}

pub fn string(s: &str) -> BoundExpr {
    BoundExpr::string(s)
}

pub fn var(name: &str) -> BoundExpr {
    BoundExpr::var(name)
}

pub fn assign(target: &str, value: BoundExpr) -> BoundStmt {
    BoundStmt::expr(BoundExpr::Assign {
        target: target.to_string(),
        value: Box::new(value),
    })
}

pub fn echo(value: BoundExpr) -> BoundStmt {
    BoundStmt::echo(value)
}

pub fn ret(value: BoundExpr) -> BoundStmt {
    BoundStmt::ret(Some(value))
}

pub fn throw(value: BoundExpr) -> BoundStmt {
    BoundStmt::throw(value)
}

pub fn call(function: &str, args: Vec<BoundExpr>) -> BoundExpr {
    BoundExpr::Call {
        function: QualifiedName::new(function),
        args,
    }
}

pub fn new_obj(ty: &str, args: Vec<BoundExpr>) -> BoundExpr {
    BoundExpr::New {
        ty: QualifiedName::new(ty),
        args,
    }
}

/// `$receiver->name(args)` with no proven receiver type
pub fn method_call(receiver: BoundExpr, name: &str, args: Vec<BoundExpr>) -> BoundExpr {
    BoundExpr::MethodCall {
        receiver: Box::new(receiver),
        name: MethodName::Direct(name.to_string()),
        args: args.into_iter().map(Argument::value).collect(),
        receiver_type: None,
    }
}

/// `$receiver->name(args)` where the receiver is known to be exactly `ty`
pub fn typed_method_call(receiver: BoundExpr, ty: &str, name: &str, args: Vec<BoundExpr>) -> BoundExpr {
    BoundExpr::MethodCall {
        receiver: Box::new(receiver),
        name: MethodName::Direct(name.to_string()),
        args: args.into_iter().map(Argument::value).collect(),
        receiver_type: Some(QualifiedName::new(ty)),
    }
}

/// `$receiver->{$name}(args)`
pub fn computed_call(receiver: BoundExpr, name: BoundExpr, args: Vec<Argument>) -> BoundExpr {
    BoundExpr::MethodCall {
        receiver: Box::new(receiver),
        name: MethodName::Computed(Box::new(name)),
        args,
        receiver_type: None,
    }
}

pub fn field(receiver: BoundExpr, name: &str) -> BoundExpr {
    BoundExpr::FieldLoad {
        receiver: Box::new(receiver),
        field: name.to_string(),
    }
}

pub fn set_field(receiver: BoundExpr, name: &str, value: BoundExpr) -> BoundStmt {
    BoundStmt::expr(BoundExpr::FieldStore {
        receiver: Box::new(receiver),
        field: name.to_string(),
        value: Box::new(value),
    })
}

pub fn static_field(ty: &str, name: &str) -> BoundExpr {
    BoundExpr::StaticFieldLoad {
        ty: QualifiedName::new(ty),
        field: name.to_string(),
    }
}

pub fn set_static(ty: &str, name: &str, value: BoundExpr) -> BoundStmt {
    BoundStmt::expr(BoundExpr::StaticFieldStore {
        ty: QualifiedName::new(ty),
        field: name.to_string(),
        value: Box::new(value),
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Graphs
// ═══════════════════════════════════════════════════════════════════════════

/// `start → body → exit`
pub fn straight(stmts: Vec<BoundStmt>) -> ControlFlowGraph {
    let mut g = ControlFlowGraph::new();
    let body = g.add_block();
    for stmt in stmts {
        g.push_statement(body, stmt);
    }
    g.connect_simple(g.start(), body);
    g.connect_simple(body, g.exit());
    g
}

// ═══════════════════════════════════════════════════════════════════════════
// Declarations
// ═══════════════════════════════════════════════════════════════════════════

pub fn function(name: &str, params: Vec<ParamSig>, cfg: ControlFlowGraph) -> SourceItem {
    SourceItem::Function(Routine::function(name, params, cfg))
}

pub fn unit(path: &str, items: Vec<SourceItem>) -> SourceUnit {
    SourceUnit::new(path, items)
}

pub fn default_of(param: ParamSig, value: i64) -> ParamSig {
    param.with_default(Literal::Long(value))
}

/// Builder for type declarations
#[derive(Debug)]
pub struct TypeBuilder {
    decl: TypeDeclSyntax,
}

impl TypeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            decl: TypeDeclSyntax::new(name),
        }
    }

    pub fn base(mut self, base: &str) -> Self {
        self.decl.base = Some(QualifiedName::new(base));
        self
    }

    pub fn field(mut self, name: &str, initializer: Option<BoundExpr>) -> Self {
        self.decl.fields.push(FieldDecl::instance(name, initializer));
        self
    }

    pub fn static_field(mut self, name: &str, initializer: Option<BoundExpr>) -> Self {
        self.decl.fields.push(FieldDecl::static_field(name, initializer));
        self
    }

    pub fn method(mut self, name: &str, params: Vec<ParamSig>, cfg: ControlFlowGraph) -> Self {
        let owner = self.decl.name.clone();
        self.decl.methods.push(Routine::method(owner, name, params, cfg));
        self
    }

    pub fn threads_context(mut self) -> Self {
        self.decl.threads_context = true;
        self
    }

    pub fn callable(mut self) -> Self {
        self.decl.callable = true;
        self
    }

    pub fn build(self) -> SourceItem {
        SourceItem::Type(self.decl)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Compilation
// ═══════════════════════════════════════════════════════════════════════════

/// Compile with the sequential debug preset
pub fn compile(units: Vec<SourceUnit>) -> CompilationOutput {
    compile_with(CodegenConfig::from_preset(Preset::Debug), units)
}

pub fn compile_with(config: CodegenConfig, units: Vec<SourceUnit>) -> CompilationOutput {
    Compiler::new(config)
        .compile(units)
        .expect("compilation aborted")
}
