//! Constructors, static initializers and invoke trampolines, executed

mod common;

use common::*;
use pretty_assertions::assert_eq;
use scriptc_codegen::features::codegen::{BodyKind, Instruction, CONTEXT_FIELD};
use scriptc_codegen::shared::models::{BinaryOp, BoundExpr, ParamSig, SourceItem, TypeHint};
use scriptc_runtime::{DispatchError, Value};

fn concat(left: BoundExpr, right: BoundExpr) -> BoundExpr {
    BoundExpr::binary(BinaryOp::Concat, left, right)
}

fn long_param(name: &str) -> ParamSig {
    ParamSig::value(name, TypeHint::Long)
}

// ═══════════════════════════════════════════════════════════════════════════
// Constructors
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_inherited_initializer_runs_once() {
    let output = compile(vec![unit(
        "models.php",
        vec![
            TypeBuilder::new("Model")
                .method(
                    "__construct",
                    vec![long_param("id")],
                    straight(vec![echo(concat(string("init:"), var("id")))]),
                )
                .build(),
            TypeBuilder::new("User").base("Model").build(),
        ],
    )]);
    assert!(!output.has_errors(), "{:?}", output.diagnostics);

    let ctor = output.body("User::.ctor").unwrap();
    assert_eq!(ctor.kind, BodyKind::Constructor);
    assert_eq!(ctor.params.len(), 1);

    let image = Image::load(output);
    let ctx = image.context();
    let user = image.construct(&ctx, "User", vec![Value::Long(5)]).unwrap();
    assert_eq!(user.type_name(), "User");
    assert_eq!(ctx.output(), "init:5");
}

#[test]
fn test_nearest_initializer_wins() {
    let output = compile(vec![unit(
        "models.php",
        vec![
            TypeBuilder::new("Model")
                .method(
                    "__construct",
                    vec![long_param("id")],
                    straight(vec![echo(string("model "))]),
                )
                .build(),
            TypeBuilder::new("User")
                .base("Model")
                .method(
                    "__construct",
                    vec![long_param("uid")],
                    straight(vec![echo(string("user"))]),
                )
                .build(),
        ],
    )]);

    let image = Image::load(output);
    let ctx = image.context();
    image.construct(&ctx, "User", vec![Value::Long(1)]).unwrap();
    assert_eq!(ctx.output(), "user");

    let ctx = image.context();
    image.construct(&ctx, "Model", vec![Value::Long(1)]).unwrap();
    assert_eq!(ctx.output(), "model ");
}

#[test]
fn test_base_forwarding_uses_defaults_for_missing_parameters() {
    let point = TypeBuilder::new("Point")
        .field("sum", None)
        .method(
            "__construct",
            vec![long_param("x"), default_of(long_param("y"), 10)],
            straight(vec![set_field(
                BoundExpr::This,
                "sum",
                BoundExpr::binary(BinaryOp::Add, var("x"), var("y")),
            )]),
        )
        .build();
    let labeled = TypeBuilder::new("Labeled")
        .base("Point")
        .method("__construct", vec![long_param("x")], straight(vec![]))
        .build();
    let make = function(
        "make",
        vec![],
        straight(vec![ret(new_obj("Point", vec![long(1)]))]),
    );

    let output = compile(vec![unit("geo.php", vec![point, labeled, make])]);
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
    let forward = output.body("Labeled::.ctor").unwrap();
    assert_eq!(forward.count(|i| *i == Instruction::LdLong(10)), 1);
    assert_eq!(
        output
            .body("make")
            .unwrap()
            .count(|i| matches!(i, Instruction::NewObj { argc: 2, .. })),
        1
    );

    let image = Image::load(output);
    let ctx = image.context();
    let point = image.call(&ctx, "make", vec![]).unwrap();
    assert_eq!(point.as_object().unwrap().field("sum"), Value::Long(11));
}

#[test]
fn test_incompatible_base_signature_is_a_diagnostic() {
    let output = compile(vec![unit(
        "a.php",
        vec![
            TypeBuilder::new("Base")
                .method("__construct", vec![long_param("x")], straight(vec![]))
                .build(),
            TypeBuilder::new("Child")
                .base("Base")
                .method("__construct", vec![], straight(vec![]))
                .build(),
            TypeBuilder::new("Other")
                .base("Base")
                .method(
                    "__construct",
                    vec![ParamSig::value("items", TypeHint::Array)],
                    straight(vec![]),
                )
                .build(),
        ],
    )]);

    for ctor in ["Child::.ctor", "Other::.ctor"] {
        let diagnostic = output.diagnostic(ctor).unwrap();
        assert!(diagnostic.is_error());
        assert!(diagnostic.message.contains("signature mismatch"), "{}", diagnostic.message);
        assert!(output.body(ctor).is_none());
    }
    // Failures stay local to their body
    assert!(output.body("Base::.ctor").is_some());
    assert!(output.body("Child::__construct").is_some());
}

#[test]
fn test_missing_base_type() {
    let output = compile(vec![unit(
        "a.php",
        vec![TypeBuilder::new("Orphan").base("Missing").build()],
    )]);
    assert_eq!(output.diagnostics.len(), 1);
    assert!(output.diagnostics[0].message.contains("unresolved type 'Missing'"));
}

#[test]
fn test_context_is_stored_on_roots_and_asserted_in_debug() {
    let output = compile(vec![unit(
        "svc.php",
        vec![TypeBuilder::new("Service")
            .threads_context()
            .method("run", vec![], straight(vec![ret(string("ran"))]))
            .build()],
    )]);

    let ctor = output.body("Service::.ctor").unwrap();
    assert_eq!(ctor.count(|i| *i == Instruction::StFld(CONTEXT_FIELD.to_string())), 1);
    let run = output.body("Service::run").unwrap();
    assert_eq!(
        run.instructions[..3],
        [
            Instruction::LdThis,
            Instruction::LdFld(CONTEXT_FIELD.to_string()),
            Instruction::DebugAssertNotNull,
        ]
    );

    let image = Image::load(output);
    let ctx = image.context();
    let service = image.construct(&ctx, "Service", vec![]).unwrap();
    assert_eq!(
        image.call_method(&ctx, "Service", "run", service, vec![]).unwrap(),
        Value::string("ran")
    );

    // An instance built without its constructor trips the assertion
    let bare = Value::Object(scriptc_runtime::Object::new(image.runtime_type("Service").unwrap()));
    assert!(image.call_method(&ctx, "Service", "run", bare, vec![]).is_err());
}

#[test]
fn test_instance_fields_initialized_in_order() {
    let output = compile(vec![unit(
        "a.php",
        vec![TypeBuilder::new("Counter")
            .field("start", Some(long(3)))
            .field("label", None)
            .build()],
    )]);
    let image = Image::load(output);
    let ctx = image.context();
    let counter = image.construct(&ctx, "Counter", vec![]).unwrap();
    let object = counter.as_object().unwrap();
    assert_eq!(object.field("start"), Value::Long(3));
    assert!(object.has_field("label"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Static storage
// ═══════════════════════════════════════════════════════════════════════════

fn settings_program() -> Vec<SourceItem> {
    vec![
        function("start", vec![], straight(vec![ret(long(100))])),
        TypeBuilder::new("Settings")
            .static_field("version", Some(long(3)))
            .static_field("hits", Some(call("start", vec![])))
            .build(),
        function("version", vec![], straight(vec![ret(static_field("Settings", "version"))])),
        function(
            "upgrade",
            vec![],
            straight(vec![set_static("Settings", "version", long(4))]),
        ),
        function(
            "hit",
            vec![],
            straight(vec![
                set_static(
                    "Settings",
                    "hits",
                    BoundExpr::binary(BinaryOp::Add, static_field("Settings", "hits"), long(1)),
                ),
                ret(static_field("Settings", "hits")),
            ]),
        ),
    ]
}

#[test]
fn test_static_storage_is_split_by_context_dependence() {
    let output = compile(vec![unit("settings.php", settings_program())]);
    assert!(!output.has_errors(), "{:?}", output.diagnostics);

    assert_eq!(output.body("Settings::.cctor").unwrap().kind, BodyKind::TypeInitializer);
    assert_eq!(
        output.body("Settings::<init_statics>").unwrap().kind,
        BodyKind::StaticsInitializer
    );
    let version = output.body("version").unwrap();
    assert_eq!(version.count(|i| matches!(i, Instruction::LdSFld { .. })), 1);
    let hit = output.body("hit").unwrap();
    assert_eq!(hit.count(|i| matches!(i, Instruction::LdCtxSFld { .. })), 2);
}

#[test]
fn test_app_statics_shared_and_context_statics_per_context() {
    let image = Image::load(compile(vec![unit("settings.php", settings_program())]));

    let first = image.context();
    assert_eq!(image.call(&first, "version", vec![]).unwrap(), Value::Long(3));
    image.call(&first, "upgrade", vec![]).unwrap();
    assert_eq!(image.call(&first, "hit", vec![]).unwrap(), Value::Long(101));
    assert_eq!(image.call(&first, "hit", vec![]).unwrap(), Value::Long(102));

    let second = image.context();
    // Type initializer does not run again for a new context
    assert_eq!(image.call(&second, "version", vec![]).unwrap(), Value::Long(4));
    assert_eq!(image.call(&second, "hit", vec![]).unwrap(), Value::Long(101));
}

#[test]
fn test_unknown_static_field() {
    let output = compile(vec![unit(
        "a.php",
        vec![
            TypeBuilder::new("Settings").static_field("version", None).build(),
            function("f", vec![], straight(vec![ret(static_field("Settings", "missing"))])),
        ],
    )]);
    assert!(matches!(
        output.diagnostic("f").map(|d| d.message.as_str()),
        Some(m) if m.contains("Settings::$missing")
    ));
}

#[test]
fn test_failed_statics_initializer_fails_every_access() {
    let output = compile(vec![unit(
        "cfg.php",
        vec![
            function(
                "load",
                vec![],
                straight(vec![echo(string("load;")), throw(string("bad config"))]),
            ),
            TypeBuilder::new("Cfg")
                .static_field("limit", Some(call("load", vec![])))
                .build(),
            function("limit", vec![], straight(vec![ret(static_field("Cfg", "limit"))])),
        ],
    )]);
    assert!(!output.has_errors(), "{:?}", output.diagnostics);

    let image = Image::load(output);
    let ctx = image.context();
    for _ in 0..2 {
        let err = image.call(&ctx, "limit", vec![]).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Thrown { ref value, .. } if *value == Value::string("bad config")
        ));
    }
    // The initializer ran once; the second access reported its failure
    assert_eq!(ctx.output(), "load;");

    let other = image.context();
    assert!(image.call(&other, "limit", vec![]).is_err());
    assert_eq!(other.output(), "load;");
}

// ═══════════════════════════════════════════════════════════════════════════
// Invoke trampoline
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_invoke_trampoline_spreads_arguments() {
    let output = compile(vec![unit(
        "greeter.php",
        vec![TypeBuilder::new("Greeter")
            .callable()
            .method(
                "__invoke",
                vec![ParamSig::value("name", TypeHint::String)],
                straight(vec![ret(concat(string("hi "), var("name")))]),
            )
            .build()],
    )]);

    let trampoline = output.body("Greeter::<invoke>").unwrap();
    assert_eq!(trampoline.kind, BodyKind::InvokeTrampoline);
    assert_eq!(trampoline.call_sites.len(), 1);

    let image = Image::load(output);
    let ctx = image.context();
    let greeter = image.construct(&ctx, "Greeter", vec![]).unwrap();
    let args = Value::list([Value::string("bob")]);
    assert_eq!(
        image
            .call_method(&ctx, "Greeter", "<invoke>", greeter, vec![args])
            .unwrap(),
        Value::string("hi bob")
    );
}

#[test]
fn test_non_callable_type_gets_no_trampoline() {
    let output = compile(vec![unit(
        "a.php",
        vec![TypeBuilder::new("Plain")
            .method("__invoke", vec![], straight(vec![]))
            .build()],
    )]);
    assert!(output.body("Plain::<invoke>").is_none());
    assert!(output.body("Plain::__invoke").is_some());
}
