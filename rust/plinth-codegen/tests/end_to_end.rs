//! Compiles small programs and runs them on the simulator:
//! - smi fast paths and their overflow fallbacks
//! - branch-only conditions and short-circuit operators
//! - try/finally unwinding
//! - per-function failure when a tree is too deep

use plinth_codegen::{compile, CompileOptions};
use plinth_core::ast::{Declaration, Expr, FunctionLiteral, Stmt, Var};
use plinth_core::layout::SMI_MAX;
use plinth_core::token::{BinaryOp, LogicalOp};
use plinth_core::{MajorKey, Module, RuntimeFunction};
use plinth_vm::{Value, Vm, VmError, VmOptions};

/// A main function that declares each literal as a global function.
fn program(functions: Vec<FunctionLiteral>) -> FunctionLiteral {
    functions.into_iter().fold(FunctionLiteral::new("main"), |main, f| {
        let var = Var::global(&f.name);
        main.declare(Declaration {
            var,
            function: Some(Box::new(f)),
        })
    })
}

fn boot_module(module: &Module) -> Vm {
    let mut vm = Vm::new(module, VmOptions::default()).expect("simulator starts");
    vm.run_main().expect("main runs");
    vm
}

fn boot(functions: Vec<FunctionLiteral>) -> Vm {
    let module = compile(&program(functions), &CompileOptions::default()).expect("compiles");
    boot_module(&module)
}

fn print(message: &str) -> Stmt {
    Stmt::expr(Expr::CallRuntime {
        name: "Print".into(),
        args: vec![Expr::string(message)],
    })
}

fn add() -> FunctionLiteral {
    FunctionLiteral::new("add")
        .with_params(&["a", "b"])
        .with_body(vec![Stmt::ret(Expr::binary(
            BinaryOp::Add,
            Expr::param("a", 0),
            Expr::param("b", 1),
        ))])
}

#[test]
fn smi_addition_stays_inline() {
    let mut vm = boot(vec![add()]);
    let result = vm.call_global("add", &[Value::Smi(2), Value::Smi(3)]).unwrap();
    assert_eq!(result, Value::Smi(5));
    assert_eq!(vm.stats().stub_calls_of(MajorKey::GenericBinaryOp), 0);
}

#[test]
fn smi_overflow_produces_a_boxed_number() {
    let mut vm = boot(vec![add()]);
    let result = vm
        .call_global("add", &[Value::Smi(SMI_MAX), Value::Smi(1)])
        .unwrap();
    assert_eq!(result, Value::Number(f64::from(SMI_MAX) + 1.0));
    assert_eq!(vm.stats().stub_calls_of(MajorKey::GenericBinaryOp), 1);
}

#[test]
fn non_smi_operands_take_the_stub() {
    let mut vm = boot(vec![add()]);
    let sum = vm
        .call_global("add", &[Value::Number(1.5), Value::Smi(2)])
        .unwrap();
    assert_eq!(sum, Value::Number(3.5));
    let joined = vm
        .call_global("add", &[Value::String("plinth".into()), Value::Smi(5)])
        .unwrap();
    assert_eq!(joined, Value::String("plinth5".into()));
    assert_eq!(vm.stats().stub_calls_of(MajorKey::GenericBinaryOp), 2);
}

#[test]
fn condition_on_false_only_branches() {
    let choose = FunctionLiteral::new("choose").with_params(&["x"]).with_body(vec![
        Stmt::if_else(Expr::param("x", 0), Stmt::ret(Expr::smi(1)), None),
        Stmt::ret(Expr::smi(2)),
    ]);
    let mut vm = boot(vec![choose]);
    assert_eq!(vm.call_global("choose", &[Value::Bool(false)]).unwrap(), Value::Smi(2));
    assert_eq!(vm.call_global("choose", &[Value::Bool(true)]).unwrap(), Value::Smi(1));
    assert_eq!(vm.call_global("choose", &[Value::Smi(0)]).unwrap(), Value::Smi(2));
    assert_eq!(vm.call_global("choose", &[Value::Smi(-4)]).unwrap(), Value::Smi(1));
    assert_eq!(vm.call_global("choose", &[Value::Undefined]).unwrap(), Value::Smi(2));
    assert_eq!(vm.stats().runtime_calls_of(RuntimeFunction::ToBool), 0);

    // Strings are not decided inline.
    assert_eq!(vm.call_global("choose", &[Value::String(String::new())]).unwrap(), Value::Smi(2));
    assert_eq!(vm.call_global("choose", &[Value::String("x".into())]).unwrap(), Value::Smi(1));
    assert_eq!(vm.stats().runtime_calls_of(RuntimeFunction::ToBool), 2);
}

#[test]
fn truthy_left_operand_short_circuits_or() {
    let side_effect = Expr::CallRuntime {
        name: "Print".into(),
        args: vec![Expr::string("evaluated")],
    };
    let constant = FunctionLiteral::new("constant").with_body(vec![Stmt::ret(Expr::logical(
        LogicalOp::Or,
        Expr::boolean(true),
        side_effect.clone(),
    ))]);
    let either = FunctionLiteral::new("either").with_params(&["a"]).with_body(vec![Stmt::ret(
        Expr::logical(LogicalOp::Or, Expr::param("a", 0), side_effect),
    )]);
    let mut vm = boot(vec![constant, either]);

    assert_eq!(vm.call_global("constant", &[]).unwrap(), Value::Bool(true));
    assert_eq!(vm.call_global("either", &[Value::Smi(7)]).unwrap(), Value::Smi(7));
    assert_eq!(
        vm.call_global("either", &[Value::String("left".into())]).unwrap(),
        Value::String("left".into())
    );
    assert!(vm.output().is_empty());

    // A falsy left operand yields the right one.
    assert_eq!(vm.call_global("either", &[Value::Smi(0)]).unwrap(), Value::Undefined);
    assert_eq!(vm.output(), ["evaluated"]);
}

#[test]
fn and_in_a_test_context_needs_both_operands() {
    let both = FunctionLiteral::new("both").with_params(&["a", "b"]).with_body(vec![
        Stmt::if_else(
            Expr::logical(LogicalOp::And, Expr::param("a", 0), Expr::param("b", 1)),
            Stmt::ret(Expr::string("yes")),
            Some(Stmt::ret(Expr::string("no"))),
        ),
    ]);
    let mut vm = boot(vec![both]);
    let mut ask = |a: Value, b: Value| vm.call_global("both", &[a, b]).unwrap();
    assert_eq!(ask(Value::Smi(1), Value::Bool(true)), Value::String("yes".into()));
    assert_eq!(ask(Value::Smi(1), Value::Null), Value::String("no".into()));
    assert_eq!(ask(Value::Bool(false), Value::Bool(true)), Value::String("no".into()));
}

#[test]
fn finally_runs_once_and_the_exception_propagates() {
    let guarded = FunctionLiteral::new("guarded").with_body(vec![Stmt::TryFinally {
        try_block: vec![Stmt::expr(Expr::Throw(Box::new(Expr::string("boom"))))],
        finally_block: vec![print("cleanup")],
    }]);
    let mut vm = boot(vec![guarded]);
    let err = vm.call_global("guarded", &[]).unwrap_err();
    assert_eq!(err, VmError::Uncaught("boom".into()));
    assert_eq!(vm.output(), ["cleanup"]);
}

#[test]
fn too_deep_functions_get_no_code_but_siblings_run() {
    let mut deep = Expr::param("x", 0);
    for _ in 0..200 {
        deep = Expr::binary(BinaryOp::Add, deep, Expr::smi(1));
    }
    let too_deep = FunctionLiteral::new("too_deep")
        .with_params(&["x"])
        .with_body(vec![Stmt::ret(deep)]);
    let shallow = FunctionLiteral::new("shallow")
        .with_params(&["x"])
        .with_body(vec![Stmt::ret(Expr::binary(
            BinaryOp::Add,
            Expr::param("x", 0),
            Expr::smi(1),
        ))]);

    let options = CompileOptions::default().with_max_depth(64);
    let module = compile(&program(vec![too_deep, shallow]), &options).unwrap();
    let code_of = |name: &str| {
        module
            .functions
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.code.is_some())
    };
    assert_eq!(code_of("main"), Some(true));
    assert_eq!(code_of("too_deep"), Some(false));
    assert_eq!(code_of("shallow"), Some(true));

    let mut vm = boot_module(&module);
    assert_eq!(vm.call_global("shallow", &[Value::Smi(41)]).unwrap(), Value::Smi(42));
    let err = vm.call_global("too_deep", &[Value::Smi(0)]).unwrap_err();
    assert!(matches!(err, VmError::MissingCode(_)), "{err}");
}

#[test]
fn missing_arguments_read_as_undefined() {
    let mut vm = boot(vec![add()]);
    let result = vm.call_global("add", &[Value::String("only".into())]).unwrap();
    assert_eq!(result, Value::String("onlyundefined".into()));
}

#[test]
fn unsupported_constructs_trap_only_when_reached() {
    // function pattern() { return /a+/g; }
    let pattern = FunctionLiteral::new("pattern").with_body(vec![Stmt::ret(Expr::RegExpLiteral {
        pattern: "a+".into(),
        flags: "g".into(),
    })]);
    let tree = program(vec![pattern, add()]);

    let module = compile(&tree, &CompileOptions::default()).expect("compiles with a trap");
    assert_eq!(module.failed().count(), 0);
    let mut vm = boot_module(&module);
    assert_eq!(
        vm.call_global("add", &[Value::Smi(1), Value::Smi(2)]).unwrap(),
        Value::Smi(3)
    );
    assert_eq!(
        vm.call_global("pattern", &[]),
        Err(VmError::Trap("unsupported: regular expression literal".into()))
    );

    let strict = compile(&tree, &CompileOptions::default().strict()).unwrap_err();
    assert!(
        matches!(strict, plinth_codegen::CodegenError::Unsupported(_)),
        "{strict}"
    );
}
