//! The host-facing surface: globals, main results, options and limits.

use plinth_codegen::{compile, CompileOptions};
use plinth_core::ast::{Expr, FunctionLiteral, Stmt};
use plinth_core::token::{BinaryOp, CompareOp};
use plinth_vm::{run, Value, Vm, VmError, VmOptions};

fn module(body: Vec<Stmt>) -> plinth_core::Module {
    let main = FunctionLiteral::new("main").with_locals(1).with_body(body);
    compile(&main, &CompileOptions::default()).unwrap()
}

#[test]
fn main_reads_and_writes_globals() {
    // answer = base * 2; return answer + 0.5;
    let m = module(vec![
        Stmt::expr(Expr::assign(
            Expr::global("answer"),
            Expr::binary(BinaryOp::Mul, Expr::global("base"), Expr::smi(2)),
        )),
        Stmt::ret(Expr::binary(BinaryOp::Add, Expr::global("answer"), Expr::number(0.5))),
    ]);
    let mut vm = Vm::new(&m, VmOptions::default()).unwrap();
    vm.set_global("base", &Value::Smi(21)).unwrap();
    assert_eq!(vm.run_main().unwrap(), Value::Number(42.5));
    assert_eq!(vm.get_global("answer").unwrap(), Some(Value::Smi(42)));
    assert_eq!(vm.get_global("nothing").unwrap(), None);
}

#[test]
fn uncaught_errors_describe_name_and_message() {
    let m = module(vec![Stmt::ret(Expr::global("undeclared"))]);
    let err = run(&m, VmOptions::default()).unwrap_err();
    assert_eq!(
        err,
        VmError::Uncaught("ReferenceError: undeclared is not defined".into())
    );
}

#[test]
fn print_collects_output_lines() {
    let m = module(vec![
        Stmt::expr(Expr::CallRuntime {
            name: "Print".into(),
            args: vec![
                Expr::string("sum"),
                Expr::binary(BinaryOp::Add, Expr::smi(1), Expr::smi(2)),
            ],
        }),
        Stmt::ret(Expr::undefined()),
    ]);
    let (value, vm) = run(&m, VmOptions::default()).unwrap();
    assert_eq!(value, Value::Undefined);
    assert_eq!(vm.output(), ["sum 3"]);
}

#[test]
fn infinite_loops_stop_at_the_step_limit() {
    let m = module(vec![Stmt::while_loop(
        0,
        Expr::compare(CompareOp::Eq, Expr::smi(0), Expr::smi(0)),
        Stmt::Empty,
    )]);
    let options = VmOptions {
        max_steps: 10_000,
        ..VmOptions::default()
    };
    let err = run(&m, options).unwrap_err();
    assert_eq!(err, VmError::StepLimit(10_000));
}

#[test]
fn options_load_from_toml() {
    let options =
        VmOptions::from_toml("max_call_depth = 12\nclobber_caller_saved = true\n").unwrap();
    assert_eq!(options.max_call_depth, 12);
    assert!(options.clobber_caller_saved);
    assert_eq!(options.heap_bytes, VmOptions::default().heap_bytes);
}

#[test]
fn results_do_not_depend_on_caller_saved_registers() {
    // s = 0; return k * 3 + (k - 0.25);
    let body = vec![
        Stmt::expr(Expr::assign(Expr::local("s", 0), Expr::smi(0))),
        Stmt::ret(Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Mul, Expr::global("k"), Expr::smi(3)),
            Expr::binary(BinaryOp::Sub, Expr::global("k"), Expr::number(0.25)),
        )),
    ];
    let m = module(body);
    let mut results = Vec::new();
    for clobber in [false, true] {
        let options = VmOptions {
            clobber_caller_saved: clobber,
            ..VmOptions::default()
        };
        let mut vm = Vm::new(&m, options).unwrap();
        vm.set_global("k", &Value::Smi(7)).unwrap();
        results.push(vm.run_main().unwrap());
    }
    assert_eq!(results, [Value::Number(27.75), Value::Number(27.75)]);
}
