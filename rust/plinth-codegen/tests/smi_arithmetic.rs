//! Inline smi arithmetic against a literal must agree with the generic
//! stub, including at the edges of the smi range.

use plinth_codegen::{compile, CompileOptions};
use plinth_core::ast::{Declaration, Expr, FunctionLiteral, Stmt, Var};
use plinth_core::layout::{SMI_MAX, SMI_MIN};
use plinth_core::token::BinaryOp;
use plinth_core::MajorKey;
use plinth_vm::value::{to_int32, to_uint32};
use plinth_vm::{Value, Vm, VmOptions};

const OPERATORS: [BinaryOp; 10] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::BitAnd,
    BinaryOp::BitOr,
    BinaryOp::BitXor,
    BinaryOp::Shl,
    BinaryOp::Sar,
    BinaryOp::Shr,
    BinaryOp::Mod,
];

const OPERANDS: [i32; 12] = [
    0,
    1,
    -1,
    7,
    -7,
    100,
    1 << 20,
    -(1 << 20),
    SMI_MAX,
    SMI_MAX - 1,
    SMI_MIN,
    SMI_MIN + 1,
];

const CONSTANTS: [i32; 16] = [
    0, 1, 2, 3, 5, 7, 8, 10, 11, 31, 32, -1, -3, 1000, SMI_MAX, SMI_MIN,
];

fn reference(op: BinaryOp, a: f64, b: f64) -> f64 {
    let shift = to_uint32(b) & 0x1f;
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Mod => a % b,
        BinaryOp::BitAnd => f64::from(to_int32(a) & to_int32(b)),
        BinaryOp::BitOr => f64::from(to_int32(a) | to_int32(b)),
        BinaryOp::BitXor => f64::from(to_int32(a) ^ to_int32(b)),
        BinaryOp::Shl => f64::from(to_int32(a).wrapping_shl(shift)),
        BinaryOp::Sar => f64::from(to_int32(a) >> shift),
        BinaryOp::Shr => f64::from(to_uint32(a) >> shift),
        other => panic!("no reference for {other}"),
    }
}

fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a == b,
    }
}

fn function(name: String, params: &[&str], body: Expr) -> Declaration {
    let literal = FunctionLiteral::new(name.clone())
        .with_params(params)
        .with_body(vec![Stmt::ret(body)]);
    Declaration {
        var: Var::global(&name),
        function: Some(Box::new(literal)),
    }
}

/// One function per operator and constant in each operand order, plus one
/// per operator with both operands as parameters.
fn arithmetic_program() -> FunctionLiteral {
    let mut main = FunctionLiteral::new("main");
    for (i, &op) in OPERATORS.iter().enumerate() {
        main = main.declare(function(
            format!("generic_{i}"),
            &["x", "y"],
            Expr::binary(op, Expr::param("x", 0), Expr::param("y", 1)),
        ));
        for (j, &k) in CONSTANTS.iter().enumerate() {
            main = main.declare(function(
                format!("right_{i}_{j}"),
                &["x"],
                Expr::binary(op, Expr::param("x", 0), Expr::smi(k)),
            ));
            main = main.declare(function(
                format!("left_{i}_{j}"),
                &["x"],
                Expr::binary(op, Expr::smi(k), Expr::param("x", 0)),
            ));
        }
    }
    main
}

fn boot() -> Vm {
    let module = compile(&arithmetic_program(), &CompileOptions::default()).unwrap();
    let mut vm = Vm::new(&module, VmOptions::default()).unwrap();
    vm.run_main().unwrap();
    vm
}

#[test]
fn literal_operands_match_the_generic_path() {
    let mut vm = boot();
    for (i, &op) in OPERATORS.iter().enumerate() {
        for (j, &k) in CONSTANTS.iter().enumerate() {
            for &x in &OPERANDS {
                let (xs, ks) = (Value::Smi(x), Value::Smi(k));
                let fast = vm.call_global(&format!("right_{i}_{j}"), &[xs.clone()]).unwrap();
                let slow = vm
                    .call_global(&format!("generic_{i}"), &[xs.clone(), ks.clone()])
                    .unwrap();
                assert!(same(&fast, &slow), "{x} {op} {k}: {fast:?} vs {slow:?}");
                let expected = reference(op, f64::from(x), f64::from(k));
                let got = fast.as_f64().unwrap();
                assert!(
                    got == expected || (got.is_nan() && expected.is_nan()),
                    "{x} {op} {k}: {got} vs {expected}"
                );

                let fast = vm.call_global(&format!("left_{i}_{j}"), &[xs.clone()]).unwrap();
                let slow = vm.call_global(&format!("generic_{i}"), &[ks, xs]).unwrap();
                assert!(same(&fast, &slow), "{k} {op} {x}: {fast:?} vs {slow:?}");
                let expected = reference(op, f64::from(k), f64::from(x));
                let got = fast.as_f64().unwrap();
                assert!(
                    got == expected || (got.is_nan() && expected.is_nan()),
                    "{k} {op} {x}: {got} vs {expected}"
                );
            }
        }
    }
}

#[test]
fn results_outside_the_smi_range_are_boxed() {
    let mut vm = boot();
    let add = OPERATORS.iter().position(|&op| op == BinaryOp::Add).unwrap();
    let one = CONSTANTS.iter().position(|&k| k == 1).unwrap();
    let before = vm.stats().stub_calls_of(MajorKey::GenericBinaryOp);

    let inside = vm
        .call_global(&format!("right_{add}_{one}"), &[Value::Smi(SMI_MAX - 1)])
        .unwrap();
    assert_eq!(inside, Value::Smi(SMI_MAX));
    assert_eq!(vm.stats().stub_calls_of(MajorKey::GenericBinaryOp), before);

    let outside = vm
        .call_global(&format!("right_{add}_{one}"), &[Value::Smi(SMI_MAX)])
        .unwrap();
    assert_eq!(outside, Value::Number(f64::from(SMI_MAX) + 1.0));
    assert_eq!(vm.stats().stub_calls_of(MajorKey::GenericBinaryOp), before + 1);
}

#[test]
fn unsigned_shift_of_a_negative_number_is_boxed() {
    let mut vm = boot();
    let shr = OPERATORS.iter().position(|&op| op == BinaryOp::Shr).unwrap();
    let zero = CONSTANTS.iter().position(|&k| k == 0).unwrap();
    let result = vm
        .call_global(&format!("right_{shr}_{zero}"), &[Value::Smi(-1)])
        .unwrap();
    assert_eq!(result, Value::Number(4_294_967_295.0));
}
