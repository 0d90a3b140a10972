//! Trees as the CLI reads them (JSON) and every binary operator through
//! the full pipeline.

use std::collections::HashSet;

use plinth_codegen::{compile, CompileOptions};
use plinth_core::ast::{Declaration, Expr, FunctionLiteral, Stmt, Var};
use plinth_core::token::BinaryOp;
use plinth_core::Module;
use plinth_vm::{run, Value, Vm, VmOptions};
use strum::IntoEnumIterator;

const PRODUCT_TREE: &str = r#"{
  "name": "main",
  "params": [],
  "stack_locals": 0,
  "heap_slots": 0,
  "body": [
    {
      "return": {
        "binary": {
          "op": "mul",
          "left": { "literal": { "number": 6.0 } },
          "right": { "literal": { "number": 7.0 } }
        }
      }
    }
  ]
}"#;

#[test]
fn json_trees_compile_and_run() {
    let tree: FunctionLiteral = serde_json::from_str(PRODUCT_TREE).expect("valid tree");
    assert_eq!(tree.declarations, vec![]);
    let module = compile(&tree, &CompileOptions::default()).unwrap();
    let (value, _) = run(&module, VmOptions::default()).unwrap();
    assert_eq!(value, Value::Smi(42));
}

#[test]
fn compiled_modules_survive_json() {
    let tree: FunctionLiteral = serde_json::from_str(PRODUCT_TREE).unwrap();
    let module = compile(&tree, &CompileOptions::default()).unwrap();
    let text = serde_json::to_string(&module).unwrap();
    let reloaded: Module = serde_json::from_str(&text).unwrap();
    let (value, _) = run(&reloaded, VmOptions::default()).unwrap();
    assert_eq!(value, Value::Smi(42));
}

fn expected(op: BinaryOp) -> Value {
    // 12 op 5
    match op {
        BinaryOp::Add => Value::Smi(17),
        BinaryOp::Sub => Value::Smi(7),
        BinaryOp::Mul => Value::Smi(60),
        BinaryOp::Div => Value::Number(2.4),
        BinaryOp::Mod => Value::Smi(2),
        BinaryOp::BitOr => Value::Smi(13),
        BinaryOp::BitAnd => Value::Smi(4),
        BinaryOp::BitXor => Value::Smi(9),
        BinaryOp::Shl => Value::Smi(384),
        BinaryOp::Sar => Value::Smi(0),
        BinaryOp::Shr => Value::Smi(0),
        BinaryOp::Comma => Value::Smi(5),
    }
}

#[test]
fn every_binary_operator_runs() {
    let main = BinaryOp::iter().enumerate().fold(FunctionLiteral::new("main"), |main, (i, op)| {
        let name = format!("op_{i}");
        let literal = FunctionLiteral::new(name.clone())
            .with_params(&["a", "b"])
            .with_body(vec![Stmt::ret(Expr::binary(
                op,
                Expr::param("a", 0),
                Expr::param("b", 1),
            ))]);
        main.declare(Declaration {
            var: Var::global(&name),
            function: Some(Box::new(literal)),
        })
    });
    let module = compile(&main, &CompileOptions::default()).unwrap();
    let distinct: HashSet<_> = module.stubs.iter().collect();
    assert_eq!(distinct.len(), module.stubs.len(), "stub list repeats a key");

    let mut vm = Vm::new(&module, VmOptions::default()).unwrap();
    vm.run_main().unwrap();
    for (i, op) in BinaryOp::iter().enumerate() {
        let result = vm
            .call_global(&format!("op_{i}"), &[Value::Smi(12), Value::Smi(5)])
            .unwrap();
        assert_eq!(result, expected(op), "12 {op} 5");
    }
}
