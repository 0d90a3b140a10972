//! Code generation benchmarks: compilation throughput on synthetic trees.
//!
//! ```bash
//! cargo bench -p plinth-codegen
//! ```

use std::time::{Duration, Instant};

use plinth_codegen::{compile, CompileOptions};
use plinth_core::ast::{Expr, FunctionLiteral, Stmt, SwitchCase, Var};
use plinth_core::token::{BinaryOp, CompareOp, CountOp};

const ITERATIONS: u32 = 50;

/// `x*3 + x*5 + ...` with `terms` terms.
fn arithmetic(terms: usize) -> FunctionLiteral {
    let mut sum = Expr::param("x", 0);
    for i in 0..terms {
        let factor = [3, 5, 7, 10][i % 4];
        let term = Expr::binary(BinaryOp::Mul, Expr::param("x", 0), Expr::smi(factor));
        sum = Expr::binary(BinaryOp::Add, sum, term);
    }
    FunctionLiteral::new("arithmetic")
        .with_params(&["x"])
        .with_body(vec![Stmt::ret(sum)])
}

/// `count` sequential counting loops.
fn loops(count: usize) -> FunctionLiteral {
    let mut body = vec![Stmt::expr(Expr::assign(Expr::local("acc", 1), Expr::smi(0)))];
    for label in 0..count as u32 {
        body.push(Stmt::For {
            label,
            init: Some(Box::new(Stmt::expr(Expr::assign(Expr::local("i", 0), Expr::smi(0))))),
            cond: Some(Expr::compare(CompareOp::Lt, Expr::local("i", 0), Expr::param("n", 0))),
            next: Some(Box::new(Stmt::expr(Expr::count(CountOp::Inc, false, Expr::local("i", 0))))),
            body: Box::new(Stmt::expr(Expr::compound_assign(
                BinaryOp::Add,
                Expr::local("acc", 1),
                Expr::local("i", 0),
            ))),
        });
    }
    body.push(Stmt::ret(Expr::local("acc", 1)));
    FunctionLiteral::new("loops")
        .with_params(&["n"])
        .with_locals(2)
        .with_body(body)
}

/// A switch with `cases` smi labels and a default in the middle.
fn switch(cases: usize) -> FunctionLiteral {
    let mut clauses: Vec<SwitchCase> = (0..cases as i32)
        .map(|i| SwitchCase {
            test: Some(Expr::smi(i)),
            body: vec![Stmt::ret(Expr::smi(i * 10))],
        })
        .collect();
    clauses.insert(
        cases / 2,
        SwitchCase {
            test: None,
            body: vec![Stmt::Break(0)],
        },
    );
    FunctionLiteral::new("switch")
        .with_params(&["x"])
        .with_body(vec![
            Stmt::Switch {
                label: 0,
                tag: Expr::param("x", 0),
                cases: clauses,
            },
            Stmt::ret(Expr::var(Var::global("fallback"))),
        ])
}

fn compile_once(program: &FunctionLiteral, options: &CompileOptions) -> (usize, Duration) {
    let start = Instant::now();
    let module = compile(program, options).expect("compile");
    let instructions = module
        .functions
        .iter()
        .filter_map(|f| f.code.as_ref())
        .map(|c| c.instructions.len())
        .sum();
    (instructions, start.elapsed())
}

fn run_bench(name: &str, program: &FunctionLiteral) {
    let options = CompileOptions {
        comments: false,
        ..CompileOptions::default()
    };
    let _ = compile_once(program, &options);

    let mut durations = Vec::with_capacity(ITERATIONS as usize);
    let mut instructions = 0;
    for _ in 0..ITERATIONS {
        let (count, elapsed) = compile_once(program, &options);
        instructions = count;
        durations.push(elapsed);
    }
    durations.sort();
    let median = durations[durations.len() / 2];
    let mean: Duration = durations.iter().sum::<Duration>() / ITERATIONS;

    println!("  {name}");
    println!("    instructions: {instructions}");
    println!("    min         : {:.3} ms", durations[0].as_secs_f64() * 1000.0);
    println!("    median      : {:.3} ms", median.as_secs_f64() * 1000.0);
    println!("    mean        : {:.3} ms", mean.as_secs_f64() * 1000.0);
    println!();
}

fn main() {
    println!();
    println!("=== plinth-codegen benchmarks ({ITERATIONS} iterations each) ===");
    println!();
    run_bench("arithmetic (100 terms)", &arithmetic(100));
    run_bench("loops (50 for-loops)", &loops(50));
    run_bench("switch (200 cases)", &switch(200));
}
