//! Plinth CLI library.
//!
//! The `plinth` binary is a thin clap layer over these functions: read a
//! resolved tree from JSON, compile it, list the generated code and run it
//! on the simulator.

pub mod colors;
pub mod config;
pub mod error;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use plinth_codegen::{compile, CompileOptions};
use plinth_core::ast::{Declaration, Expr, FunctionLiteral, Stmt, Var};
use plinth_core::token::{BinaryOp, CompareOp, CountOp};
use plinth_core::Module;
use plinth_vm::{Stats, VmOptions};
use tracing::{debug, info};

use crate::config::{PlinthConfig, CONFIG_FILE};
use crate::error::{CliError, Result};

pub const SAMPLE_TREE_FILE: &str = "example.json";

/// Installs the global subscriber. `PLINTH_LOG` takes an `EnvFilter`
/// directive; the default shows compiler and simulator `info` events.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("PLINTH_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("plinth=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_tree(path: &Path) -> Result<FunctionLiteral> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn compile_tree(tree: &FunctionLiteral, options: &CompileOptions) -> Result<Module> {
    debug!(function = %tree.name, "compiling tree");
    Ok(compile(tree, options)?)
}

/// Per-function listing of a module. Without `disassemble` only the
/// header line of each function is printed.
pub fn render_module(module: &Module, disassemble: bool) -> String {
    let mut out = String::new();
    for function in &module.functions {
        let size = match &function.code {
            Some(code) => format!("{} instructions", code.len()),
            None => "no code".to_string(),
        };
        let _ = writeln!(
            out,
            "function #{} {} (params {}, heap slots {}): {}",
            function.id, function.name, function.parameter_count, function.heap_slots, size
        );
        if disassemble {
            if let Some(code) = &function.code {
                out.push_str(&code.disassemble());
                out.push('\n');
            }
        }
    }
    if !module.stubs.is_empty() {
        let names: Vec<String> = module.stubs.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "stubs: {}", names.join(", "));
    }
    out
}

pub fn render_stats(stats: &Stats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "steps: {}", stats.steps);
    let _ = writeln!(out, "max depth: {}", stats.max_depth);
    let _ = writeln!(out, "write barriers: {}", stats.write_barriers);
    let mut stubs: Vec<(String, u64)> = stats
        .stub_calls
        .iter()
        .map(|(key, count)| (key.to_string(), *count))
        .collect();
    stubs.sort();
    for (key, count) in stubs {
        let _ = writeln!(out, "stub {key}: {count}");
    }
    let mut runtime: Vec<(String, u64)> = stats
        .runtime_calls
        .iter()
        .map(|(function, count)| (function.to_string(), *count))
        .collect();
    runtime.sort();
    for (function, count) in runtime {
        let _ = writeln!(out, "runtime {function}: {count}");
    }
    out
}

/// What a run of `main` left behind.
#[derive(Debug)]
pub struct RunReport {
    pub value: String,
    pub output: Vec<String>,
    pub stats: Stats,
}

pub fn run_tree(tree: &FunctionLiteral, config: &PlinthConfig) -> Result<RunReport> {
    let module = compile_tree(tree, &config.compile)?;
    run_module(&module, config.vm.clone())
}

pub fn run_module(module: &Module, options: VmOptions) -> Result<RunReport> {
    let (value, vm) = plinth_vm::run(module, options)?;
    info!(steps = vm.stats().steps, output_lines = vm.output().len(), "run finished");
    Ok(RunReport {
        value: value.to_string(),
        output: vm.output().to_vec(),
        stats: vm.stats().clone(),
    })
}

/// A small program exercising calls, a loop and the print runtime entry.
pub fn sample_tree() -> FunctionLiteral {
    // function square(x) { return x * x; }
    let square = FunctionLiteral::new("square")
        .with_params(&["x"])
        .with_body(vec![Stmt::ret(Expr::binary(
            BinaryOp::Mul,
            Expr::param("x", 0),
            Expr::param("x", 0),
        ))]);
    // var total = 0, i = 0;
    // while (i < 10) { total += square(i); i++; }
    // print("total", total); return total / 2;
    FunctionLiteral::new("main")
        .with_locals(2)
        .declare(Declaration {
            var: Var::global("square"),
            function: Some(Box::new(square)),
        })
        .with_body(vec![
            Stmt::expr(Expr::assign(Expr::local("total", 0), Expr::smi(0))),
            Stmt::expr(Expr::assign(Expr::local("i", 1), Expr::smi(0))),
            Stmt::while_loop(
                0,
                Expr::compare(CompareOp::Lt, Expr::local("i", 1), Expr::smi(10)),
                Stmt::block(vec![
                    Stmt::expr(Expr::compound_assign(
                        BinaryOp::Add,
                        Expr::local("total", 0),
                        Expr::call(Expr::global("square"), vec![Expr::local("i", 1)]),
                    )),
                    Stmt::expr(Expr::count(CountOp::Inc, false, Expr::local("i", 1))),
                ]),
            ),
            Stmt::expr(Expr::CallRuntime {
                name: "Print".into(),
                args: vec![Expr::string("total"), Expr::local("total", 0)],
            }),
            Stmt::ret(Expr::binary(BinaryOp::Div, Expr::local("total", 0), Expr::smi(2))),
        ])
}

/// Writes `plinth.toml` and a sample tree into `dir`. Existing files are
/// left alone unless `force` is set.
pub fn init(dir: &Path, force: bool) -> Result<Vec<PathBuf>> {
    let config_path = dir.join(CONFIG_FILE);
    let tree_path = dir.join(SAMPLE_TREE_FILE);
    if !force {
        for path in [&config_path, &tree_path] {
            if path.exists() {
                return Err(CliError::Exists(path.clone()));
            }
        }
    }
    let tree = serde_json::to_string_pretty(&sample_tree())
        .map_err(|e| CliError::Serialize(e.to_string()))?;
    write_file(&config_path, PlinthConfig::default_template())?;
    write_file(&tree_path, &tree)?;
    Ok(vec![config_path, tree_path])
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_tree_runs() {
        let report = run_tree(&sample_tree(), &PlinthConfig::default()).unwrap();
        assert_eq!(report.value, "142.5");
        assert_eq!(report.output, ["total 285"]);
        assert_eq!(report.stats.max_depth, 2);
    }

    #[test]
    fn listing_names_every_function() {
        let module = compile_tree(&sample_tree(), &CompileOptions::default()).unwrap();
        let listing = render_module(&module, false);
        assert!(listing.contains("function #0 main (params 0, heap slots 0)"), "{listing}");
        assert!(listing.contains("function #1 square (params 1, heap slots 0)"), "{listing}");
        assert!(!listing.contains("L0:"));
        assert!(render_module(&module, true).contains("L0:"));
    }
}
