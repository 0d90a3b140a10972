//! Compilation driver.
//!
//! Compiles the outermost function literal first, then every nested literal
//! in the order its closure instantiation was emitted. A function that
//! fails to compile gets no code; its siblings are unaffected.

use std::collections::VecDeque;

use plinth_core::ast::FunctionLiteral;
use plinth_core::module::{CompiledFunction, FunctionId, Module};
use plinth_core::validate::validate;
use tracing::{debug, info, warn};

use crate::codegen::CodeGenerator;
use crate::error::{CodegenError, Result};
use crate::options::CompileOptions;
use crate::stubs::StubCache;

/// Function literals waiting for compilation, numbered in enqueue order.
#[derive(Debug, Default)]
pub struct FunctionQueue<'t> {
    pending: VecDeque<(FunctionId, &'t FunctionLiteral)>,
    next_id: FunctionId,
}

impl<'t> FunctionQueue<'t> {
    pub fn enqueue(&mut self, literal: &'t FunctionLiteral) -> FunctionId {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push_back((id, literal));
        id
    }

    fn next(&mut self) -> Option<(FunctionId, &'t FunctionLiteral)> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Validates and compiles one literal on its own. Nested literals are
/// numbered but not compiled.
pub fn compile_function(
    literal: &FunctionLiteral,
    options: &CompileOptions,
) -> Result<plinth_core::isa::Code> {
    validate(literal)?;
    let mut queue = FunctionQueue::default();
    queue.enqueue(literal);
    CodeGenerator::new(literal, options, &mut queue).generate()
}

/// Validates the tree and compiles it into a module.
///
/// Only an invalid tree fails the whole module. Per-function failures are
/// logged and leave that function's `code` empty; with
/// `strict_unsupported` set an unsupported construct fails the module.
pub fn compile(program: &FunctionLiteral, options: &CompileOptions) -> Result<Module> {
    validate(program)?;

    let mut queue = FunctionQueue::default();
    queue.enqueue(program);
    let mut functions = Vec::new();
    let mut stubs = StubCache::default();

    while let Some((id, literal)) = queue.next() {
        let result = CodeGenerator::new(literal, options, &mut queue).generate();
        let code = match result {
            Ok(code) => {
                debug!(
                    function = %literal.name,
                    id,
                    instructions = code.instructions.len(),
                    "compiled"
                );
                stubs.record(&code);
                Some(code)
            }
            Err(err @ CodegenError::StackOverflow { .. }) => {
                warn!(function = %literal.name, id, error = %err, "no code generated");
                None
            }
            Err(err @ CodegenError::Unsupported(_)) if options.strict_unsupported => {
                return Err(err);
            }
            Err(err) => {
                warn!(function = %literal.name, id, error = %err, "compilation failed");
                None
            }
        };
        functions.push(CompiledFunction {
            id,
            name: literal.name.clone(),
            parameter_count: literal.params.len() as u32,
            heap_slots: literal.heap_slots,
            code,
        });
    }

    info!(
        functions = functions.len(),
        stubs = stubs.len(),
        "module compiled"
    );
    Ok(Module {
        functions,
        stubs: stubs.into_keys(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::ast::{Declaration, Expr, Stmt, Var};

    #[test]
    fn queue_numbers_in_enqueue_order() {
        let a = FunctionLiteral::new("a");
        let b = FunctionLiteral::new("b");
        let mut queue = FunctionQueue::default();
        assert_eq!(queue.enqueue(&a), 0);
        assert_eq!(queue.enqueue(&b), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next().map(|(id, f)| (id, f.name.as_str())), Some((0, "a")));
    }

    #[test]
    fn nested_functions_get_their_own_code() {
        let inner = FunctionLiteral::new("inner").with_body(vec![Stmt::ret(Expr::smi(7))]);
        let outer = FunctionLiteral::new("outer")
            .with_locals(1)
            .declare(Declaration {
                var: Var::local("inner", 0),
                function: Some(Box::new(inner)),
            })
            .with_body(vec![Stmt::ret(Expr::local("inner", 0))]);
        let module = compile(&outer, &CompileOptions::default()).expect("compile");
        assert_eq!(module.functions.len(), 2);
        assert_eq!(module.function_by_name("inner").map(|f| f.id), Some(1));
        assert_eq!(module.failed().count(), 0);
    }

    #[test]
    fn deep_trees_fail_only_their_function() {
        let mut deep = Expr::smi(1);
        for _ in 0..50 {
            deep = Expr::binary(plinth_core::token::BinaryOp::Add, deep, Expr::param("x", 0));
        }
        let inner = FunctionLiteral::new("deep")
            .with_params(&["x"])
            .with_body(vec![Stmt::ret(deep)]);
        let outer = FunctionLiteral::new("outer")
            .with_locals(1)
            .declare(Declaration {
                var: Var::local("deep", 0),
                function: Some(Box::new(inner)),
            })
            .with_body(vec![Stmt::ret(Expr::smi(1))]);
        let options = CompileOptions::default().with_max_depth(20);
        let module = compile(&outer, &options).expect("compile");
        let failed: Vec<_> = module.failed().map(|f| f.name.as_str()).collect();
        assert_eq!(failed, vec!["deep"]);
        assert!(module.function_by_name("outer").and_then(|f| f.code.as_ref()).is_some());
    }

    #[test]
    fn single_functions_are_validated_too() {
        let broken = FunctionLiteral::new("broken")
            .with_params(&["x"])
            .with_body(vec![Stmt::ret(Expr::param("x", 3))]);
        let err = compile_function(&broken, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, CodegenError::InvalidTree(_)), "{err}");

        let fine = FunctionLiteral::new("fine")
            .with_params(&["x"])
            .with_body(vec![Stmt::ret(Expr::param("x", 0))]);
        assert!(compile_function(&fine, &CompileOptions::default()).is_ok());
    }
}
