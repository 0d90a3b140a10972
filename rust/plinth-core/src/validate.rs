//! Structural checks on resolver output.
//!
//! The code generator trusts slot indices and label ids; a tree that breaks
//! them would produce code addressing the wrong frame slot. Trees that come
//! from outside (JSON files) are checked here first.

use thiserror::Error;

use crate::ast::{
    Declaration, Expr, FunctionLiteral, LabelId, PropertyKey, Stmt, Var, VarLocation,
};
use crate::layout::context::MIN_CONTEXT_SLOTS;

#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("in {function}: parameter index {index} out of range ({count} parameters)")]
    ParameterOutOfRange {
        function: String,
        index: u32,
        count: usize,
    },
    #[error("in {function}: local index {index} out of range ({count} locals)")]
    LocalOutOfRange {
        function: String,
        index: u32,
        count: u32,
    },
    #[error("in {function}: context slot {index} out of range ({count} slots)")]
    ContextSlotOutOfRange {
        function: String,
        index: u32,
        count: u32,
    },
    #[error("in {function}: heap slot count {count} is below the context header size")]
    ContextTooSmall { function: String, count: u32 },
    #[error("in {function}: jump to label {label} outside any enclosing statement")]
    UnknownLabel { function: String, label: LabelId },
    #[error("in {function}: continue to label {label}, which is not a loop")]
    ContinueToNonLoop { function: String, label: LabelId },
    #[error("in {function}: switch has more than one default clause")]
    DuplicateDefault { function: String },
}

/// Validates `literal` and every function nested inside it.
pub fn validate(literal: &FunctionLiteral) -> Result<(), TreeError> {
    let mut checker = Checker {
        function: literal,
        labels: Vec::new(),
        nested: Vec::new(),
    };
    checker.check_function()?;
    let nested = std::mem::take(&mut checker.nested);
    for inner in nested {
        validate(inner)?;
    }
    Ok(())
}

struct Checker<'a> {
    function: &'a FunctionLiteral,
    /// Enclosing breakable statements, innermost last, with loop flag.
    labels: Vec<(LabelId, bool)>,
    nested: Vec<&'a FunctionLiteral>,
}

impl<'a> Checker<'a> {
    fn name(&self) -> String {
        self.function.name.clone()
    }

    fn check_function(&mut self) -> Result<(), TreeError> {
        let f = self.function;
        if f.heap_slots > 0 && (f.heap_slots as i32) < MIN_CONTEXT_SLOTS {
            return Err(TreeError::ContextTooSmall {
                function: self.name(),
                count: f.heap_slots,
            });
        }
        for param in &f.params {
            if let Some(slot) = param.context_slot {
                self.check_context_index(slot)?;
            }
        }
        for Declaration { var, function } in &f.declarations {
            self.check_var(var)?;
            if let Some(inner) = function {
                self.nested.push(inner);
            }
        }
        self.check_stmts(&f.body)
    }

    fn check_context_index(&self, index: u32) -> Result<(), TreeError> {
        if index >= self.function.heap_slots || (index as i32) < MIN_CONTEXT_SLOTS {
            return Err(TreeError::ContextSlotOutOfRange {
                function: self.name(),
                index,
                count: self.function.heap_slots,
            });
        }
        Ok(())
    }

    fn check_var(&self, var: &Var) -> Result<(), TreeError> {
        match var.location {
            VarLocation::Parameter(index) if index as usize >= self.function.params.len() => {
                Err(TreeError::ParameterOutOfRange {
                    function: self.name(),
                    index,
                    count: self.function.params.len(),
                })
            }
            VarLocation::Local(index) if index >= self.function.stack_locals => {
                Err(TreeError::LocalOutOfRange {
                    function: self.name(),
                    index,
                    count: self.function.stack_locals,
                })
            }
            VarLocation::Context { depth: 0, index } if self.function.heap_slots > 0 => {
                self.check_context_index(index)
            }
            _ => Ok(()),
        }
    }

    fn check_target(&self, label: LabelId, needs_loop: bool) -> Result<(), TreeError> {
        match self.labels.iter().rev().find(|(id, _)| *id == label) {
            None => Err(TreeError::UnknownLabel {
                function: self.name(),
                label,
            }),
            Some((_, false)) if needs_loop => Err(TreeError::ContinueToNonLoop {
                function: self.name(),
                label,
            }),
            Some(_) => Ok(()),
        }
    }

    fn check_stmts(&mut self, stmts: &'a [Stmt]) -> Result<(), TreeError> {
        stmts.iter().try_for_each(|s| self.check_stmt(s))
    }

    fn in_label<F>(&mut self, label: LabelId, is_loop: bool, f: F) -> Result<(), TreeError>
    where
        F: FnOnce(&mut Self) -> Result<(), TreeError>,
    {
        self.labels.push((label, is_loop));
        let result = f(self);
        self.labels.pop();
        result
    }

    fn check_stmt(&mut self, stmt: &'a Stmt) -> Result<(), TreeError> {
        match stmt {
            Stmt::Expr(e) => self.check_expr(e),
            Stmt::Block { label, body } => match label {
                Some(l) => self.in_label(*l, false, |c| c.check_stmts(body)),
                None => self.check_stmts(body),
            },
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.check_expr(cond)?;
                self.check_stmt(then)?;
                otherwise.as_deref().map_or(Ok(()), |s| self.check_stmt(s))
            }
            Stmt::While { label, cond, body } | Stmt::DoWhile { label, body, cond } => {
                self.check_expr(cond)?;
                self.in_label(*label, true, |c| c.check_stmt(body))
            }
            Stmt::For {
                label,
                init,
                cond,
                next,
                body,
            } => {
                if let Some(init) = init {
                    self.check_stmt(init)?;
                }
                if let Some(cond) = cond {
                    self.check_expr(cond)?;
                }
                self.in_label(*label, true, |c| {
                    if let Some(next) = next {
                        c.check_stmt(next)?;
                    }
                    c.check_stmt(body)
                })
            }
            Stmt::ForIn {
                label,
                each,
                enumerable,
                body,
            } => {
                self.check_expr(each)?;
                self.check_expr(enumerable)?;
                self.in_label(*label, true, |c| c.check_stmt(body))
            }
            Stmt::Switch { label, tag, cases } => {
                self.check_expr(tag)?;
                if cases.iter().filter(|c| c.test.is_none()).count() > 1 {
                    return Err(TreeError::DuplicateDefault {
                        function: self.name(),
                    });
                }
                self.in_label(*label, false, |c| {
                    for case in cases {
                        if let Some(test) = &case.test {
                            c.check_expr(test)?;
                        }
                        c.check_stmts(&case.body)?;
                    }
                    Ok(())
                })
            }
            Stmt::Break(label) => self.check_target(*label, false),
            Stmt::Continue(label) => self.check_target(*label, true),
            Stmt::Return(value) => value.as_ref().map_or(Ok(()), |e| self.check_expr(e)),
            Stmt::TryCatch {
                try_block,
                catch_var,
                catch_block,
            } => {
                self.check_stmts(try_block)?;
                self.check_var(catch_var)?;
                self.check_stmts(catch_block)
            }
            Stmt::TryFinally {
                try_block,
                finally_block,
            } => {
                self.check_stmts(try_block)?;
                self.check_stmts(finally_block)
            }
            Stmt::Empty | Stmt::Debugger => Ok(()),
        }
    }

    fn check_expr(&mut self, expr: &'a Expr) -> Result<(), TreeError> {
        match expr {
            Expr::Literal(_) | Expr::This | Expr::RegExpLiteral { .. } => Ok(()),
            Expr::Var(var) => self.check_var(var),
            Expr::Property { object, key } => {
                self.check_expr(object)?;
                match key {
                    PropertyKey::Named(_) => Ok(()),
                    PropertyKey::Keyed(k) => self.check_expr(k),
                }
            }
            Expr::Assign { target, value, .. } => {
                self.check_expr(target)?;
                self.check_expr(value)
            }
            Expr::Binary { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Compare { left, right, .. } => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            Expr::Unary { operand, .. } => self.check_expr(operand),
            Expr::Count { target, .. } => self.check_expr(target),
            Expr::Throw(value) => self.check_expr(value),
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.check_expr(cond)?;
                self.check_expr(then)?;
                self.check_expr(otherwise)
            }
            Expr::Call { callee, args } | Expr::New { callee, args } => {
                self.check_expr(callee)?;
                args.iter().try_for_each(|a| self.check_expr(a))
            }
            Expr::CallRuntime { args, .. } | Expr::ArrayLiteral(args) => {
                args.iter().try_for_each(|a| self.check_expr(a))
            }
            Expr::ObjectLiteral(props) => props.iter().try_for_each(|(_, v)| self.check_expr(v)),
            Expr::Function(inner) => {
                self.nested.push(inner);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, SwitchCase};

    #[test]
    fn accepts_well_formed_function() {
        let f = FunctionLiteral::new("f")
            .with_params(&["a"])
            .with_locals(1)
            .with_body(vec![
                Stmt::expr(Expr::assign(Expr::local("x", 0), Expr::param("a", 0))),
                Stmt::while_loop(7, Expr::boolean(true), Stmt::Break(7)),
            ]);
        assert_eq!(validate(&f), Ok(()));
    }

    #[test]
    fn rejects_out_of_range_slots() {
        let f = FunctionLiteral::new("f").with_body(vec![Stmt::ret(Expr::local("x", 2))]);
        assert!(matches!(
            validate(&f),
            Err(TreeError::LocalOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn rejects_continue_to_switch() {
        let f = FunctionLiteral::new("f").with_body(vec![Stmt::Switch {
            label: 1,
            tag: Expr::smi(0),
            cases: vec![SwitchCase {
                test: None,
                body: vec![Stmt::Continue(1)],
            }],
        }]);
        assert!(matches!(
            validate(&f),
            Err(TreeError::ContinueToNonLoop { label: 1, .. })
        ));
    }

    #[test]
    fn checks_nested_functions() {
        let inner = FunctionLiteral::new("inner").with_body(vec![Stmt::Break(3)]);
        let outer =
            FunctionLiteral::new("outer").with_body(vec![Stmt::expr(Expr::function(inner))]);
        assert!(matches!(validate(&outer), Err(TreeError::UnknownLabel { label: 3, .. })));
    }

    #[test]
    fn context_parameters_must_fit_the_context() {
        let mut f = FunctionLiteral::new("f").with_heap_slots(6);
        f.params = vec![Param::in_context("a", 9)];
        assert!(matches!(
            validate(&f),
            Err(TreeError::ContextSlotOutOfRange { index: 9, .. })
        ));
    }
}
