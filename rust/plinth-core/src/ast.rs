//! Resolved input tree.
//!
//! The parser and scope resolver run before code generation: every variable
//! reference already says where the variable lives, every breakable
//! statement carries the id its `break`/`continue` statements use, and every
//! function literal knows its declarations and frame requirements. The tree
//! serializes with serde so it can be handed over as JSON.

use serde::{Deserialize, Serialize};

use crate::token::{BinaryOp, CompareOp, CountOp, LogicalOp, UnaryOp};

/// Identifier of a breakable statement, assigned by the resolver.
pub type LabelId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionLiteral {
    pub name: String,
    pub params: Vec<Param>,
    /// Stack-allocated locals, all initialized to `undefined`.
    pub stack_locals: u32,
    /// Context slots including the fixed header; zero if nothing escapes.
    pub heap_slots: u32,
    /// Hoisted `var` and function declarations.
    #[serde(default)]
    pub declarations: Vec<Declaration>,
    pub body: Vec<Stmt>,
}

impl FunctionLiteral {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            stack_locals: 0,
            heap_slots: 0,
            declarations: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_params(mut self, names: &[&str]) -> Self {
        self.params = names.iter().map(|n| Param::stack(n)).collect();
        self
    }

    pub fn with_locals(mut self, count: u32) -> Self {
        self.stack_locals = count;
        self
    }

    pub fn with_heap_slots(mut self, count: u32) -> Self {
        self.heap_slots = count;
        self
    }

    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }

    pub fn declare(mut self, declaration: Declaration) -> Self {
        self.declarations.push(declaration);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    /// Set when the parameter is captured and lives in the context.
    #[serde(default)]
    pub context_slot: Option<u32>,
}

impl Param {
    pub fn stack(name: &str) -> Self {
        Self {
            name: name.to_string(),
            context_slot: None,
        }
    }

    pub fn in_context(name: &str, slot: u32) -> Self {
        Self {
            name: name.to_string(),
            context_slot: Some(slot),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub var: Var,
    #[serde(default)]
    pub function: Option<Box<FunctionLiteral>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Var {
    pub name: String,
    pub location: VarLocation,
}

/// Where the resolver placed a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarLocation {
    Parameter(u32),
    Local(u32),
    /// `depth` counts context hops outward from the current context register.
    Context {
        depth: u32,
        index: u32,
    },
    /// Property of the global object.
    Global,
    /// Needs a dynamic scope lookup (inside `with` or next to `eval`).
    Lookup,
}

impl Var {
    pub fn parameter(name: &str, index: u32) -> Self {
        Self::at(name, VarLocation::Parameter(index))
    }

    pub fn local(name: &str, index: u32) -> Self {
        Self::at(name, VarLocation::Local(index))
    }

    pub fn context(name: &str, depth: u32, index: u32) -> Self {
        Self::at(name, VarLocation::Context { depth, index })
    }

    pub fn global(name: &str) -> Self {
        Self::at(name, VarLocation::Global)
    }

    fn at(name: &str, location: VarLocation) -> Self {
        Self {
            name: name.to_string(),
            location,
        }
    }

    pub fn is_global(&self) -> bool {
        self.location == VarLocation::Global
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Number(f64),
    String(String),
    True,
    False,
    Null,
    Undefined,
}

impl Literal {
    /// The small-integer value of a numeric literal, if it has one.
    pub fn as_smi(&self) -> Option<i32> {
        match self {
            Literal::Number(n) => {
                let is_integral = n.fract() == 0.0 && !(*n == 0.0 && n.is_sign_negative());
                let in_range = crate::layout::is_valid_smi(*n as i64) && n.abs() < 2f64.powi(31);
                if is_integral && in_range {
                    Some(*n as i32)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Truthiness known without running anything.
    pub fn to_boolean(&self) -> bool {
        match self {
            Literal::Number(n) => *n != 0.0 && !n.is_nan(),
            Literal::String(s) => !s.is_empty(),
            Literal::True => true,
            Literal::False | Literal::Null | Literal::Undefined => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKey {
    Named(String),
    Keyed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Literal),
    Var(Var),
    This,
    Property {
        object: Box<Expr>,
        key: PropertyKey,
    },
    /// `target = value`, or `target op= value` when `op` is set.
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Count {
        op: CountOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Function(Box<FunctionLiteral>),
    ObjectLiteral(Vec<(String, Expr)>),
    ArrayLiteral(Vec<Expr>),
    RegExpLiteral {
        pattern: String,
        flags: String,
    },
    Throw(Box<Expr>),
    /// `%name(args)`: an inline intrinsic when `name` starts with `_`,
    /// otherwise a runtime entry point.
    CallRuntime {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn number(n: f64) -> Self {
        Expr::Literal(Literal::Number(n))
    }

    pub fn smi(n: i32) -> Self {
        Expr::number(n as f64)
    }

    pub fn string(s: &str) -> Self {
        Expr::Literal(Literal::String(s.to_string()))
    }

    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    pub fn undefined() -> Self {
        Expr::Literal(Literal::Undefined)
    }

    pub fn boolean(b: bool) -> Self {
        Expr::Literal(if b { Literal::True } else { Literal::False })
    }

    pub fn var(var: Var) -> Self {
        Expr::Var(var)
    }

    pub fn param(name: &str, index: u32) -> Self {
        Expr::Var(Var::parameter(name, index))
    }

    pub fn local(name: &str, index: u32) -> Self {
        Expr::Var(Var::local(name, index))
    }

    pub fn global(name: &str) -> Self {
        Expr::Var(Var::global(name))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Self {
        Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            op: None,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn compound_assign(op: BinaryOp, target: Expr, value: Expr) -> Self {
        Expr::Assign {
            op: Some(op),
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn count(op: CountOp, prefix: bool, target: Expr) -> Self {
        Expr::Count {
            op,
            prefix,
            target: Box::new(target),
        }
    }

    pub fn named(object: Expr, name: &str) -> Self {
        Expr::Property {
            object: Box::new(object),
            key: PropertyKey::Named(name.to_string()),
        }
    }

    pub fn keyed(object: Expr, key: Expr) -> Self {
        Expr::Property {
            object: Box::new(object),
            key: PropertyKey::Keyed(Box::new(key)),
        }
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn function(literal: FunctionLiteral) -> Self {
        Expr::Function(Box::new(literal))
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn as_smi_literal(&self) -> Option<i32> {
        self.as_literal().and_then(Literal::as_smi)
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self, Expr::Literal(Literal::Null))
    }

    /// True for arithmetic results the operation may reuse storage for.
    pub fn result_overwrite_allowed(&self) -> bool {
        matches!(self, Expr::Binary { op, .. } if *op != BinaryOp::Comma)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for the `default` clause.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    Expr(Expr),
    Block {
        label: Option<LabelId>,
        body: Vec<Stmt>,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        label: LabelId,
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        label: LabelId,
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        label: LabelId,
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        next: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    ForIn {
        label: LabelId,
        each: Expr,
        enumerable: Expr,
        body: Box<Stmt>,
    },
    Switch {
        label: LabelId,
        tag: Expr,
        cases: Vec<SwitchCase>,
    },
    Break(LabelId),
    Continue(LabelId),
    Return(Option<Expr>),
    TryCatch {
        try_block: Vec<Stmt>,
        catch_var: Var,
        catch_block: Vec<Stmt>,
    },
    TryFinally {
        try_block: Vec<Stmt>,
        finally_block: Vec<Stmt>,
    },
    Empty,
    Debugger,
}

impl Stmt {
    pub fn expr(e: Expr) -> Self {
        Stmt::Expr(e)
    }

    pub fn ret(e: Expr) -> Self {
        Stmt::Return(Some(e))
    }

    pub fn block(body: Vec<Stmt>) -> Self {
        Stmt::Block { label: None, body }
    }

    pub fn if_else(cond: Expr, then: Stmt, otherwise: Option<Stmt>) -> Self {
        Stmt::If {
            cond,
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        }
    }

    pub fn while_loop(label: LabelId, cond: Expr, body: Stmt) -> Self {
        Stmt::While {
            label,
            cond,
            body: Box::new(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smi_literals_exclude_fractions_and_negative_zero() {
        assert_eq!(Literal::Number(7.0).as_smi(), Some(7));
        assert_eq!(Literal::Number(-0.0).as_smi(), None);
        assert_eq!(Literal::Number(1.5).as_smi(), None);
        assert_eq!(Literal::Number(1073741824.0).as_smi(), None);
        assert_eq!(Literal::Number(-1073741824.0).as_smi(), Some(-1073741824));
    }

    #[test]
    fn tree_round_trips_through_json() {
        let f = FunctionLiteral::new("f")
            .with_params(&["a", "b"])
            .with_body(vec![Stmt::ret(Expr::binary(
                BinaryOp::Add,
                Expr::param("a", 0),
                Expr::param("b", 1),
            ))]);
        let json = serde_json::to_string(&f).expect("serialize");
        let back: FunctionLiteral = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, f);
    }

    #[test]
    fn literal_truthiness() {
        assert!(!Literal::Number(0.0).to_boolean());
        assert!(!Literal::Number(f64::NAN).to_boolean());
        assert!(Literal::String("x".into()).to_boolean());
        assert!(!Literal::Null.to_boolean());
    }
}
