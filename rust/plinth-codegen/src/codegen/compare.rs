//! Comparisons and truth tests.
//!
//! Every test here ends in a [`Pending`] condition on the two reserved
//! condition registers, possibly after sending some outcomes straight to the
//! true/false targets.

use plinth_core::ast::{Expr, Literal, VarLocation};
use plinth_core::isa::{Cond, MemOperand, Reg, Root, COND1, COND2};
use plinth_core::layout::{heap_object, instance_type, map, smi_from_int};
use plinth_core::runtime::{RuntimeFunction, StubKey};
use plinth_core::token::{CompareOp, UnaryOp};

use super::CodeGenerator;
use crate::condition::{Branches, Loaded, Pending};
use crate::error::Result;

/// Strings `typeof` can produce and the fast test for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeofCheck {
    Number,
    String,
    Boolean,
    Undefined,
    Function,
    Object,
    /// Never produced by `typeof`; the comparison is statically false.
    Never,
}

impl TypeofCheck {
    fn parse(literal: &str) -> Self {
        match literal {
            "number" => TypeofCheck::Number,
            "string" => TypeofCheck::String,
            "boolean" => TypeofCheck::Boolean,
            "undefined" => TypeofCheck::Undefined,
            "function" => TypeofCheck::Function,
            "object" => TypeofCheck::Object,
            _ => TypeofCheck::Never,
        }
    }
}

impl<'t, 'c> CodeGenerator<'t, 'c> {
    pub(crate) fn visit_compare(
        &mut self,
        op: CompareOp,
        left: &'t Expr,
        right: &'t Expr,
        branches: Branches,
    ) -> Result<Loaded> {
        if let Some(equality) = op.negated_equality() {
            let loaded = self.visit_compare(equality, left, right, branches.swapped())?;
            return Ok(match loaded {
                Loaded::Condition(pending) => Loaded::Condition(pending.negate()),
                other => other,
            });
        }

        if matches!(op, CompareOp::Eq | CompareOp::EqStrict) {
            let strict = op == CompareOp::EqStrict;
            if left.is_null_literal() || right.is_null_literal() {
                let other = if left.is_null_literal() { right } else { left };
                return self.null_compare(other, strict, branches);
            }
            if let (
                Expr::Unary {
                    op: UnaryOp::Typeof,
                    operand,
                },
                Expr::Literal(Literal::String(check)),
            ) = (left, right)
            {
                return self.typeof_compare(operand, TypeofCheck::parse(check), branches);
            }
        }

        match op {
            CompareOp::In => {
                self.load(left)?;
                self.load(right)?;
                self.call_runtime(RuntimeFunction::HasProperty, 2)?;
                self.emit_push(Reg::V0)?;
                Ok(Loaded::Value)
            }
            CompareOp::InstanceOf => {
                self.load(left)?;
                self.load(right)?;
                self.call_stub(StubKey::InstanceOf, 2)?;
                self.masm.mov(COND1, Reg::V0);
                self.masm.mov(COND2, Reg::Zero);
                Ok(Loaded::Condition(Pending::on_cond_regs(Cond::Eq)))
            }
            _ => {
                let (cond, strict) = match op {
                    CompareOp::Eq => (Cond::Eq, false),
                    CompareOp::EqStrict => (Cond::Eq, true),
                    CompareOp::Lt => (Cond::Lt, false),
                    CompareOp::Gt => (Cond::Gt, false),
                    CompareOp::Le => (Cond::Le, false),
                    _ => (Cond::Ge, false),
                };
                self.load(left)?;
                self.load(right)?;
                self.comparison(cond, strict).map(Loaded::Condition)
            }
        }
    }

    /// Compares the two top elements, `left cond right` with `right` on
    /// top. Smi pairs compare inline, everything else goes to the compare
    /// stub.
    pub(crate) fn comparison(&mut self, cond: Cond, strict: bool) -> Result<Pending> {
        // The stub only sees eq, lt and ge.
        let cond = if matches!(cond, Cond::Gt | Cond::Le) {
            self.emit_pop(Reg::A1)?;
            self.emit_pop(Reg::A0)?;
            cond.reverse()
        } else {
            self.emit_pop(Reg::A0)?;
            self.emit_pop(Reg::A1)?;
            cond
        };

        let smi = self.forward_target();
        let exit = self.forward_target();
        self.masm.or(Reg::T0, Reg::A0, Reg::A1);
        self.masm.and(Reg::T1, Reg::T0, 1);
        self.branch(smi, Cond::Eq, Reg::T1, 0)?;

        self.call_stub(StubKey::Compare { cond, strict }, 0)?;
        self.masm.mov(COND1, Reg::V0);
        self.masm.li(COND2, 0);
        self.jump(exit)?;

        self.bind(smi)?;
        self.masm.mov(COND1, Reg::A1);
        self.masm.mov(COND2, Reg::A0);
        self.bind(exit)?;
        Ok(Pending::on_cond_regs(cond))
    }

    /// `x == null` and `x === null`.
    fn null_compare(
        &mut self,
        operand: &'t Expr,
        strict: bool,
        branches: Branches,
    ) -> Result<Loaded> {
        self.masm.comment("[ compare with null");
        self.load(operand)?;
        self.emit_pop(Reg::T0)?;
        self.masm.load_root(Reg::T1, Root::Null);
        if !strict {
            self.branch(branches.on_true, Cond::Eq, Reg::T0, Reg::T1)?;
            self.masm.load_root(Reg::T1, Root::Undefined);
            self.branch(branches.on_true, Cond::Eq, Reg::T0, Reg::T1)?;
            self.masm.and(Reg::T2, Reg::T0, 1);
            self.branch(branches.on_false, Cond::Eq, Reg::T2, 0)?;
            self.load_undetectable_bit(Reg::T0, Reg::T0);
            self.masm.li(Reg::T1, map::IS_UNDETECTABLE as i32);
        }
        self.masm.mov(COND1, Reg::T0);
        self.masm.mov(COND2, Reg::T1);
        Ok(Loaded::Condition(Pending::on_cond_regs(Cond::Eq)))
    }

    /// `dst = map(object).bit_field & IS_UNDETECTABLE`.
    fn load_undetectable_bit(&mut self, dst: Reg, object: Reg) {
        self.masm
            .lw(dst, MemOperand::field(object, heap_object::MAP_OFFSET));
        self.masm
            .lw(dst, MemOperand::field(dst, map::BIT_FIELD_OFFSET));
        self.masm.and(dst, dst, map::IS_UNDETECTABLE as i32);
    }

    /// `typeof x == "literal"` without materializing the type string.
    fn typeof_compare(
        &mut self,
        operand: &'t Expr,
        check: TypeofCheck,
        branches: Branches,
    ) -> Result<Loaded> {
        self.masm.comment("[ typeof compare");
        self.load_typeof_expression(operand)?;
        self.emit_pop(Reg::T1)?;
        let Branches { on_true, on_false } = branches;
        let pending = match check {
            TypeofCheck::Number => {
                self.masm.and(Reg::T2, Reg::T1, 1);
                self.branch(on_true, Cond::Eq, Reg::T2, 0)?;
                self.masm
                    .lw(COND1, MemOperand::field(Reg::T1, heap_object::MAP_OFFSET));
                self.masm.load_root(COND2, Root::HeapNumberMap);
                Pending::on_cond_regs(Cond::Eq)
            }
            TypeofCheck::String => {
                self.masm.and(Reg::T2, Reg::T1, 1);
                self.branch(on_false, Cond::Eq, Reg::T2, 0)?;
                self.load_undetectable_bit(Reg::T2, Reg::T1);
                self.branch(on_false, Cond::Ne, Reg::T2, 0)?;
                self.load_instance_type(COND1, Reg::T1);
                self.masm.li(COND2, instance_type::FIRST_NONSTRING as i32);
                Pending::on_cond_regs(Cond::Lt)
            }
            TypeofCheck::Boolean => {
                self.masm.load_root(Reg::T2, Root::True);
                self.branch(on_true, Cond::Eq, Reg::T1, Reg::T2)?;
                self.masm.mov(COND1, Reg::T1);
                self.masm.load_root(COND2, Root::False);
                Pending::on_cond_regs(Cond::Eq)
            }
            TypeofCheck::Undefined => {
                self.masm.load_root(Reg::T2, Root::Undefined);
                self.branch(on_true, Cond::Eq, Reg::T1, Reg::T2)?;
                self.masm.and(Reg::T3, Reg::T1, 1);
                self.branch(on_false, Cond::Eq, Reg::T3, 0)?;
                self.load_undetectable_bit(COND1, Reg::T1);
                self.masm.li(COND2, map::IS_UNDETECTABLE as i32);
                Pending::on_cond_regs(Cond::Eq)
            }
            TypeofCheck::Function => {
                self.masm.and(Reg::T2, Reg::T1, 1);
                self.branch(on_false, Cond::Eq, Reg::T2, 0)?;
                self.load_instance_type(COND1, Reg::T1);
                self.masm.li(COND2, instance_type::JS_FUNCTION as i32);
                Pending::on_cond_regs(Cond::Eq)
            }
            TypeofCheck::Object => {
                self.masm.and(Reg::T2, Reg::T1, 1);
                self.branch(on_false, Cond::Eq, Reg::T2, 0)?;
                self.masm.load_root(Reg::T2, Root::Null);
                self.branch(on_true, Cond::Eq, Reg::T1, Reg::T2)?;
                self.load_undetectable_bit(Reg::T2, Reg::T1);
                self.branch(on_false, Cond::Ne, Reg::T2, 0)?;
                self.load_instance_type(Reg::T2, Reg::T1);
                self.branch(
                    on_false,
                    Cond::Lt,
                    Reg::T2,
                    instance_type::FIRST_JS_OBJECT as i32,
                )?;
                self.masm.mov(COND1, Reg::T2);
                self.masm.li(COND2, instance_type::LAST_JS_OBJECT as i32);
                Pending::on_cond_regs(Cond::Le)
            }
            TypeofCheck::Never => {
                self.jump(on_false)?;
                return Ok(Loaded::Value);
            }
        };
        Ok(Loaded::Condition(pending))
    }

    /// `dst = map(object).instance_type`.
    pub(crate) fn load_instance_type(&mut self, dst: Reg, object: Reg) {
        self.masm
            .lw(dst, MemOperand::field(object, heap_object::MAP_OFFSET));
        self.masm
            .lw(dst, MemOperand::field(dst, map::INSTANCE_TYPE_OFFSET));
    }

    /// Loads the operand of `typeof`. An undeclared global must not throw,
    /// so globals are read as plain properties of the global object.
    pub(crate) fn load_typeof_expression(&mut self, expr: &'t Expr) -> Result<()> {
        match expr {
            Expr::Var(var) if var.location == VarLocation::Global => {
                self.load_global()?;
                self.load_string(Reg::A2, &var.name);
                self.call_stub(StubKey::LoadIc { contextual: false }, 0)?;
                self.drop(1)?;
                self.emit_push(Reg::V0)
            }
            _ => self.load(expr),
        }
    }

    /// Pops the top element and tests its truth value. Common values are
    /// decided inline; the rest go through the runtime.
    pub(crate) fn to_boolean(&mut self, branches: Branches) -> Result<Pending> {
        let Branches { on_true, on_false } = branches;
        self.emit_pop(Reg::T0)?;
        self.masm.load_root(Reg::T1, Root::False);
        self.branch(on_false, Cond::Eq, Reg::T0, Reg::T1)?;
        self.masm.load_root(Reg::T2, Root::True);
        self.branch(on_true, Cond::Eq, Reg::T0, Reg::T2)?;
        self.masm.load_root(Reg::T3, Root::Undefined);
        self.branch(on_false, Cond::Eq, Reg::T0, Reg::T3)?;
        self.branch(on_false, Cond::Eq, Reg::T0, smi_from_int(0) as i32)?;
        self.masm.and(Reg::T4, Reg::T0, 1);
        self.branch(on_true, Cond::Eq, Reg::T4, 0)?;

        self.emit_push(Reg::T0)?;
        self.call_runtime(RuntimeFunction::ToBool, 1)?;
        self.masm.load_root(COND1, Root::False);
        self.masm.mov(COND2, Reg::V0);
        Ok(Pending::on_cond_regs(Cond::Ne))
    }
}
