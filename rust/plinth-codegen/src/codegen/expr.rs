//! Expression visitors.

use std::str::FromStr;

use plinth_core::ast::{Expr, Literal, PropertyKey, VarLocation};
use plinth_core::isa::{Cond, ConstValue, Constant, MemOperand, Reg, Root, COND1, COND2};
use plinth_core::layout::{
    field_offset, fixed_array, instance_type, js_object, map, smi_from_int, SMI_MAX, SMI_MIN,
};
use plinth_core::runtime::{OverwriteMode, RuntimeFunction, StubKey};
use plinth_core::token::{BinaryOp, CountOp, LogicalOp, UnaryOp};

use super::CodeGenerator;
use crate::condition::{Branches, Loaded, Pending};
use crate::deferred::Preserve;
use crate::error::{CodegenError, Result};
use crate::frame::{FrameElement, Imm};

/// Boilerplate entry for a literal value, or the hole when the value is
/// computed at run time.
fn boilerplate_value(expr: &Expr) -> ConstValue {
    let Some(literal) = expr.as_literal() else {
        return ConstValue::Hole;
    };
    match literal {
        Literal::Number(n) => match literal.as_smi() {
            Some(v) => ConstValue::Smi(v),
            None => ConstValue::Number(*n),
        },
        Literal::String(s) => ConstValue::String(s.clone()),
        Literal::True => ConstValue::True,
        Literal::False => ConstValue::False,
        Literal::Null => ConstValue::Null,
        Literal::Undefined => ConstValue::Undefined,
    }
}

fn argument_count(args: &[Expr]) -> Result<u8> {
    u8::try_from(args.len())
        .map_err(|_| CodegenError::Unsupported(format!("call with {} arguments", args.len())))
}

impl<'t, 'c> CodeGenerator<'t, 'c> {
    pub(super) fn visit_expr_inner(
        &mut self,
        expr: &'t Expr,
        branches: Branches,
    ) -> Result<Loaded> {
        match expr {
            Expr::Literal(literal) => self.push_literal(literal)?,
            Expr::Var(_) | Expr::Property { .. } => {
                let mut reference = self.load_reference(expr, false)?;
                self.get_value(&mut reference)?;
            }
            Expr::This => {
                let receiver = self.frame()?.receiver();
                self.masm.lw(Reg::V0, receiver);
                self.emit_push(Reg::V0)?;
            }
            Expr::Assign { op, target, value } => self.visit_assignment(*op, target, value)?,
            Expr::Binary {
                op: BinaryOp::Comma,
                left,
                right,
            } => {
                self.load(left)?;
                self.drop(1)?;
                return self.visit_expr(right, branches);
            }
            Expr::Binary { op, left, right } => self.visit_binary(*op, left, right)?,
            Expr::Logical { op, left, right } => {
                return self.visit_logical(*op, left, right, branches)
            }
            Expr::Compare { op, left, right } => {
                return self.visit_compare(*op, left, right, branches)
            }
            Expr::Unary { op, operand } => return self.visit_unary(*op, operand, branches),
            Expr::Count {
                op,
                prefix,
                target,
            } => self.visit_count(*op, *prefix, target)?,
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => self.visit_conditional(cond, then, otherwise)?,
            Expr::Call { callee, args } => self.visit_call(callee, args)?,
            Expr::New { callee, args } => self.visit_new(callee, args)?,
            Expr::Function(literal) => self.instantiate_function(literal)?,
            Expr::ObjectLiteral(properties) => self.visit_object_literal(properties)?,
            Expr::ArrayLiteral(values) => self.visit_array_literal(values)?,
            Expr::RegExpLiteral { .. } => {
                self.unsupported("regular expression literal")?;
                self.push_smi(0)?;
            }
            Expr::Throw(exception) => {
                self.masm.comment("[ throw");
                self.load(exception)?;
                self.call_runtime(RuntimeFunction::Throw, 1)?;
                self.emit_push(Reg::V0)?;
            }
            Expr::CallRuntime { name, args } => {
                return self.visit_call_runtime(name, args, branches)
            }
        }
        Ok(Loaded::Value)
    }

    fn push_literal(&mut self, literal: &Literal) -> Result<()> {
        match literal {
            Literal::Number(n) => match literal.as_smi() {
                Some(value) => self.push_smi(value),
                None => {
                    let id = self.masm.constant(Constant::Number(*n));
                    self.push_constant(Imm::Handle(id))
                }
            },
            Literal::String(s) => self.push_string(s),
            Literal::True => self.push_root(Root::True),
            Literal::False => self.push_root(Root::False),
            Literal::Null => self.push_root(Root::Null),
            Literal::Undefined => self.push_root(Root::Undefined),
        }
    }

    fn visit_assignment(
        &mut self,
        op: Option<BinaryOp>,
        target: &'t Expr,
        value: &'t Expr,
    ) -> Result<()> {
        self.masm.comment("[ assignment");
        let mut reference = self.load_reference(target, op.is_some())?;
        if reference.is_illegal() {
            self.load(value)?;
            self.drop(1)?;
            self.unsupported("assignment to an invalid target")?;
            return self.push_smi(0);
        }
        match op {
            None => self.load(value)?,
            Some(op) => {
                self.get_value(&mut reference)?;
                let mode = if value.result_overwrite_allowed() {
                    OverwriteMode::OverwriteRight
                } else {
                    OverwriteMode::NoOverwrite
                };
                match value.as_smi_literal() {
                    Some(k) => self.smi_operation(op, k, false, mode)?,
                    None => {
                        self.load(value)?;
                        self.binary_operation(op, mode)?;
                    }
                }
                self.emit_push(Reg::V0)?;
            }
        }
        self.set_value(&mut reference)
    }

    fn visit_binary(&mut self, op: BinaryOp, left: &'t Expr, right: &'t Expr) -> Result<()> {
        let mode = if left.result_overwrite_allowed() {
            OverwriteMode::OverwriteLeft
        } else if right.result_overwrite_allowed() {
            OverwriteMode::OverwriteRight
        } else {
            OverwriteMode::NoOverwrite
        };
        if let Some(k) = right.as_smi_literal() {
            self.load(left)?;
            self.smi_operation(op, k, false, mode)?;
        } else if let Some(k) = left.as_smi_literal() {
            self.load(right)?;
            self.smi_operation(op, k, true, mode)?;
        } else {
            self.load(left)?;
            self.load(right)?;
            self.binary_operation(op, mode)?;
        }
        self.emit_push(Reg::V0)
    }

    /// `&&` and `||`. In a test context the operands branch straight to the
    /// targets; in a value context the deciding operand's value survives.
    fn visit_logical(
        &mut self,
        op: LogicalOp,
        left: &'t Expr,
        right: &'t Expr,
        branches: Branches,
    ) -> Result<Loaded> {
        let is_and = op == LogicalOp::And;
        let evaluate_right = self.forward_target();
        let left_branches = if is_and {
            Branches::new(evaluate_right, branches.on_false)
        } else {
            Branches::new(branches.on_true, evaluate_right)
        };
        let pending = self.load_condition(left, left_branches, false)?;

        if pending.is_none() && self.has_frame() {
            // The left value is on the frame; keep it if it decides.
            let pop_and_continue = self.forward_target();
            let exit = self.forward_target();
            self.dup()?;
            if is_and {
                let test = self.to_boolean(Branches::new(pop_and_continue, exit))?;
                self.branch_on(exit, test.negate())?;
            } else {
                let test = self.to_boolean(Branches::new(exit, pop_and_continue))?;
                self.branch_on(exit, test)?;
            }
            self.bind(pop_and_continue)?;
            self.drop(1)?;
            self.bind(evaluate_right)?;
            self.load(right)?;
            self.bind(exit)?;
            return Ok(Loaded::Value);
        }

        if pending.is_none() && !self.is_linked(evaluate_right) {
            return Ok(Loaded::Value);
        }
        if let Some(pending) = pending {
            if is_and {
                self.branch_on(branches.on_false, pending.negate())?;
            } else {
                self.branch_on(branches.on_true, pending)?;
            }
        }
        self.bind(evaluate_right)?;
        Ok(match self.load_condition(right, branches, false)? {
            Some(pending) => Loaded::Condition(pending),
            None => Loaded::Value,
        })
    }

    fn visit_conditional(
        &mut self,
        cond: &'t Expr,
        then: &'t Expr,
        otherwise: &'t Expr,
    ) -> Result<()> {
        let then_target = self.forward_target();
        let else_target = self.forward_target();
        let pending = self.load_condition(cond, Branches::new(then_target, else_target), true)?;
        if let Some(pending) = pending {
            self.branch_on(else_target, pending.negate())?;
        }
        if self.has_frame() || self.is_linked(then_target) {
            self.bind(then_target)?;
            self.load(then)?;
        }
        if self.is_linked(else_target) {
            let exit = self.forward_target();
            if self.has_frame() {
                self.jump(exit)?;
            }
            self.bind(else_target)?;
            self.load(otherwise)?;
            if self.is_linked(exit) {
                self.bind(exit)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Unary and count operations
    // -----------------------------------------------------------------------

    fn visit_unary(
        &mut self,
        op: UnaryOp,
        operand: &'t Expr,
        branches: Branches,
    ) -> Result<Loaded> {
        match op {
            UnaryOp::Not => {
                let pending = self.load_condition(operand, branches.swapped(), true)?;
                return Ok(match pending {
                    Some(pending) => Loaded::Condition(pending.negate()),
                    None => Loaded::Value,
                });
            }
            UnaryOp::Delete => self.visit_delete(operand)?,
            UnaryOp::Typeof => {
                self.load_typeof_expression(operand)?;
                self.call_runtime(RuntimeFunction::Typeof, 1)?;
                self.emit_push(Reg::V0)?;
            }
            UnaryOp::Void => {
                self.load(operand)?;
                self.drop(1)?;
                self.push_root(Root::Undefined)?;
            }
            UnaryOp::Neg | UnaryOp::BitNot => {
                let overwrite = operand.result_overwrite_allowed();
                self.load(operand)?;
                self.emit_pop(Reg::A0)?;
                let key = StubKey::GenericUnaryOp { op, overwrite };
                let id = self.register_deferred("[ deferred unary operation", vec![], move |masm| {
                    masm.call_stub(key);
                    Ok(())
                });
                self.masm.and(Reg::T0, Reg::A0, 1);
                self.branch_deferred(id, Cond::Ne, Reg::T0, 0);
                if op == UnaryOp::Neg {
                    // Zero negates to -0 and the smallest smi overflows.
                    self.branch_deferred(id, Cond::Eq, Reg::A0, 0);
                    self.branch_deferred(id, Cond::Eq, Reg::A0, smi_from_int(SMI_MIN) as i32);
                    self.masm.subu(Reg::V0, Reg::Zero, Reg::A0);
                } else {
                    self.masm.xor(Reg::V0, Reg::A0, !1);
                }
                self.bind_deferred_exit(id)?;
                self.emit_push(Reg::V0)?;
            }
            UnaryOp::Plus => {
                self.load(operand)?;
                self.emit_pop(Reg::A0)?;
                let done = self.forward_target();
                self.masm.mov(Reg::V0, Reg::A0);
                self.masm.and(Reg::T0, Reg::A0, 1);
                self.branch(done, Cond::Eq, Reg::T0, 0)?;
                self.emit_push(Reg::A0)?;
                self.call_runtime(RuntimeFunction::ToNumber, 1)?;
                self.bind(done)?;
                self.emit_push(Reg::V0)?;
            }
        }
        Ok(Loaded::Value)
    }

    fn visit_delete(&mut self, operand: &'t Expr) -> Result<()> {
        match operand {
            Expr::Property { object, key } => {
                self.load(object)?;
                match key {
                    PropertyKey::Named(name) => self.push_string(name)?,
                    PropertyKey::Keyed(key) => self.load(key)?,
                }
                self.call_runtime(RuntimeFunction::DeleteProperty, 2)?;
                self.emit_push(Reg::V0)
            }
            Expr::Var(var) => match var.location {
                VarLocation::Global => {
                    self.load_global()?;
                    self.push_string(&var.name)?;
                    self.call_runtime(RuntimeFunction::DeleteProperty, 2)?;
                    self.emit_push(Reg::V0)
                }
                VarLocation::Lookup => {
                    self.unsupported("delete of a dynamically scoped variable")?;
                    self.push_root(Root::False)
                }
                _ => self.push_root(Root::False),
            },
            _ => {
                self.load(operand)?;
                self.drop(1)?;
                self.push_root(Root::True)
            }
        }
    }

    /// `++`/`--` with an inline smi path. A postfix operation reserves a
    /// frame slot for the old value before loading the target.
    fn visit_count(&mut self, op: CountOp, prefix: bool, target: &'t Expr) -> Result<()> {
        self.masm.comment(format!("[ count operation {op}"));
        let postfix = !prefix;
        if postfix {
            self.push_smi(0)?;
        }
        let mut reference = self.load_reference(target, true)?;
        if reference.is_illegal() {
            self.unsupported("count operation on an invalid target")?;
            if prefix {
                self.push_smi(0)?;
            }
            return Ok(());
        }
        self.get_value(&mut reference)?;
        self.emit_pop(Reg::A0)?;
        let result_slot = if postfix {
            Some(self.element_at(reference.size())?)
        } else {
            None
        };

        let binary_op = match op {
            CountOp::Inc => BinaryOp::Add,
            CountOp::Dec => BinaryOp::Sub,
        };
        let key = StubKey::generic_binary(binary_op, OverwriteMode::NoOverwrite, Some(1));
        let context = self.frame()?.context();
        let id = self.register_deferred(
            "[ deferred count operation",
            vec![Preserve::Reload(Reg::Cp, context)],
            move |masm| {
                masm.push(Reg::A0);
                masm.call_runtime(RuntimeFunction::ToNumber, 1);
                if let Some(slot) = result_slot {
                    masm.sw(Reg::V0, slot);
                }
                masm.mov(Reg::A1, Reg::V0);
                masm.li(Reg::A0, smi_from_int(1) as i32);
                masm.call_stub(key);
                Ok(())
            },
        );

        self.masm.and(Reg::T0, Reg::A0, 1);
        self.branch_deferred(id, Cond::Ne, Reg::T0, 0);
        if let Some(slot) = result_slot {
            self.masm.sw(Reg::A0, slot);
        }
        let one = smi_from_int(1) as i32;
        match op {
            CountOp::Inc => {
                self.branch_deferred(id, Cond::Eq, Reg::A0, smi_from_int(SMI_MAX) as i32);
                self.masm.addu(Reg::V0, Reg::A0, one);
            }
            CountOp::Dec => {
                self.branch_deferred(id, Cond::Eq, Reg::A0, smi_from_int(SMI_MIN) as i32);
                self.masm.subu(Reg::V0, Reg::A0, one);
            }
        }
        self.bind_deferred_exit(id)?;
        self.emit_push(Reg::V0)?;
        self.set_value(&mut reference)?;
        if postfix {
            self.drop(1)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    fn load_arguments(&mut self, args: &'t [Expr]) -> Result<()> {
        for arg in args {
            self.load(arg)?;
        }
        Ok(())
    }

    /// Replaces the callee slot left below the consumed arguments with the
    /// call's result.
    fn finish_call(&mut self) -> Result<()> {
        self.restore_context()?;
        self.drop(1)?;
        self.emit_push(Reg::V0)
    }

    fn visit_call(&mut self, callee: &'t Expr, args: &'t [Expr]) -> Result<()> {
        let argc = argument_count(args)?;
        match callee {
            Expr::Var(var) if var.location == VarLocation::Global => {
                self.masm.comment(format!("[ call global {}", var.name));
                self.push_string(&var.name)?;
                self.load_global()?;
                self.load_arguments(args)?;
                self.call_stub(
                    StubKey::CallIc {
                        argc,
                        contextual: true,
                    },
                    args.len() + 1,
                )?;
            }
            Expr::Property {
                object,
                key: PropertyKey::Named(name),
            } => {
                self.masm.comment(format!("[ call named {name}"));
                self.push_string(name)?;
                self.load(object)?;
                self.load_arguments(args)?;
                self.call_stub(
                    StubKey::CallIc {
                        argc,
                        contextual: false,
                    },
                    args.len() + 1,
                )?;
            }
            Expr::Property {
                key: PropertyKey::Keyed(_),
                ..
            } => {
                self.masm.comment("[ call keyed");
                let mut reference = self.load_reference(callee, true)?;
                self.get_value(&mut reference)?;
                let receiver = self.element_at(reference.size())?;
                self.masm.lw(Reg::T0, receiver);
                self.emit_push(Reg::T0)?;
                self.load_arguments(args)?;
                self.call_stub(StubKey::CallFunction { argc }, args.len() + 1)?;
                self.finish_call()?;
                return self.unload_reference(&mut reference);
            }
            _ => {
                self.masm.comment("[ call function value");
                self.load(callee)?;
                self.load_global()?;
                self.load_arguments(args)?;
                self.call_stub(StubKey::CallFunction { argc }, args.len() + 1)?;
            }
        }
        self.finish_call()
    }

    fn visit_new(&mut self, callee: &'t Expr, args: &'t [Expr]) -> Result<()> {
        let argc = argument_count(args)?;
        self.masm.comment("[ new");
        self.load(callee)?;
        // Receiver slot; the construct stub replaces it with the new object.
        self.load_global()?;
        self.load_arguments(args)?;
        self.call_stub(StubKey::Construct { argc }, args.len() + 1)?;
        self.finish_call()
    }

    // -----------------------------------------------------------------------
    // Literals
    // -----------------------------------------------------------------------

    fn visit_object_literal(&mut self, properties: &'t [(String, Expr)]) -> Result<()> {
        self.masm.comment("[ object literal");
        let boilerplate = properties
            .iter()
            .map(|(name, value)| (name.clone(), boilerplate_value(value)))
            .collect();
        let id = self.masm.constant(Constant::ObjectBoilerplate(boilerplate));
        self.push_constant(Imm::Handle(id))?;
        self.call_runtime(RuntimeFunction::CreateObjectLiteral, 1)?;
        self.emit_push(Reg::V0)?;

        for (name, value) in properties {
            if boilerplate_value(value) != ConstValue::Hole {
                continue;
            }
            self.load(value)?;
            self.emit_pop(Reg::A0)?;
            let object = self.element_at(0)?;
            self.masm.lw(Reg::A1, object);
            self.load_string(Reg::A2, name);
            self.call_stub(StubKey::StoreIc, 0)?;
        }
        Ok(())
    }

    fn visit_array_literal(&mut self, values: &'t [Expr]) -> Result<()> {
        self.masm.comment("[ array literal");
        let boilerplate = values.iter().map(boilerplate_value).collect();
        let id = self.masm.constant(Constant::ArrayBoilerplate(boilerplate));
        self.push_constant(Imm::Handle(id))?;
        self.call_runtime(RuntimeFunction::CreateArrayLiteral, 1)?;
        self.emit_push(Reg::V0)?;

        for (index, value) in values.iter().enumerate() {
            if boilerplate_value(value) != ConstValue::Hole {
                continue;
            }
            self.load(value)?;
            let known_smi = matches!(
                self.frame()?.top(),
                Some(FrameElement::Constant(imm)) if imm.is_smi()
            );
            self.emit_pop(Reg::A0)?;
            let array = self.element_at(0)?;
            self.masm.lw(Reg::A1, array);
            self.masm
                .lw(Reg::A1, MemOperand::field(Reg::A1, js_object::ELEMENTS_OFFSET));
            let offset = fixed_array::offset_of_element(index as i32);
            self.masm.sw(Reg::A0, MemOperand::field(Reg::A1, offset));
            if !known_smi {
                let skip = self.masm.new_label();
                self.masm.and(Reg::T0, Reg::A0, 1);
                self.masm.branch(Cond::Eq, Reg::T0, 0, skip);
                self.masm.li(Reg::A3, field_offset(offset));
                self.masm.record_write(Reg::A1, Reg::A3);
                self.masm.bind(skip)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Runtime calls and intrinsics
    // -----------------------------------------------------------------------

    fn visit_call_runtime(
        &mut self,
        name: &str,
        args: &'t [Expr],
        branches: Branches,
    ) -> Result<Loaded> {
        if let Some(intrinsic) = name.strip_prefix('_') {
            return self.visit_intrinsic(intrinsic, args, branches);
        }
        let function = match RuntimeFunction::from_str(name) {
            Ok(function) if function.arity().map_or(true, |n| n as usize == args.len()) => function,
            _ => return self.unsupported_call(&format!("runtime call %{name}"), args),
        };
        self.load_arguments(args)?;
        self.call_runtime(function, args.len())?;
        self.emit_push(Reg::V0)?;
        Ok(Loaded::Value)
    }

    /// Evaluates the arguments for their effects and traps.
    fn unsupported_call(&mut self, what: &str, args: &'t [Expr]) -> Result<Loaded> {
        self.load_arguments(args)?;
        self.drop(args.len())?;
        self.unsupported(what)?;
        self.push_smi(0)?;
        Ok(Loaded::Value)
    }

    fn visit_intrinsic(
        &mut self,
        name: &str,
        args: &'t [Expr],
        branches: Branches,
    ) -> Result<Loaded> {
        let arity = match name {
            "IsSmi" | "IsNonNegativeSmi" | "IsArray" | "IsFunction" | "IsUndetectableObject"
            | "IsObject" | "ClassOf" => 1,
            "ObjectEquals" | "StringAdd" => 2,
            _ => return self.unsupported_call(&format!("intrinsic %_{name}"), args),
        };
        if args.len() != arity {
            let what = format!("intrinsic %_{name} with {} arguments", args.len());
            return self.unsupported_call(&what, args);
        }
        self.load_arguments(args)?;
        let Branches { on_true, on_false } = branches;
        let pending = match name {
            "IsSmi" | "IsNonNegativeSmi" => {
                let mask = if name == "IsSmi" { 1 } else { 0x8000_0001u32 as i32 };
                self.emit_pop(Reg::T0)?;
                self.masm.and(COND1, Reg::T0, mask);
                self.masm.li(COND2, 0);
                Pending::on_cond_regs(Cond::Eq)
            }
            "ObjectEquals" => {
                self.emit_pop(COND2)?;
                self.emit_pop(COND1)?;
                Pending::on_cond_regs(Cond::Eq)
            }
            "IsArray" | "IsFunction" => {
                let wanted = if name == "IsArray" {
                    instance_type::JS_ARRAY
                } else {
                    instance_type::JS_FUNCTION
                };
                self.emit_pop(Reg::T0)?;
                self.masm.and(Reg::T1, Reg::T0, 1);
                self.branch(on_false, Cond::Eq, Reg::T1, 0)?;
                self.load_instance_type(COND1, Reg::T0);
                self.masm.li(COND2, wanted as i32);
                Pending::on_cond_regs(Cond::Eq)
            }
            "IsUndetectableObject" => {
                self.emit_pop(Reg::T0)?;
                self.masm.and(Reg::T1, Reg::T0, 1);
                self.branch(on_false, Cond::Eq, Reg::T1, 0)?;
                self.masm.lw(
                    COND1,
                    MemOperand::field(Reg::T0, plinth_core::layout::heap_object::MAP_OFFSET),
                );
                self.masm
                    .lw(COND1, MemOperand::field(COND1, map::BIT_FIELD_OFFSET));
                self.masm.and(COND1, COND1, map::IS_UNDETECTABLE as i32);
                self.masm.li(COND2, map::IS_UNDETECTABLE as i32);
                Pending::on_cond_regs(Cond::Eq)
            }
            "IsObject" => {
                self.emit_pop(Reg::T0)?;
                self.masm.and(Reg::T1, Reg::T0, 1);
                self.branch(on_false, Cond::Eq, Reg::T1, 0)?;
                self.masm.load_root(Reg::T1, Root::Null);
                self.branch(on_true, Cond::Eq, Reg::T0, Reg::T1)?;
                self.masm.lw(
                    Reg::T1,
                    MemOperand::field(Reg::T0, plinth_core::layout::heap_object::MAP_OFFSET),
                );
                self.masm
                    .lw(Reg::T2, MemOperand::field(Reg::T1, map::BIT_FIELD_OFFSET));
                self.masm.and(Reg::T2, Reg::T2, map::IS_UNDETECTABLE as i32);
                self.branch(on_false, Cond::Ne, Reg::T2, 0)?;
                self.masm
                    .lw(Reg::T2, MemOperand::field(Reg::T1, map::INSTANCE_TYPE_OFFSET));
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
            "StringAdd" => {
                self.call_stub(StubKey::StringAdd, 2)?;
                self.emit_push(Reg::V0)?;
                return Ok(Loaded::Value);
            }
            _ => {
                self.call_runtime(RuntimeFunction::ClassOf, 1)?;
                self.emit_push(Reg::V0)?;
                return Ok(Loaded::Value);
            }
        };
        Ok(Loaded::Condition(pending))
    }
}
