//! Statement visitors.

use plinth_core::ast::{Expr, LabelId, Stmt, SwitchCase, Var, VarLocation};
use plinth_core::isa::{Cond, External, MemOperand, Reg, Root};
use plinth_core::layout::{field_offset, fixed_array, smi_from_int, stack_handler};
use plinth_core::runtime::RuntimeFunction;

use super::{CodeGenerator, Reference, ReferenceKind, RefState};
use crate::condition::Branches;
use crate::error::Result;
use crate::merge::{Direction, TargetId};
use crate::shadow::ShadowScope;

/// Reason for entering a finally block, kept in `a2` as a smi.
const FALLING: i32 = 0;
const THROWING: i32 = 1;
/// Escape `i` of a try block enters the finally block with `JUMPING + i`.
const JUMPING: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConditionAnalysis {
    AlwaysTrue,
    AlwaysFalse,
    DontKnow,
}

/// Loop conditions known before run time. A missing condition is true.
fn analyze_condition(cond: Option<&Expr>) -> ConditionAnalysis {
    match cond {
        None => ConditionAnalysis::AlwaysTrue,
        Some(expr) => match expr.as_literal() {
            Some(literal) if literal.to_boolean() => ConditionAnalysis::AlwaysTrue,
            Some(_) => ConditionAnalysis::AlwaysFalse,
            None => ConditionAnalysis::DontKnow,
        },
    }
}

/// Name used in frame height diagnostics.
pub(super) fn kind(statement: &Stmt) -> &'static str {
    match statement {
        Stmt::Expr(_) => "expression statement",
        Stmt::Block { .. } => "block",
        Stmt::If { .. } => "if",
        Stmt::While { .. } => "while",
        Stmt::DoWhile { .. } => "do-while",
        Stmt::For { .. } => "for",
        Stmt::ForIn { .. } => "for-in",
        Stmt::Switch { .. } => "switch",
        Stmt::Break(_) => "break",
        Stmt::Continue(_) => "continue",
        Stmt::Return(_) => "return",
        Stmt::TryCatch { .. } => "try-catch",
        Stmt::TryFinally { .. } => "try-finally",
        Stmt::Empty => "empty statement",
        Stmt::Debugger => "debugger",
    }
}

impl<'t, 'c> CodeGenerator<'t, 'c> {
    pub(super) fn visit_stmt_inner(&mut self, statement: &'t Stmt) -> Result<()> {
        match statement {
            Stmt::Expr(expr) => {
                self.load(expr)?;
                self.drop(1)
            }
            Stmt::Block { label, body } => self.visit_block(*label, body),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => self.visit_if(cond, then, otherwise.as_deref()),
            Stmt::While { label, cond, body } => self.visit_while(*label, cond, body),
            Stmt::DoWhile { label, body, cond } => self.visit_do_while(*label, body, cond),
            Stmt::For {
                label,
                init,
                cond,
                next,
                body,
            } => self.visit_for(*label, init.as_deref(), cond.as_ref(), next.as_deref(), body),
            Stmt::ForIn {
                label,
                each,
                enumerable,
                body,
            } => self.visit_for_in(*label, each, enumerable, body),
            Stmt::Switch { label, tag, cases } => self.visit_switch(*label, tag, cases),
            Stmt::Break(label) => {
                let target = self.find_breakable(*label)?.break_target;
                self.jump_escaping(target)
            }
            Stmt::Continue(label) => {
                let breakable = self.find_breakable(*label)?;
                match breakable.continue_target {
                    Some(target) => self.jump_escaping(target),
                    None => Err(crate::error::CodegenError::Unsupported(format!(
                        "continue to non-loop label {label}"
                    ))),
                }
            }
            Stmt::Return(value) => {
                self.masm.comment("[ return");
                match value {
                    Some(expr) => self.load(expr)?,
                    None => self.push_root(Root::Undefined)?,
                }
                self.emit_pop(Reg::V0)?;
                self.jump_escaping(self.function_return)
            }
            Stmt::TryCatch {
                try_block,
                catch_var,
                catch_block,
            } => self.visit_try_catch(try_block, catch_var, catch_block),
            Stmt::TryFinally {
                try_block,
                finally_block,
            } => self.visit_try_finally(try_block, finally_block),
            Stmt::Empty => Ok(()),
            Stmt::Debugger => {
                self.masm.comment("[ debugger");
                Ok(())
            }
        }
    }

    /// A break target for statements at the current height.
    fn new_break_target(&mut self) -> Result<TargetId> {
        let height = self.height()?;
        let target = self.forward_target();
        self.targets.set_expected_height(target, height);
        Ok(target)
    }

    fn bind_if_linked(&mut self, target: TargetId) -> Result<()> {
        if self.is_linked(target) {
            self.bind(target)?;
        }
        Ok(())
    }

    fn visit_block(&mut self, label: Option<LabelId>, body: &'t [Stmt]) -> Result<()> {
        let Some(label) = label else {
            return self.visit_statements(body);
        };
        let break_target = self.new_break_target()?;
        self.push_breakable(label, break_target, None);
        let result = self.visit_statements(body);
        self.pop_breakable();
        result?;
        self.bind_if_linked(break_target)
    }

    fn visit_if(
        &mut self,
        cond: &'t Expr,
        then: &'t Stmt,
        otherwise: Option<&'t Stmt>,
    ) -> Result<()> {
        self.masm.comment("[ if");
        match analyze_condition(Some(cond)) {
            ConditionAnalysis::AlwaysTrue => return self.visit_stmt(then),
            ConditionAnalysis::AlwaysFalse => {
                return match otherwise {
                    Some(otherwise) => self.visit_stmt(otherwise),
                    None => Ok(()),
                }
            }
            ConditionAnalysis::DontKnow => {}
        }

        let exit = self.forward_target();
        let then_target = self.forward_target();
        let else_target = match otherwise {
            Some(_) => self.forward_target(),
            None => exit,
        };
        let pending = self.load_condition(cond, Branches::new(then_target, else_target), true)?;
        if let Some(pending) = pending {
            self.branch_on(else_target, pending.negate())?;
        }
        if self.has_frame() || self.is_linked(then_target) {
            self.bind(then_target)?;
            self.visit_stmt(then)?;
        }
        if let Some(otherwise) = otherwise {
            if self.has_frame() {
                self.jump(exit)?;
            }
            if self.is_linked(else_target) {
                self.bind(else_target)?;
                self.visit_stmt(otherwise)?;
            }
        }
        if self.has_frame() || self.is_linked(exit) {
            self.bind(exit)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Loops
    // -----------------------------------------------------------------------

    /// Compiles a loop test that exits to `break_target` when false.
    fn loop_test(&mut self, cond: &'t Expr, break_target: TargetId) -> Result<()> {
        let body = self.forward_target();
        let pending = self.load_condition(cond, Branches::new(body, break_target), true)?;
        if let Some(pending) = pending {
            self.branch_on(break_target, pending.negate())?;
        }
        if self.has_frame() || self.is_linked(body) {
            self.bind(body)?;
        }
        Ok(())
    }

    fn visit_while(&mut self, label: LabelId, cond: &'t Expr, body: &'t Stmt) -> Result<()> {
        self.masm.comment("[ while");
        let info = analyze_condition(Some(cond));
        if info == ConditionAnalysis::AlwaysFalse {
            return Ok(());
        }
        let break_target = self.new_break_target()?;
        let continue_target = self.new_target(Direction::Bidirectional);
        self.bind(continue_target)?;
        self.push_breakable(label, break_target, Some(continue_target));

        let result = (|| -> Result<()> {
            if info == ConditionAnalysis::DontKnow {
                self.loop_test(cond, break_target)?;
            }
            if self.has_frame() {
                self.check_stack()?;
                self.visit_stmt(body)?;
                if self.has_frame() {
                    self.jump(continue_target)?;
                }
            }
            Ok(())
        })();
        self.pop_breakable();
        result?;
        self.bind_if_linked(break_target)
    }

    fn visit_do_while(&mut self, label: LabelId, body: &'t Stmt, cond: &'t Expr) -> Result<()> {
        self.masm.comment("[ do-while");
        let info = analyze_condition(Some(cond));
        let break_target = self.new_break_target()?;
        let height = self.height()?;
        let top = self.new_target(Direction::Bidirectional);
        let continue_target = match info {
            ConditionAnalysis::AlwaysTrue => {
                let target = self.new_target(Direction::Bidirectional);
                self.bind(target)?;
                target
            }
            ConditionAnalysis::AlwaysFalse => self.forward_target(),
            ConditionAnalysis::DontKnow => {
                self.bind(top)?;
                self.forward_target()
            }
        };
        self.targets.set_expected_height(continue_target, height);
        self.push_breakable(label, break_target, Some(continue_target));

        let result = (|| -> Result<()> {
            self.check_stack()?;
            self.visit_stmt(body)?;
            match info {
                ConditionAnalysis::AlwaysTrue => {
                    if self.has_frame() {
                        self.jump(continue_target)?;
                    }
                }
                ConditionAnalysis::AlwaysFalse => self.bind_if_linked(continue_target)?,
                ConditionAnalysis::DontKnow => {
                    self.bind_if_linked(continue_target)?;
                    if self.has_frame() {
                        let pending =
                            self.load_condition(cond, Branches::new(top, break_target), true)?;
                        if let Some(pending) = pending {
                            self.branch_on(top, pending)?;
                        }
                    }
                }
            }
            Ok(())
        })();
        self.pop_breakable();
        result?;
        self.bind_if_linked(break_target)
    }

    fn visit_for(
        &mut self,
        label: LabelId,
        init: Option<&'t Stmt>,
        cond: Option<&'t Expr>,
        next: Option<&'t Stmt>,
        body: &'t Stmt,
    ) -> Result<()> {
        self.masm.comment("[ for");
        if let Some(init) = init {
            self.visit_stmt(init)?;
        }
        let info = analyze_condition(cond);
        if info == ConditionAnalysis::AlwaysFalse || !self.has_frame() {
            return Ok(());
        }
        let break_target = self.new_break_target()?;
        let height = self.height()?;
        let (continue_target, top) = match next {
            None => {
                let target = self.new_target(Direction::Bidirectional);
                self.bind(target)?;
                (target, target)
            }
            Some(_) => {
                let top = self.new_target(Direction::Bidirectional);
                self.bind(top)?;
                (self.forward_target(), top)
            }
        };
        self.targets.set_expected_height(continue_target, height);
        self.push_breakable(label, break_target, Some(continue_target));

        let result = (|| -> Result<()> {
            if let (ConditionAnalysis::DontKnow, Some(cond)) = (info, cond) {
                self.loop_test(cond, break_target)?;
            }
            if !self.has_frame() {
                return Ok(());
            }
            self.check_stack()?;
            self.visit_stmt(body)?;
            match next {
                None => {
                    if self.has_frame() {
                        self.jump(continue_target)?;
                    }
                }
                Some(next) => {
                    self.bind_if_linked(continue_target)?;
                    if self.has_frame() {
                        self.visit_stmt(next)?;
                        if self.has_frame() {
                            self.jump(top)?;
                        }
                    }
                }
            }
            Ok(())
        })();
        self.pop_breakable();
        result?;
        self.bind_if_linked(break_target)
    }

    /// Frame during the loop: object, key array, key count, index (top).
    fn visit_for_in(
        &mut self,
        label: LabelId,
        each: &'t Expr,
        enumerable: &'t Expr,
        body: &'t Stmt,
    ) -> Result<()> {
        self.masm.comment("[ for-in");
        let exit = self.forward_target();
        self.load(enumerable)?;
        self.emit_pop(Reg::A0)?;
        self.masm.load_root(Reg::T1, Root::Undefined);
        self.branch(exit, Cond::Eq, Reg::A0, Reg::T1)?;
        self.masm.load_root(Reg::T1, Root::Null);
        self.branch(exit, Cond::Eq, Reg::A0, Reg::T1)?;

        self.emit_push(Reg::A0)?;
        self.emit_push(Reg::A0)?;
        self.call_runtime(RuntimeFunction::GetPropertyNames, 1)?;
        self.emit_push(Reg::V0)?;
        self.masm
            .lw(Reg::T0, MemOperand::field(Reg::V0, fixed_array::LENGTH_OFFSET));
        self.emit_push(Reg::T0)?;
        self.push_smi(0)?;

        let entry = self.new_target(Direction::Bidirectional);
        self.bind(entry)?;
        let break_target = self.new_break_target()?;
        let continue_target = self.new_break_target()?;
        self.push_breakable(label, break_target, Some(continue_target));

        let result = (|| -> Result<()> {
            let index = self.element_at(0)?;
            self.masm.lw(Reg::T0, index);
            let length = self.element_at(1)?;
            self.masm.lw(Reg::T1, length);
            self.branch(break_target, Cond::Uge, Reg::T0, Reg::T1)?;

            // Smi index times two is the byte offset.
            let keys = self.element_at(2)?;
            self.masm.lw(Reg::T2, keys);
            self.masm
                .addu(Reg::T2, Reg::T2, field_offset(fixed_array::HEADER_SIZE));
            self.masm.sll(Reg::T1, Reg::T0, 1);
            self.masm.addu(Reg::T2, Reg::T2, Reg::T1);
            self.masm.lw(Reg::T3, MemOperand::new(Reg::T2, 0));

            let object = self.element_at(3)?;
            self.masm.lw(Reg::T0, object);
            self.emit_push(Reg::T0)?;
            self.emit_push(Reg::T3)?;
            self.call_runtime(RuntimeFunction::ForInFilter, 2)?;
            self.masm.mov(Reg::T3, Reg::V0);
            self.masm.load_root(Reg::T4, Root::Undefined);
            self.branch(continue_target, Cond::Eq, Reg::T3, Reg::T4)?;

            self.emit_push(Reg::T3)?;
            let mut target = self.load_reference(each, false)?;
            if target.is_illegal() {
                self.unsupported("for-in target")?;
            } else {
                let size = target.size();
                if size > 0 {
                    let key = self.element_at(size)?;
                    self.masm.lw(Reg::T0, key);
                    self.emit_push(Reg::T0)?;
                }
                self.set_value(&mut target)?;
                if size > 0 {
                    self.drop(1)?;
                }
            }
            self.drop(1)?;

            self.check_stack()?;
            self.visit_stmt(body)?;

            self.bind(continue_target)?;
            if self.has_frame() {
                self.emit_pop(Reg::T0)?;
                self.masm.addu(Reg::T0, Reg::T0, smi_from_int(1) as i32);
                self.emit_push(Reg::T0)?;
                self.jump(entry)?;
            }
            Ok(())
        })();
        self.pop_breakable();
        result?;

        self.bind(break_target)?;
        self.drop(4)?;
        self.bind(exit)
    }

    fn visit_switch(
        &mut self,
        label: LabelId,
        tag: &'t Expr,
        cases: &'t [SwitchCase],
    ) -> Result<()> {
        self.masm.comment("[ switch");
        let break_target = self.new_break_target()?;
        self.push_breakable(label, break_target, None);
        let result = self.switch_body(tag, cases);
        self.pop_breakable();
        result?;
        self.bind_if_linked(break_target)
    }

    /// Tests run in source order with the default clause's test last;
    /// bodies keep source order so fall-through works.
    fn switch_body(&mut self, tag: &'t Expr, cases: &'t [SwitchCase]) -> Result<()> {
        self.load(tag)?;
        let mut next_test = self.forward_target();
        let mut fall_through = self.forward_target();
        let default_entry = self.forward_target();
        let default_exit = self.new_target(Direction::Bidirectional);
        let mut default_body = None;

        for (i, case) in cases.iter().enumerate() {
            let Some(test) = &case.test else {
                default_body = Some(&case.body);
                continue;
            };
            self.masm.comment("[ case");
            self.bind(next_test)?;
            next_test = self.forward_target();
            self.dup()?;
            self.load(test)?;
            let pending = self.comparison(Cond::Eq, true)?;
            self.branch_on(next_test, pending.negate())?;
            self.drop(1)?;

            if i > 0 && cases[i - 1].test.is_none() {
                self.bind(default_exit)?;
            } else {
                self.bind(fall_through)?;
                fall_through = self.forward_target();
            }
            self.visit_statements(&case.body)?;
            if self.has_frame() {
                let default_follows = cases.get(i + 1).is_some_and(|c| c.test.is_none());
                if default_follows {
                    self.jump(default_entry)?;
                } else {
                    self.jump(fall_through)?;
                }
            }
        }

        self.bind(next_test)?;
        self.drop(1)?;
        if let Some(body) = default_body {
            self.masm.comment("[ default");
            self.bind(default_entry)?;
            self.visit_statements(body)?;
            if self.has_frame() && self.targets.is_bound(default_exit) {
                self.jump(default_exit)?;
            }
        }
        self.bind_if_linked(fall_through)
    }

    // -----------------------------------------------------------------------
    // Exception handling
    // -----------------------------------------------------------------------

    /// Shadows the return target and every enclosing break and continue
    /// target for the duration of a try block.
    fn shadow_escapes(&mut self, handler_height: usize) -> ShadowScope {
        let mut originals = vec![self.function_return];
        for breakable in &self.breakables {
            originals.push(breakable.break_target);
            originals.extend(breakable.continue_target);
        }
        let mut scope = ShadowScope::default();
        for original in originals {
            let shadow = self.forward_target();
            self.targets.set_expected_height(shadow, handler_height);
            scope.intercept(original, shadow);
        }
        scope
    }

    fn push_try_handler(&mut self, kind: i32) -> Result<usize> {
        let frame = self.frame.as_mut().ok_or(crate::error::CodegenError::NoFrame)?;
        frame.push_try_handler(&mut self.masm, kind);
        Ok(frame.height())
    }

    /// Pops the handler on top of the frame off the handler chain.
    fn unlink_handler(&mut self) -> Result<()> {
        self.emit_pop(Reg::A1)?;
        self.masm.load_external(Reg::A3, External::HandlerAddress);
        self.masm.sw(Reg::A1, MemOperand::new(Reg::A3, 0));
        self.drop(stack_handler::SIZE_IN_WORDS - 1)
    }

    /// Resets `sp` to the innermost handler, discarding anything an escape
    /// left above it.
    fn reload_sp_from_handler(&mut self, handler_height: usize) -> Result<()> {
        self.spill_all()?;
        self.masm.load_external(Reg::A3, External::HandlerAddress);
        self.masm.lw(Reg::Sp, MemOperand::new(Reg::A3, 0));
        let surplus = self.height()? - handler_height;
        self.frame_mut()?.forget(surplus)
    }

    /// Compiles a try block under a fresh handler and shadow scope.
    fn protected_block(&mut self, kind: i32, block: &'t [Stmt]) -> Result<(usize, ShadowScope)> {
        let handler_height = self.push_try_handler(kind)?;
        let scope = self.shadow_escapes(handler_height);
        self.shadows.push(scope);
        let result = self.visit_statements(block);
        let scope = self.shadows.pop().unwrap_or_default();
        result?;
        Ok((handler_height, scope))
    }

    /// Stores the exception on top of the frame into the catch variable.
    fn store_caught(&mut self, var: &'t Var) -> Result<()> {
        match var.location {
            VarLocation::Global => {
                self.emit_pop(Reg::V1)?;
                self.load_global()?;
                self.emit_push(Reg::V1)?;
                let mut reference = Reference {
                    kind: ReferenceKind::Named {
                        name: var.name.clone(),
                        contextual: true,
                    },
                    state: RefState::Loaded,
                    persist_after_get: false,
                };
                self.set_value(&mut reference)
            }
            VarLocation::Lookup => self.unsupported("catch variable in a dynamic scope"),
            location => self.store_to_slot(location),
        }
    }

    fn visit_try_catch(
        &mut self,
        try_block: &'t [Stmt],
        catch_var: &'t Var,
        catch_block: &'t [Stmt],
    ) -> Result<()> {
        self.masm.comment("[ try-catch");
        let try_target = self.forward_target();
        let exit = self.forward_target();
        self.call_target(try_target)?;

        // Landing pad: the exception arrives in v0.
        self.emit_push(Reg::V0)?;
        self.store_caught(catch_var)?;
        self.drop(1)?;
        self.visit_statements(catch_block)?;
        if self.has_frame() {
            self.jump(exit)?;
        }

        self.bind(try_target)?;
        let (handler_height, scope) =
            self.protected_block(stack_handler::TRY_CATCH, try_block)?;
        let has_unlinks = scope.entries().iter().any(|&(_, s)| self.is_linked(s));
        if self.has_frame() {
            self.unlink_handler()?;
            if has_unlinks {
                self.jump(exit)?;
            }
        }
        for &(original, shadow) in scope.entries() {
            if !self.is_linked(shadow) {
                continue;
            }
            self.bind(shadow)?;
            self.reload_sp_from_handler(handler_height)?;
            self.unlink_handler()?;
            self.jump_escaping(original)?;
        }
        self.bind(exit)
    }

    fn visit_try_finally(
        &mut self,
        try_block: &'t [Stmt],
        finally_block: &'t [Stmt],
    ) -> Result<()> {
        self.masm.comment("[ try-finally");
        let try_target = self.forward_target();
        let finally_target = self.forward_target();
        self.call_target(try_target)?;

        // Landing pad: keep the exception for the rethrow.
        self.emit_push(Reg::V0)?;
        self.masm.li(Reg::A2, smi_from_int(THROWING) as i32);
        self.jump(finally_target)?;

        self.bind(try_target)?;
        let (handler_height, scope) =
            self.protected_block(stack_handler::TRY_FINALLY, try_block)?;
        let mut unlinks = scope
            .entries()
            .iter()
            .filter(|&&(_, s)| self.is_linked(s))
            .count();

        if self.has_frame() {
            self.unlink_handler()?;
            self.masm.load_root(Reg::V0, Root::Undefined);
            self.emit_push(Reg::V0)?;
            self.masm.li(Reg::A2, smi_from_int(FALLING) as i32);
            if unlinks > 0 {
                self.jump(finally_target)?;
            }
        }
        for (i, &(_, shadow)) in scope.entries().iter().enumerate() {
            if !self.is_linked(shadow) {
                continue;
            }
            self.bind(shadow)?;
            self.reload_sp_from_handler(handler_height)?;
            self.unlink_handler()?;
            // Shadow 0 intercepts returns, whose value is in v0.
            if i != 0 {
                self.masm.load_root(Reg::V0, Root::Undefined);
            }
            self.emit_push(Reg::V0)?;
            self.masm.li(Reg::A2, smi_from_int(JUMPING + i as i32) as i32);
            unlinks -= 1;
            if unlinks > 0 {
                self.jump(finally_target)?;
            }
        }

        self.masm.comment("[ finally");
        self.bind(finally_target)?;
        self.emit_push(Reg::A2)?;
        self.visit_statements(finally_block)?;
        if !self.has_frame() {
            return Ok(());
        }
        self.emit_pop(Reg::A2)?;
        self.emit_pop(Reg::V0)?;
        for (i, &(original, shadow)) in scope.entries().iter().enumerate() {
            if self.has_frame() && self.targets.is_bound(shadow) {
                let target = self.shadows.resolve(original);
                let state = smi_from_int(JUMPING + i as i32) as i32;
                self.branch(target, Cond::Eq, Reg::A2, state)?;
            }
        }
        let exit = self.forward_target();
        self.branch(exit, Cond::Ne, Reg::A2, smi_from_int(THROWING) as i32)?;
        self.emit_push(Reg::V0)?;
        self.call_runtime(RuntimeFunction::ReThrow, 1)?;
        self.bind(exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_conditions_are_decided_statically() {
        assert_eq!(analyze_condition(None), ConditionAnalysis::AlwaysTrue);
        assert_eq!(
            analyze_condition(Some(&Expr::boolean(false))),
            ConditionAnalysis::AlwaysFalse
        );
        assert_eq!(
            analyze_condition(Some(&Expr::smi(1))),
            ConditionAnalysis::AlwaysTrue
        );
        assert_eq!(
            analyze_condition(Some(&Expr::param("x", 0))),
            ConditionAnalysis::DontKnow
        );
    }
}
