//! The tree-walking code generator.
//!
//! One [`CodeGenerator`] compiles one function literal in a single pass.
//! Statement visitors leave the frame at the height they found it;
//! expression visitors leave exactly one more element, or a pending
//! condition, or no reachable frame at all when every path already went to
//! the true/false targets.

mod compare;
mod expr;
mod reference;
mod smi_ops;
mod stmt;

pub use reference::{RefState, Reference, ReferenceKind};
pub use smi_ops::{is_easy_to_multiply_by, multiply_overflow_mask};

use plinth_core::ast::{Declaration, FunctionLiteral, LabelId, Stmt, VarLocation};
use plinth_core::isa::{Code, Constant, Cond, External, MemOperand, Operand, Reg, Root};
use plinth_core::layout::{context, fixed_array, js_function, smi_from_int};
use plinth_core::runtime::{RuntimeFunction, StubKey};
use tracing::{debug, error, trace, warn};

use crate::compiler::FunctionQueue;
use crate::condition::{Branches, Loaded, Pending};
use crate::deferred::{DeferredId, DeferredQueue, Preserve};
use crate::error::{CodegenError, Result};
use crate::frame::{Imm, VirtualFrame};
use crate::masm::Assembler;
use crate::merge::{Direction, TargetId, Targets};
use crate::options::CompileOptions;
use crate::shadow::ShadowStack;

/// A statement `break` and `continue` can name.
#[derive(Debug, Clone, Copy)]
struct Breakable {
    label: LabelId,
    break_target: TargetId,
    continue_target: Option<TargetId>,
}

pub struct CodeGenerator<'t, 'c> {
    function: &'t FunctionLiteral,
    options: &'c CompileOptions,
    queue: &'c mut FunctionQueue<'t>,
    masm: Assembler,
    frame: Option<VirtualFrame>,
    targets: Targets,
    deferred: DeferredQueue,
    shadows: ShadowStack,
    breakables: Vec<Breakable>,
    function_return: TargetId,
    depth: usize,
    overflowed: bool,
}

impl<'t, 'c> CodeGenerator<'t, 'c> {
    pub fn new(
        function: &'t FunctionLiteral,
        options: &'c CompileOptions,
        queue: &'c mut FunctionQueue<'t>,
    ) -> Self {
        let mut masm = Assembler::new(options.comments);
        let mut targets = Targets::default();
        let function_return = targets.new_target(&mut masm, Direction::Bidirectional);
        targets.set_expected_height(function_return, 0);
        Self {
            function,
            options,
            queue,
            masm,
            frame: None,
            targets,
            deferred: DeferredQueue::default(),
            shadows: ShadowStack::default(),
            breakables: Vec::new(),
            function_return,
            depth: 0,
            overflowed: false,
        }
    }

    /// Compiles the whole function: prologue, declarations, body, the
    /// shared return sequence and finally the deferred slow paths.
    pub fn generate(mut self) -> Result<Code> {
        let result = self.generate_body();
        if self.overflowed {
            return Err(CodegenError::StackOverflow {
                function: self.function.name.clone(),
                limit: self.options.max_depth,
            });
        }
        result?;
        let deferred = std::mem::take(&mut self.deferred);
        debug!(
            function = %self.function.name,
            deferred = deferred.len(),
            "emitting slow paths"
        );
        deferred.process(&mut self.masm)?;
        self.masm.finish()
    }

    fn generate_body(&mut self) -> Result<()> {
        let function = self.function;
        self.masm.comment(format!("[ function {}", function.name));
        let mut frame = VirtualFrame::new(function.params.len(), function.stack_locals as usize);
        frame.enter(&mut self.masm);
        frame.allocate_stack_slots(&mut self.masm);
        self.frame = Some(frame);

        if function.heap_slots > 0 {
            self.allocate_context()?;
        }
        self.check_stack()?;
        for declaration in &function.declarations {
            self.declare(declaration)?;
        }
        self.visit_statements(&function.body)?;

        if self.frame.is_some() {
            self.masm.comment("[ implicit return");
            self.masm.load_root(Reg::V0, Root::Undefined);
        }
        if self.frame.is_some() || self.targets.is_linked(self.function_return) {
            self.bind(self.function_return)?;
            let frame = self.frame.as_mut().ok_or(CodegenError::NoFrame)?;
            frame.exit(&mut self.masm);
            self.frame = None;
        }
        Ok(())
    }

    /// Creates the function's context record and copies the parameters that
    /// live in it.
    fn allocate_context(&mut self) -> Result<()> {
        self.masm.comment("[ allocate local context");
        let function_slot = self.frame()?.function();
        self.masm.lw(Reg::A0, function_slot);
        self.emit_push(Reg::A0)?;
        self.call_runtime(RuntimeFunction::NewContext, 1)?;
        self.masm.mov(Reg::Cp, Reg::V0);
        let context_slot = self.frame()?.context();
        self.masm.sw(Reg::Cp, context_slot);

        for (index, param) in self.function.params.iter().enumerate() {
            let Some(slot) = param.context_slot else { continue };
            let source = self.frame()?.parameter_at(index);
            self.masm.lw(Reg::A1, source);
            let target = self.slot_operand(
                VarLocation::Context {
                    depth: 0,
                    index: slot,
                },
                Reg::A2,
            )?;
            self.masm.sw(Reg::A1, target);
            self.masm.li(Reg::A3, target.offset);
            self.masm.record_write(Reg::A2, Reg::A3);
        }
        Ok(())
    }

    fn declare(&mut self, declaration: &'t Declaration) -> Result<()> {
        let var = &declaration.var;
        match var.location {
            VarLocation::Global => {
                self.masm.comment(format!("[ declare global {}", var.name));
                self.push_string(&var.name)?;
                match &declaration.function {
                    Some(literal) => self.instantiate_function(literal)?,
                    None => self.push_constant(Imm::Root(Root::TheHole))?,
                }
                self.call_runtime(RuntimeFunction::DeclareGlobal, 2)
            }
            VarLocation::Lookup => self.unsupported("declaration in a dynamic scope"),
            location => {
                let Some(literal) = &declaration.function else {
                    return Ok(());
                };
                self.masm.comment(format!("[ declare function {}", var.name));
                self.instantiate_function(literal)?;
                self.store_to_slot(location)?;
                self.drop(1)
            }
        }
    }

    /// Pushes a closure for a nested function literal, queueing the literal
    /// for compilation.
    pub(crate) fn instantiate_function(&mut self, literal: &'t FunctionLiteral) -> Result<()> {
        let id = self.queue.enqueue(literal);
        self.emit_push(Reg::Cp)?;
        self.push_smi(id as i32)?;
        self.call_runtime(RuntimeFunction::NewClosure, 2)?;
        self.emit_push(Reg::V0)
    }

    // -----------------------------------------------------------------------
    // Frame access
    // -----------------------------------------------------------------------

    pub(crate) fn frame(&self) -> Result<&VirtualFrame> {
        self.frame.as_ref().ok_or(CodegenError::NoFrame)
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut VirtualFrame> {
        self.frame.as_mut().ok_or(CodegenError::NoFrame)
    }

    pub(crate) fn has_frame(&self) -> bool {
        self.frame.is_some()
    }

    pub(crate) fn height(&self) -> Result<usize> {
        Ok(self.frame()?.height())
    }

    pub(crate) fn emit_push(&mut self, rs: Reg) -> Result<()> {
        let frame = self.frame.as_mut().ok_or(CodegenError::NoFrame)?;
        frame.emit_push(&mut self.masm, rs);
        Ok(())
    }

    pub(crate) fn emit_pop(&mut self, rd: Reg) -> Result<()> {
        let frame = self.frame.as_mut().ok_or(CodegenError::NoFrame)?;
        frame.emit_pop(&mut self.masm, rd)
    }

    pub(crate) fn push_constant(&mut self, imm: Imm) -> Result<()> {
        self.frame_mut()?.push_constant(imm);
        Ok(())
    }

    pub(crate) fn push_smi(&mut self, value: i32) -> Result<()> {
        self.push_constant(Imm::Word(smi_from_int(value)))
    }

    pub(crate) fn push_root(&mut self, root: Root) -> Result<()> {
        self.push_constant(Imm::Root(root))
    }

    pub(crate) fn push_string(&mut self, s: &str) -> Result<()> {
        let id = self.masm.constant(Constant::String(s.to_string()));
        self.push_constant(Imm::Handle(id))
    }

    pub(crate) fn load_string(&mut self, rd: Reg, s: &str) {
        let id = self.masm.constant(Constant::String(s.to_string()));
        self.masm.load_constant(rd, id);
    }

    pub(crate) fn drop(&mut self, count: usize) -> Result<()> {
        let frame = self.frame.as_mut().ok_or(CodegenError::NoFrame)?;
        frame.drop(&mut self.masm, count)
    }

    pub(crate) fn dup(&mut self) -> Result<()> {
        let frame = self.frame.as_mut().ok_or(CodegenError::NoFrame)?;
        frame.dup(&mut self.masm)
    }

    pub(crate) fn element_at(&mut self, depth: usize) -> Result<MemOperand> {
        let frame = self.frame.as_mut().ok_or(CodegenError::NoFrame)?;
        Ok(frame.element_at(&mut self.masm, depth))
    }

    pub(crate) fn spill_all(&mut self) -> Result<()> {
        let frame = self.frame.as_mut().ok_or(CodegenError::NoFrame)?;
        frame.spill_all(&mut self.masm);
        Ok(())
    }

    pub(crate) fn call_stub(&mut self, key: StubKey, arg_count: usize) -> Result<()> {
        let frame = self.frame.as_mut().ok_or(CodegenError::NoFrame)?;
        frame.call_stub(&mut self.masm, key, arg_count)
    }

    pub(crate) fn call_runtime(
        &mut self,
        function: RuntimeFunction,
        arg_count: usize,
    ) -> Result<()> {
        let frame = self.frame.as_mut().ok_or(CodegenError::NoFrame)?;
        frame.call_runtime(&mut self.masm, function, arg_count)
    }

    /// Reloads `cp` after a call that may have run other functions.
    pub(crate) fn restore_context(&mut self) -> Result<()> {
        let slot = self.frame()?.context();
        self.masm.lw(Reg::Cp, slot);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Merge points
    // -----------------------------------------------------------------------

    pub(crate) fn new_target(&mut self, direction: Direction) -> TargetId {
        self.targets.new_target(&mut self.masm, direction)
    }

    pub(crate) fn forward_target(&mut self) -> TargetId {
        self.new_target(Direction::ForwardOnly)
    }

    pub(crate) fn is_linked(&self, id: TargetId) -> bool {
        self.targets.is_linked(id)
    }

    pub(crate) fn jump(&mut self, id: TargetId) -> Result<()> {
        self.targets.jump(id, &mut self.masm, &mut self.frame)
    }

    pub(crate) fn branch(
        &mut self,
        id: TargetId,
        cond: Cond,
        rs: Reg,
        rt: impl Into<Operand>,
    ) -> Result<()> {
        self.targets
            .branch(id, cond, rs, rt.into(), &mut self.masm, &mut self.frame)
    }

    /// Branches to `id` when the pending test holds.
    pub(crate) fn branch_on(&mut self, id: TargetId, pending: Pending) -> Result<()> {
        self.branch(id, pending.cond, pending.lhs, pending.rhs)
    }

    pub(crate) fn call_target(&mut self, id: TargetId) -> Result<()> {
        self.targets.call(id, &mut self.masm, &mut self.frame)
    }

    pub(crate) fn bind(&mut self, id: TargetId) -> Result<()> {
        self.targets.bind(id, &mut self.masm, &mut self.frame)
    }

    /// Jump through any shadowing try region to a break, continue or
    /// return target.
    pub(crate) fn jump_escaping(&mut self, id: TargetId) -> Result<()> {
        let resolved = self.shadows.resolve(id);
        self.jump(resolved)
    }

    // -----------------------------------------------------------------------
    // Deferred code
    // -----------------------------------------------------------------------

    pub(crate) fn register_deferred<G>(
        &mut self,
        comment: &'static str,
        preserve: Vec<Preserve>,
        generator: G,
    ) -> DeferredId
    where
        G: FnOnce(&mut Assembler) -> Result<()> + 'static,
    {
        self.deferred
            .register(&mut self.masm, comment, preserve, generator)
    }

    pub(crate) fn branch_deferred(
        &mut self,
        id: DeferredId,
        cond: Cond,
        rs: Reg,
        rt: impl Into<Operand>,
    ) {
        self.deferred.branch(&mut self.masm, id, cond, rs, rt);
    }

    pub(crate) fn bind_deferred_exit(&mut self, id: DeferredId) -> Result<()> {
        self.deferred.bind_exit(&mut self.masm, id)
    }

    /// Calls the stack check stub when `sp` is below the limit.
    pub(crate) fn check_stack(&mut self) -> Result<()> {
        if !self.options.stack_checks {
            return Ok(());
        }
        self.masm.comment("[ stack check");
        self.masm.load_external(Reg::T0, External::StackLimit);
        self.masm.lw(Reg::T0, MemOperand::new(Reg::T0, 0));
        let id = self.register_deferred("[ deferred stack check", vec![], |masm| {
            masm.call_stub(StubKey::StackCheck);
            Ok(())
        });
        self.branch_deferred(id, Cond::Ult, Reg::Sp, Reg::T0);
        self.bind_deferred_exit(id)
    }

    // -----------------------------------------------------------------------
    // Slots
    // -----------------------------------------------------------------------

    /// Memory operand of a parameter, local or context slot. For context
    /// slots the owning context is loaded into `tmp`.
    pub(crate) fn slot_operand(&mut self, location: VarLocation, tmp: Reg) -> Result<MemOperand> {
        match location {
            VarLocation::Parameter(index) => Ok(self.frame()?.parameter_at(index as usize)),
            VarLocation::Local(index) => Ok(self.frame()?.local_at(index as usize)),
            VarLocation::Context { depth, index } => {
                let mut context_reg = Reg::Cp;
                for _ in 0..depth {
                    self.masm
                        .lw(tmp, context_operand(context_reg, context::CLOSURE_INDEX));
                    self.masm
                        .lw(tmp, MemOperand::field(tmp, js_function::CONTEXT_OFFSET));
                    context_reg = tmp;
                }
                self.masm
                    .lw(tmp, context_operand(context_reg, context::FCONTEXT_INDEX));
                Ok(context_operand(tmp, index as i32))
            }
            VarLocation::Global | VarLocation::Lookup => Err(CodegenError::Unsupported(
                format!("{location:?} variable has no slot"),
            )),
        }
    }

    pub(crate) fn load_from_slot(&mut self, location: VarLocation) -> Result<()> {
        let operand = self.slot_operand(location, Reg::A2)?;
        self.masm.lw(Reg::V0, operand);
        self.emit_push(Reg::V0)
    }

    /// Stores the top of the frame into a slot, leaving it on the frame.
    pub(crate) fn store_to_slot(&mut self, location: VarLocation) -> Result<()> {
        let known_smi = matches!(
            self.frame()?.top(),
            Some(crate::frame::FrameElement::Constant(imm)) if imm.is_smi()
        );
        self.emit_pop(Reg::A0)?;
        let operand = self.slot_operand(location, Reg::A2)?;
        self.masm.sw(Reg::A0, operand);
        self.emit_push(Reg::A0)?;
        if matches!(location, VarLocation::Context { .. }) && !known_smi {
            let exit = self.masm.new_label();
            self.masm.and(Reg::T0, Reg::A0, 1);
            self.masm.branch(Cond::Eq, Reg::T0, 0, exit);
            self.masm.li(Reg::A3, operand.offset);
            self.masm.record_write(Reg::A2, Reg::A3);
            self.masm.bind(exit)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Visiting
    // -----------------------------------------------------------------------

    /// Counts one level of tree recursion; false once the limit is passed.
    fn enter_node(&mut self) -> bool {
        self.depth += 1;
        if self.depth <= self.options.max_depth {
            return true;
        }
        if !self.overflowed {
            warn!(
                function = %self.function.name,
                limit = self.options.max_depth,
                "tree too deep, abandoning function"
            );
            self.overflowed = true;
            self.masm.suppress();
        }
        false
    }

    pub(crate) fn visit_statements(&mut self, statements: &'t [Stmt]) -> Result<()> {
        for statement in statements {
            if self.frame.is_none() {
                break;
            }
            self.visit_stmt(statement)?;
        }
        Ok(())
    }

    pub(crate) fn visit_stmt(&mut self, statement: &'t Stmt) -> Result<()> {
        if self.frame.is_none() {
            return Ok(());
        }
        let height = self.height()?;
        trace!(kind = stmt::kind(statement), height, "statement");
        let result = if self.enter_node() {
            self.visit_stmt_inner(statement)
        } else {
            Ok(())
        };
        self.depth -= 1;
        result?;
        match &self.frame {
            Some(frame) => frame.assert_height(height, stmt::kind(statement)),
            None => Ok(()),
        }
    }

    pub(crate) fn visit_expr(
        &mut self,
        expr: &'t plinth_core::ast::Expr,
        branches: Branches,
    ) -> Result<Loaded> {
        let result = if self.enter_node() {
            self.visit_expr_inner(expr, branches)
        } else {
            self.push_smi(0).map(|()| Loaded::Value)
        };
        self.depth -= 1;
        result
    }

    /// Compiles `expr` for its truth value. Returns the pending test if one
    /// is left; otherwise either a value was pushed (when `force_test` is
    /// false) or all control already went to `branches`.
    pub(crate) fn load_condition(
        &mut self,
        expr: &'t plinth_core::ast::Expr,
        branches: Branches,
        force_test: bool,
    ) -> Result<Option<Pending>> {
        let height = self.height()?;
        match self.visit_expr(expr, branches)? {
            Loaded::Condition(pending) => {
                self.frame()?.assert_height(height, "condition")?;
                Ok(Some(pending))
            }
            Loaded::Value => {
                let Some(frame) = &self.frame else {
                    return Ok(None);
                };
                frame.assert_height(height + 1, "value")?;
                if force_test {
                    self.to_boolean(branches).map(Some)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Compiles `expr` for its value: exactly one element is pushed.
    pub(crate) fn load(&mut self, expr: &'t plinth_core::ast::Expr) -> Result<()> {
        let height = self.height()?;
        let on_true = self.forward_target();
        let on_false = self.forward_target();
        let pending = self.load_condition(expr, Branches::new(on_true, on_false), false)?;

        if let Some(pending) = pending {
            let materialize_true = self.forward_target();
            let loaded = self.forward_target();
            self.branch_on(materialize_true, pending)?;
            self.push_root(Root::False)?;
            self.jump(loaded)?;
            self.bind(materialize_true)?;
            self.push_root(Root::True)?;
            self.bind(loaded)?;
        }

        if self.is_linked(on_true) || self.is_linked(on_false) {
            let loaded = self.forward_target();
            if self.has_frame() {
                self.jump(loaded)?;
            }
            let both = self.is_linked(on_true) && self.is_linked(on_false);
            if self.is_linked(on_true) {
                self.bind(on_true)?;
                self.push_root(Root::True)?;
            }
            if both {
                self.jump(loaded)?;
            }
            if self.is_linked(on_false) {
                self.bind(on_false)?;
                self.push_root(Root::False)?;
            }
            self.bind(loaded)?;
        }
        self.frame()?.assert_height(height + 1, "load")
    }

    /// Lowers a construct the generator cannot compile. Strict mode fails
    /// the function; otherwise a trap is planted and compilation continues.
    pub(crate) fn unsupported(&mut self, construct: &str) -> Result<()> {
        if self.options.strict_unsupported {
            return Err(CodegenError::Unsupported(construct.to_string()));
        }
        error!(function = %self.function.name, construct, "lowering to a trap");
        self.masm.stop(format!("unsupported: {construct}"));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Breakable statements
    // -----------------------------------------------------------------------

    fn push_breakable(
        &mut self,
        label: LabelId,
        break_target: TargetId,
        continue_target: Option<TargetId>,
    ) {
        self.breakables.push(Breakable {
            label,
            break_target,
            continue_target,
        });
    }

    fn pop_breakable(&mut self) {
        self.breakables.pop();
    }

    fn find_breakable(&self, label: LabelId) -> Result<Breakable> {
        self.breakables
            .iter()
            .rev()
            .find(|b| b.label == label)
            .copied()
            .ok_or_else(|| CodegenError::Unsupported(format!("jump to unknown label {label}")))
    }
}

/// Operand of slot `index` of the context in `base`.
pub(crate) fn context_operand(base: Reg, index: i32) -> MemOperand {
    MemOperand::field(base, fixed_array::offset_of_element(index))
}

