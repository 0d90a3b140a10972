//! Virtual frame: the compile-time model of a function activation.
//!
//! ```text
//!   fp + 8 + 4n      receiver
//!   fp + 8 + 4(n-1-i) parameter i
//!   fp + 4           return address
//!   fp + 0           caller's fp
//!   fp - 4           context
//!   fp - 8           function
//!   fp - 12 - 4i     local i
//!   ...              expression stack (tracked elements)
//! ```
//!
//! Only the expression stack is tracked element by element. Pushed constants
//! may stay unwritten until something needs the machine stack to be exact;
//! unwritten elements always form a contiguous segment at the top.

use plinth_core::isa::{ConstId, External, MemOperand, Reg, Root};
use plinth_core::layout::{stack_handler, POINTER_SIZE};
use plinth_core::runtime::{RuntimeFunction, StubKey};

use crate::error::{CodegenError, Result};
use crate::masm::Assembler;

/// Scratch register used to write out pending constants.
const SYNC_SCRATCH: Reg = Reg::At;

/// A compile-time known value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Imm {
    /// A tagged word, typically a smi.
    Word(u32),
    Root(Root),
    Handle(ConstId),
}

impl Imm {
    pub fn load(self, masm: &mut Assembler, rd: Reg) {
        match self {
            Imm::Word(w) => masm.li_word(rd, w),
            Imm::Root(root) => masm.load_root(rd, root),
            Imm::Handle(id) => masm.load_constant(rd, id),
        }
    }

    pub fn is_smi(self) -> bool {
        matches!(self, Imm::Word(w) if plinth_core::layout::is_smi(w))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameElement {
    /// Written to its stack slot.
    Memory,
    /// Pushed in the model only.
    Constant(Imm),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFrame {
    parameter_count: usize,
    local_count: usize,
    elements: Vec<FrameElement>,
}

impl VirtualFrame {
    pub fn new(parameter_count: usize, local_count: usize) -> Self {
        Self {
            parameter_count,
            local_count,
            elements: Vec::new(),
        }
    }

    /// A spilled frame of the same shape at `height`.
    pub fn at_height(&self, height: usize) -> Self {
        Self {
            parameter_count: self.parameter_count,
            local_count: self.local_count,
            elements: vec![FrameElement::Memory; height],
        }
    }

    pub fn height(&self) -> usize {
        self.elements.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn is_spilled(&self) -> bool {
        self.elements.iter().all(|e| *e == FrameElement::Memory)
    }

    pub fn top(&self) -> Option<FrameElement> {
        self.elements.last().copied()
    }

    pub fn assert_height(&self, expected: usize, node: &'static str) -> Result<()> {
        if self.height() != expected {
            return Err(CodegenError::FrameHeight {
                node,
                expected,
                found: self.height(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fixed slots
    // -----------------------------------------------------------------------

    pub fn parameter_at(&self, index: usize) -> MemOperand {
        let offset = 2 + (self.parameter_count - 1 - index) as i32;
        MemOperand::new(Reg::Fp, offset * POINTER_SIZE)
    }

    pub fn receiver(&self) -> MemOperand {
        MemOperand::new(Reg::Fp, (2 + self.parameter_count as i32) * POINTER_SIZE)
    }

    pub fn context(&self) -> MemOperand {
        MemOperand::new(Reg::Fp, -POINTER_SIZE)
    }

    pub fn function(&self) -> MemOperand {
        MemOperand::new(Reg::Fp, -2 * POINTER_SIZE)
    }

    pub fn local_at(&self, index: usize) -> MemOperand {
        MemOperand::new(Reg::Fp, -(3 + index as i32) * POINTER_SIZE)
    }

    /// Stack slot of the element `depth` positions below the top.
    /// Writes out pending constants first.
    pub fn element_at(&mut self, masm: &mut Assembler, depth: usize) -> MemOperand {
        self.spill_all(masm);
        MemOperand::new(Reg::Sp, depth as i32 * POINTER_SIZE)
    }

    // -----------------------------------------------------------------------
    // Activation
    // -----------------------------------------------------------------------

    /// Saves the caller's state and establishes `fp`. Expects the callee
    /// function in `a1` and its context in `cp`.
    pub fn enter(&mut self, masm: &mut Assembler) {
        masm.comment("[ enter JS frame");
        masm.push(Reg::Ra);
        masm.push(Reg::Fp);
        masm.mov(Reg::Fp, Reg::Sp);
        masm.push(Reg::Cp);
        masm.push(Reg::A1);
    }

    pub fn allocate_stack_slots(&mut self, masm: &mut Assembler) {
        if self.local_count == 0 {
            return;
        }
        masm.load_root(Reg::T0, Root::Undefined);
        for _ in 0..self.local_count {
            masm.push(Reg::T0);
        }
    }

    /// Tears down the activation and returns; the result is in `v0`.
    pub fn exit(&mut self, masm: &mut Assembler) {
        masm.comment("[ return sequence");
        masm.mov(Reg::Sp, Reg::Fp);
        masm.lw(Reg::Fp, MemOperand::new(Reg::Sp, 0));
        masm.lw(Reg::Ra, MemOperand::new(Reg::Sp, POINTER_SIZE));
        let popped = 2 + self.parameter_count as i32 + 1;
        masm.addu(Reg::Sp, Reg::Sp, popped * POINTER_SIZE);
        masm.ret();
    }

    /// Pushes a four-word handler record and links it as the innermost
    /// handler. The resume address must be in `ra`.
    pub fn push_try_handler(&mut self, masm: &mut Assembler, kind: i32) {
        self.spill_all(masm);
        masm.li(Reg::T0, kind);
        masm.load_external(Reg::T2, External::HandlerAddress);
        masm.lw(Reg::T1, MemOperand::new(Reg::T2, 0));
        masm.addu(Reg::Sp, Reg::Sp, -stack_handler::SIZE);
        masm.sw(Reg::Ra, MemOperand::new(Reg::Sp, stack_handler::PC_OFFSET));
        masm.sw(Reg::Fp, MemOperand::new(Reg::Sp, stack_handler::FP_OFFSET));
        masm.sw(Reg::T0, MemOperand::new(Reg::Sp, stack_handler::STATE_OFFSET));
        masm.sw(Reg::T1, MemOperand::new(Reg::Sp, stack_handler::NEXT_OFFSET));
        masm.sw(Reg::Sp, MemOperand::new(Reg::T2, 0));
        self.adjust(stack_handler::SIZE_IN_WORDS);
    }

    // -----------------------------------------------------------------------
    // Expression stack
    // -----------------------------------------------------------------------

    /// Writes every pending constant to the machine stack.
    pub fn spill_all(&mut self, masm: &mut Assembler) {
        let first = self
            .elements
            .iter()
            .position(|e| *e != FrameElement::Memory);
        let Some(first) = first else { return };
        for element in &mut self.elements[first..] {
            if let FrameElement::Constant(imm) = *element {
                imm.load(masm, SYNC_SCRATCH);
                masm.push(SYNC_SCRATCH);
                *element = FrameElement::Memory;
            }
        }
    }

    /// Pushes a known value without emitting code.
    pub fn push_constant(&mut self, imm: Imm) {
        self.elements.push(FrameElement::Constant(imm));
    }

    pub fn emit_push(&mut self, masm: &mut Assembler, rs: Reg) {
        self.spill_all(masm);
        masm.push(rs);
        self.elements.push(FrameElement::Memory);
    }

    pub fn emit_pop(&mut self, masm: &mut Assembler, rd: Reg) -> Result<()> {
        match self.elements.pop() {
            Some(FrameElement::Memory) => masm.pop(rd),
            Some(FrameElement::Constant(imm)) => imm.load(masm, rd),
            None => {
                return Err(CodegenError::FrameUnderflow {
                    requested: 1,
                    available: 0,
                })
            }
        }
        Ok(())
    }

    /// Pushes a copy of the top element.
    pub fn dup(&mut self, masm: &mut Assembler) -> Result<()> {
        match self.top() {
            Some(FrameElement::Constant(imm)) => self.push_constant(imm),
            Some(FrameElement::Memory) => {
                let top = self.element_at(masm, 0);
                masm.lw(Reg::T0, top);
                self.emit_push(masm, Reg::T0);
            }
            None => {
                return Err(CodegenError::FrameUnderflow {
                    requested: 1,
                    available: 0,
                })
            }
        }
        Ok(())
    }

    /// Removes `count` elements from the top.
    pub fn drop(&mut self, masm: &mut Assembler, count: usize) -> Result<()> {
        self.check_available(count)?;
        let mut written = 0;
        for _ in 0..count {
            if let Some(FrameElement::Memory) = self.elements.pop() {
                written += 1;
            }
        }
        if written > 0 {
            masm.addu(Reg::Sp, Reg::Sp, written * POINTER_SIZE);
        }
        Ok(())
    }

    /// Forgets `count` written elements whose stack space was already
    /// released by other means.
    pub fn forget(&mut self, count: usize) -> Result<()> {
        self.check_available(count)?;
        let new_len = self.elements.len() - count;
        self.elements.truncate(new_len);
        Ok(())
    }

    /// Records `count` elements pushed outside the model.
    pub fn adjust(&mut self, count: usize) {
        self.elements
            .extend(std::iter::repeat(FrameElement::Memory).take(count));
    }

    fn check_available(&self, count: usize) -> Result<()> {
        if count > self.elements.len() {
            return Err(CodegenError::FrameUnderflow {
                requested: count,
                available: self.elements.len(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Calls a stub that pops `arg_count` stack arguments.
    pub fn call_stub(
        &mut self,
        masm: &mut Assembler,
        key: StubKey,
        arg_count: usize,
    ) -> Result<()> {
        self.spill_all(masm);
        self.check_available(arg_count)?;
        masm.call_stub(key);
        self.forget(arg_count)
    }

    pub fn call_runtime(
        &mut self,
        masm: &mut Assembler,
        function: RuntimeFunction,
        arg_count: usize,
    ) -> Result<()> {
        self.spill_all(masm);
        self.check_available(arg_count)?;
        masm.call_runtime(function, arg_count as u8);
        self.forget(arg_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::isa::Instr;
    use plinth_core::layout::smi_from_int;

    fn instrs(masm: Assembler) -> Vec<Instr> {
        masm.finish().expect("finish").instructions
    }

    #[test]
    fn fixed_slot_offsets() {
        let frame = VirtualFrame::new(2, 3);
        assert_eq!(frame.parameter_at(0).offset, 12);
        assert_eq!(frame.parameter_at(1).offset, 8);
        assert_eq!(frame.receiver().offset, 16);
        assert_eq!(frame.context().offset, -4);
        assert_eq!(frame.function().offset, -8);
        assert_eq!(frame.local_at(2).offset, -20);
    }

    #[test]
    fn constants_stay_pending_until_spilled() {
        let mut masm = Assembler::new(false);
        let mut frame = VirtualFrame::new(0, 0);
        frame.push_constant(Imm::Word(smi_from_int(3)));
        frame.push_constant(Imm::Root(Root::Undefined));
        assert_eq!(frame.height(), 2);
        assert!(!frame.is_spilled());
        assert_eq!(masm.pc(), 0);
        frame.spill_all(&mut masm);
        assert!(frame.is_spilled());
        assert_eq!(masm.pc(), 4);
    }

    #[test]
    fn register_push_writes_out_constants_below_it() {
        let mut masm = Assembler::new(false);
        let mut frame = VirtualFrame::new(0, 0);
        frame.push_constant(Imm::Word(smi_from_int(1)));
        frame.emit_push(&mut masm, Reg::V0);
        let code = instrs(masm);
        assert_eq!(code.last(), Some(&Instr::Push(Reg::V0)));
        assert_eq!(code.len(), 3);
    }

    #[test]
    fn popping_a_constant_loads_it_directly() {
        let mut masm = Assembler::new(false);
        let mut frame = VirtualFrame::new(0, 0);
        frame.push_constant(Imm::Word(smi_from_int(5)));
        frame.emit_pop(&mut masm, Reg::A0).expect("pop");
        assert_eq!(instrs(masm), vec![Instr::Li(Reg::A0, 10)]);
    }

    #[test]
    fn drop_only_moves_sp_for_written_elements() {
        let mut masm = Assembler::new(false);
        let mut frame = VirtualFrame::new(0, 0);
        frame.emit_push(&mut masm, Reg::V0);
        frame.emit_push(&mut masm, Reg::V0);
        frame.push_constant(Imm::Root(Root::Null));
        frame.drop(&mut masm, 3).expect("drop");
        assert_eq!(frame.height(), 0);
        let code = instrs(masm);
        assert!(matches!(
            code.last(),
            Some(Instr::Alu { rt: plinth_core::isa::Operand::Imm(8), .. })
        ));
    }

    #[test]
    fn underflow_is_reported() {
        let mut masm = Assembler::new(false);
        let mut frame = VirtualFrame::new(0, 0);
        assert!(matches!(
            frame.drop(&mut masm, 1),
            Err(CodegenError::FrameUnderflow { requested: 1, available: 0 })
        ));
    }

    #[test]
    fn calls_consume_their_arguments() {
        let mut masm = Assembler::new(false);
        let mut frame = VirtualFrame::new(0, 0);
        frame.emit_push(&mut masm, Reg::V0);
        frame.emit_push(&mut masm, Reg::V0);
        frame
            .call_runtime(&mut masm, RuntimeFunction::HasProperty, 2)
            .expect("call");
        assert_eq!(frame.height(), 0);
    }

    #[test]
    fn try_handler_occupies_four_elements() {
        let mut masm = Assembler::new(false);
        let mut frame = VirtualFrame::new(0, 0);
        frame.push_try_handler(&mut masm, stack_handler::TRY_CATCH);
        assert_eq!(frame.height(), 4);
    }
}
