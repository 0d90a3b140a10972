//! Instruction emitter.
//!
//! Collects instructions into a buffer, hands out labels, and resolves every
//! referenced label when the code object is finished. Emission can be
//! suppressed: once a function is known to be abandoned the walk keeps going
//! for bookkeeping, but nothing more is recorded.

use plinth_core::isa::{
    AluOp, Code, Cond, ConstId, Constant, External, Instr, Label, MemOperand, Operand, Reg, Root,
    ShiftOp,
};
use plinth_core::runtime::{RuntimeFunction, StubKey};

use crate::error::{CodegenError, Result};

#[derive(Debug, Default)]
pub struct Assembler {
    instructions: Vec<Instr>,
    labels: Vec<Option<usize>>,
    referenced: Vec<bool>,
    constants: Vec<Constant>,
    suppressed: bool,
    comments: bool,
}

impl Assembler {
    pub fn new(comments: bool) -> Self {
        Self {
            comments,
            ..Self::default()
        }
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        self.referenced.push(false);
        Label(self.labels.len() as u32 - 1)
    }

    pub fn bind(&mut self, label: Label) -> Result<()> {
        let slot = &mut self.labels[label.0 as usize];
        if slot.is_some() && !self.suppressed {
            return Err(CodegenError::DoubleBind(label.0 as usize));
        }
        *slot = Some(self.instructions.len());
        Ok(())
    }

    pub fn is_bound(&self, label: Label) -> bool {
        self.labels[label.0 as usize].is_some()
    }

    /// Index of the next instruction.
    pub fn pc(&self) -> usize {
        self.instructions.len()
    }

    /// Stop recording instructions for the rest of this function.
    pub fn suppress(&mut self) {
        self.suppressed = true;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn emit(&mut self, instr: Instr) {
        if self.suppressed {
            return;
        }
        match &instr {
            Instr::Branch { target, .. } | Instr::Bal(target) => {
                self.referenced[target.0 as usize] = true;
            }
            _ => {}
        }
        self.instructions.push(instr);
    }

    /// Adds a constant to the pool, reusing an equal entry.
    pub fn constant(&mut self, value: Constant) -> ConstId {
        if let Some(i) = self.constants.iter().position(|c| *c == value) {
            return ConstId(i as u32);
        }
        self.constants.push(value);
        ConstId(self.constants.len() as u32 - 1)
    }

    pub fn finish(self) -> Result<Code> {
        let end = self.instructions.len();
        let mut labels = Vec::with_capacity(self.labels.len());
        for (i, pos) in self.labels.iter().enumerate() {
            match pos {
                Some(p) => labels.push(*p),
                None if self.referenced[i] => {
                    return Err(CodegenError::UnboundLabel(Label(i as u32)))
                }
                None => labels.push(end),
            }
        }
        Ok(Code {
            instructions: self.instructions,
            labels,
            constants: self.constants,
        })
    }

    // -----------------------------------------------------------------------
    // Instruction helpers
    // -----------------------------------------------------------------------

    pub fn comment(&mut self, text: impl Into<String>) {
        if self.comments {
            self.emit(Instr::Comment(text.into()));
        }
    }

    pub fn li(&mut self, rd: Reg, value: i32) {
        self.emit(Instr::Li(rd, value));
    }

    /// Loads a tagged word (smi or raw bit pattern).
    pub fn li_word(&mut self, rd: Reg, word: u32) {
        self.emit(Instr::Li(rd, word as i32));
    }

    pub fn load_constant(&mut self, rd: Reg, id: ConstId) {
        self.emit(Instr::LoadConstant(rd, id));
    }

    pub fn load_root(&mut self, rd: Reg, root: Root) {
        self.emit(Instr::LoadRoot(rd, root));
    }

    pub fn load_external(&mut self, rd: Reg, ext: External) {
        self.emit(Instr::LoadExternal(rd, ext));
    }

    pub fn mov(&mut self, rd: Reg, rs: Reg) {
        if rd != rs {
            self.emit(Instr::Move(rd, rs));
        }
    }

    pub fn lw(&mut self, rt: Reg, mem: MemOperand) {
        self.emit(Instr::Lw(rt, mem));
    }

    pub fn sw(&mut self, rt: Reg, mem: MemOperand) {
        self.emit(Instr::Sw(rt, mem));
    }

    pub fn alu(&mut self, op: AluOp, rd: Reg, rs: Reg, rt: impl Into<Operand>) {
        self.emit(Instr::Alu {
            op,
            rd,
            rs,
            rt: rt.into(),
        });
    }

    pub fn addu(&mut self, rd: Reg, rs: Reg, rt: impl Into<Operand>) {
        self.alu(AluOp::Addu, rd, rs, rt);
    }

    pub fn subu(&mut self, rd: Reg, rs: Reg, rt: impl Into<Operand>) {
        self.alu(AluOp::Subu, rd, rs, rt);
    }

    pub fn and(&mut self, rd: Reg, rs: Reg, rt: impl Into<Operand>) {
        self.alu(AluOp::And, rd, rs, rt);
    }

    pub fn or(&mut self, rd: Reg, rs: Reg, rt: impl Into<Operand>) {
        self.alu(AluOp::Or, rd, rs, rt);
    }

    pub fn xor(&mut self, rd: Reg, rs: Reg, rt: impl Into<Operand>) {
        self.alu(AluOp::Xor, rd, rs, rt);
    }

    pub fn shift(&mut self, op: ShiftOp, rd: Reg, rt: Reg, sa: u8) {
        self.emit(Instr::Shift { op, rd, rt, sa });
    }

    pub fn sll(&mut self, rd: Reg, rt: Reg, sa: u8) {
        self.shift(ShiftOp::Sll, rd, rt, sa);
    }

    pub fn srl(&mut self, rd: Reg, rt: Reg, sa: u8) {
        self.shift(ShiftOp::Srl, rd, rt, sa);
    }

    pub fn sra(&mut self, rd: Reg, rt: Reg, sa: u8) {
        self.shift(ShiftOp::Sra, rd, rt, sa);
    }

    pub fn branch(&mut self, cond: Cond, rs: Reg, rt: impl Into<Operand>, target: Label) {
        self.emit(Instr::Branch {
            cond,
            rs,
            rt: rt.into(),
            target,
        });
    }

    /// Unconditional branch.
    pub fn b(&mut self, target: Label) {
        self.branch(Cond::Always, Reg::Zero, Reg::Zero, target);
    }

    pub fn bal(&mut self, target: Label) {
        self.emit(Instr::Bal(target));
    }

    pub fn jr(&mut self, rs: Reg) {
        self.emit(Instr::Jr(rs));
    }

    pub fn ret(&mut self) {
        self.jr(Reg::Ra);
    }

    pub fn push(&mut self, rs: Reg) {
        self.emit(Instr::Push(rs));
    }

    pub fn pop(&mut self, rd: Reg) {
        self.emit(Instr::Pop(rd));
    }

    pub fn call_stub(&mut self, key: StubKey) {
        self.emit(Instr::CallStub(key));
    }

    pub fn call_runtime(&mut self, function: RuntimeFunction, argc: u8) {
        self.emit(Instr::CallRuntime { function, argc });
    }

    pub fn record_write(&mut self, object: Reg, offset: Reg) {
        self.emit(Instr::RecordWrite { object, offset });
    }

    pub fn stop(&mut self, message: impl Into<String>) {
        self.emit(Instr::Stop(message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_branches_resolve_on_finish() {
        let mut masm = Assembler::new(false);
        let done = masm.new_label();
        masm.b(done);
        masm.li(Reg::V0, 1);
        masm.bind(done).expect("bind");
        masm.ret();
        let code = masm.finish().expect("finish");
        assert_eq!(code.label_position(done), Some(2));
    }

    #[test]
    fn referenced_unbound_label_is_an_error() {
        let mut masm = Assembler::new(false);
        let dangling = masm.new_label();
        masm.b(dangling);
        assert_eq!(masm.finish().unwrap_err(), CodegenError::UnboundLabel(dangling));
    }

    #[test]
    fn constants_are_deduplicated() {
        let mut masm = Assembler::new(false);
        let a = masm.constant(Constant::String("x".into()));
        let b = masm.constant(Constant::Number(1.5));
        let c = masm.constant(Constant::String("x".into()));
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn suppressed_assembler_records_nothing() {
        let mut masm = Assembler::new(true);
        masm.li(Reg::V0, 1);
        masm.suppress();
        masm.li(Reg::V0, 2);
        masm.comment("ignored");
        assert_eq!(masm.pc(), 1);
    }

    #[test]
    fn self_move_is_elided() {
        let mut masm = Assembler::new(false);
        masm.mov(Reg::A0, Reg::A0);
        assert_eq!(masm.pc(), 0);
    }
}
