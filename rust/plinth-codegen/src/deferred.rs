//! Out-of-line slow paths.
//!
//! A fast path that can fail registers a [`DeferredCode`] block and branches
//! to its entry label. Block bodies are emitted after the function body, in
//! registration order, each once. A body restores the registers it was
//! told to preserve and then jumps back to its exit label, where the fast
//! path continues.

use plinth_core::isa::{Cond, Label, MemOperand, Operand, Reg};
use tracing::trace;

use crate::error::Result;
use crate::masm::Assembler;

/// How a register survives the slow path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preserve {
    /// Pushed on entry, popped before leaving.
    Push(Reg),
    /// Reloaded from a frame slot before leaving.
    Reload(Reg, MemOperand),
}

type Generator = Box<dyn FnOnce(&mut Assembler) -> Result<()>>;

pub struct DeferredCode {
    pub entry: Label,
    pub exit: Label,
    comment: &'static str,
    preserve: Vec<Preserve>,
    generator: Generator,
}

impl std::fmt::Debug for DeferredCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredCode")
            .field("entry", &self.entry)
            .field("exit", &self.exit)
            .field("comment", &self.comment)
            .field("preserve", &self.preserve)
            .finish_non_exhaustive()
    }
}

/// Index of a registered block.
pub type DeferredId = usize;

/// Registered blocks of one function, in registration order.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    blocks: Vec<DeferredCode>,
}

impl DeferredQueue {
    /// Registers a block. `generator` emits the slow path itself; register
    /// preservation and the jump back are added around it.
    pub fn register<G>(
        &mut self,
        masm: &mut Assembler,
        comment: &'static str,
        preserve: Vec<Preserve>,
        generator: G,
    ) -> DeferredId
    where
        G: FnOnce(&mut Assembler) -> Result<()> + 'static,
    {
        self.blocks.push(DeferredCode {
            entry: masm.new_label(),
            exit: masm.new_label(),
            comment,
            preserve,
            generator: Box::new(generator),
        });
        self.blocks.len() - 1
    }

    pub fn get(&self, id: DeferredId) -> &DeferredCode {
        &self.blocks[id]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Conditional branch from the fast path into the block.
    pub fn branch(
        &self,
        masm: &mut Assembler,
        id: DeferredId,
        cond: Cond,
        rs: Reg,
        rt: impl Into<Operand>,
    ) {
        masm.branch(cond, rs, rt, self.blocks[id].entry);
    }

    pub fn jump(&self, masm: &mut Assembler, id: DeferredId) {
        masm.b(self.blocks[id].entry);
    }

    /// Marks where the fast path resumes after the block.
    pub fn bind_exit(&self, masm: &mut Assembler, id: DeferredId) -> Result<()> {
        masm.bind(self.blocks[id].exit)
    }

    /// Emits every block body. Consumes the queue.
    pub fn process(self, masm: &mut Assembler) -> Result<()> {
        for block in self.blocks {
            trace!(comment = block.comment, "emitting deferred block");
            masm.comment(block.comment);
            masm.bind(block.entry)?;
            for p in &block.preserve {
                if let Preserve::Push(reg) = p {
                    masm.push(*reg);
                }
            }
            (block.generator)(masm)?;
            for p in block.preserve.iter().rev() {
                match *p {
                    Preserve::Push(reg) => masm.pop(reg),
                    Preserve::Reload(reg, slot) => masm.lw(reg, slot),
                }
            }
            masm.b(block.exit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::isa::Instr;

    #[test]
    fn blocks_are_emitted_in_registration_order() {
        let mut masm = Assembler::new(false);
        let mut queue = DeferredQueue::default();
        let first = queue.register(&mut masm, "first", vec![], |m| {
            m.li(Reg::V0, 1);
            Ok(())
        });
        let second = queue.register(&mut masm, "second", vec![], |m| {
            m.li(Reg::V0, 2);
            Ok(())
        });
        queue.jump(&mut masm, first);
        queue.bind_exit(&mut masm, first).unwrap();
        queue.jump(&mut masm, second);
        queue.bind_exit(&mut masm, second).unwrap();
        masm.ret();
        queue.process(&mut masm).unwrap();
        let code = masm.finish().unwrap();
        let loads: Vec<i32> = code
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instr::Li(Reg::V0, v) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(loads, vec![1, 2]);
    }

    #[test]
    fn preserved_registers_wrap_the_body() {
        let mut masm = Assembler::new(false);
        let mut queue = DeferredQueue::default();
        let context = MemOperand::new(Reg::Fp, -4);
        let id = queue.register(
            &mut masm,
            "slow",
            vec![Preserve::Push(Reg::A1), Preserve::Reload(Reg::Cp, context)],
            |m| {
                m.li(Reg::V0, 0);
                Ok(())
            },
        );
        queue.jump(&mut masm, id);
        queue.bind_exit(&mut masm, id).unwrap();
        queue.process(&mut masm).unwrap();
        let code = masm.finish().unwrap();
        let tail: Vec<&Instr> = code.instructions.iter().skip(1).collect();
        assert_eq!(tail[0], &Instr::Push(Reg::A1));
        assert_eq!(tail[1], &Instr::Li(Reg::V0, 0));
        assert_eq!(tail[2], &Instr::Lw(Reg::Cp, context));
        assert_eq!(tail[3], &Instr::Pop(Reg::A1));
    }
}
