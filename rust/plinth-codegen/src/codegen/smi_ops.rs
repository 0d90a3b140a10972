//! Inline arithmetic against a known small integer.
//!
//! When one operand of a binary operation is a smi literal the operation is
//! emitted inline for smi inputs, with a slow path calling the generic stub
//! for everything else: non-smi operands, overflow, and results that are
//! not representable as a smi.

use plinth_core::isa::{Cond, Reg};
use plinth_core::layout::{smi_from_int, SMI_MAX};
use plinth_core::runtime::{OverwriteMode, StubKey};
use plinth_core::token::BinaryOp;

use super::CodeGenerator;
use crate::error::Result;
use crate::masm::Assembler;

/// True for multipliers the fast path expands into shifts and adds: powers
/// of two, numbers with two bits set, and numbers one below a power of two.
pub fn is_easy_to_multiply_by(x: i32) -> bool {
    if x < 2 {
        return false;
    }
    if x > (SMI_MAX + 1) >> 2 {
        return false;
    }
    let bits = x as u32;
    bits.is_power_of_two() || bits.count_ones() == 2 || (bits + 1).is_power_of_two()
}

/// Mask whose intersection with a tagged operand is zero exactly when the
/// operand is a non-negative smi small enough that multiplying it by
/// `factor` stays a smi.
pub fn multiply_overflow_mask(factor: i32) -> u32 {
    let max_smi_that_wont_overflow = (SMI_MAX / factor) as u32;
    let max_tagged = max_smi_that_wont_overflow << 1;
    let mut mask: u32 = 0x8000_0000;
    while mask & max_tagged == 0 && mask != u32::MAX {
        mask |= mask >> 1;
    }
    mask | 1
}

/// `dst = src * factor` for a factor accepted by [`is_easy_to_multiply_by`].
/// `src` is left intact; `t0` is clobbered.
fn multiply_by_known_int(masm: &mut Assembler, src: Reg, dst: Reg, factor: i32) {
    let bits = factor as u32;
    if bits.is_power_of_two() {
        masm.sll(dst, src, bits.trailing_zeros() as u8);
    } else if bits.count_ones() == 2 {
        let first = bits.trailing_zeros();
        let second = 31 - bits.leading_zeros();
        masm.sll(Reg::T0, src, (second - first) as u8);
        masm.addu(dst, src, Reg::T0);
        if first != 0 {
            masm.sll(dst, dst, first as u8);
        }
    } else {
        let n = (bits + 1).trailing_zeros();
        masm.sll(Reg::T0, src, n as u8);
        masm.subu(dst, Reg::T0, src);
    }
}

impl<'t, 'c> CodeGenerator<'t, 'c> {
    /// `top op value` (or `value op top` when `reversed`). Pops the operand
    /// and leaves the result in `v0`; the caller pushes it.
    pub(crate) fn smi_operation(
        &mut self,
        op: BinaryOp,
        value: i32,
        reversed: bool,
        mode: OverwriteMode,
    ) -> Result<()> {
        self.masm.comment(format!("[ smi operation {op} {value}"));
        self.emit_pop(Reg::A1)?;
        let tagged = smi_from_int(value) as i32;

        let inline = match op {
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::BitOr
            | BinaryOp::BitAnd
            | BinaryOp::BitXor => true,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Sar => !reversed,
            BinaryOp::Mod => !reversed && value >= 2 && (value as u32).is_power_of_two(),
            BinaryOp::Mul => is_easy_to_multiply_by(value),
            _ => false,
        };
        if !inline {
            self.masm.li(Reg::A0, tagged);
            if reversed {
                self.emit_push(Reg::A0)?;
                self.emit_push(Reg::A1)?;
                return self.generic_binary_operation(op, mode, None);
            }
            self.emit_push(Reg::A1)?;
            self.emit_push(Reg::A0)?;
            return self.generic_binary_operation(op, mode, Some(value));
        }

        let shift_value = (value & 0x1f) as u8;
        let stub_operand = if op.is_shift() {
            smi_from_int(shift_value as i32) as i32
        } else {
            tagged
        };
        let key = StubKey::generic_binary(op, mode, Some(value));
        let id = self.register_deferred("[ deferred smi operation", vec![], move |masm| {
            if reversed {
                masm.mov(Reg::A0, Reg::A1);
                masm.li(Reg::A1, stub_operand);
            } else {
                masm.li(Reg::A0, stub_operand);
            }
            masm.call_stub(key);
            Ok(())
        });

        match op {
            BinaryOp::Add => {
                self.masm.addu(Reg::V0, Reg::A1, tagged);
                // Overflow iff the result's sign differs from both inputs'.
                self.masm.xor(Reg::T0, Reg::V0, Reg::A1);
                self.masm.xor(Reg::T1, Reg::V0, tagged);
                self.masm.and(Reg::T0, Reg::T0, Reg::T1);
                self.branch_deferred(id, Cond::Lt, Reg::T0, 0);
                self.smi_check_result(id);
            }
            BinaryOp::Sub => {
                self.masm.li(Reg::T0, tagged);
                if reversed {
                    self.masm.subu(Reg::V0, Reg::T0, Reg::A1);
                    self.masm.xor(Reg::T2, Reg::V0, Reg::T0);
                } else {
                    self.masm.subu(Reg::V0, Reg::A1, Reg::T0);
                    self.masm.xor(Reg::T2, Reg::V0, Reg::A1);
                }
                self.masm.xor(Reg::T1, Reg::T0, Reg::A1);
                self.masm.and(Reg::T2, Reg::T2, Reg::T1);
                self.branch_deferred(id, Cond::Lt, Reg::T2, 0);
                self.smi_check_result(id);
            }
            BinaryOp::BitOr | BinaryOp::BitAnd | BinaryOp::BitXor => {
                self.smi_check(id, Reg::A1);
                match op {
                    BinaryOp::BitOr => self.masm.or(Reg::V0, Reg::A1, tagged),
                    BinaryOp::BitAnd => self.masm.and(Reg::V0, Reg::A1, tagged),
                    _ => self.masm.xor(Reg::V0, Reg::A1, tagged),
                }
            }
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Sar => {
                self.smi_check(id, Reg::A1);
                self.masm.sra(Reg::A2, Reg::A1, 1);
                match op {
                    BinaryOp::Shl => {
                        self.shift_or_move(Reg::A2, shift_value, Assembler::sll);
                        // The untagged result must fit in 31 bits.
                        self.masm.addu(Reg::T3, Reg::V0, 0x4000_0000);
                        self.masm.and(Reg::T3, Reg::T3, 0x8000_0000u32 as i32);
                        self.branch_deferred(id, Cond::Ne, Reg::T3, 0);
                    }
                    BinaryOp::Shr => {
                        self.shift_or_move(Reg::A2, shift_value, Assembler::srl);
                        // Both top bits clear, or the value is no smi.
                        self.masm.and(Reg::T3, Reg::V0, 0xc000_0000u32 as i32);
                        self.branch_deferred(id, Cond::Ne, Reg::T3, 0);
                    }
                    _ => self.shift_or_move(Reg::A2, shift_value, Assembler::sra),
                }
                self.masm.sll(Reg::V0, Reg::V0, 1);
            }
            BinaryOp::Mod => {
                // Negative or non-smi operands take the slow path.
                self.masm.and(Reg::T0, Reg::A1, 0x8000_0001u32 as i32);
                self.branch_deferred(id, Cond::Ne, Reg::T0, 0);
                self.masm.and(Reg::V0, Reg::A1, (value << 1) - 1);
            }
            BinaryOp::Mul => {
                let mask = multiply_overflow_mask(value);
                self.masm.and(Reg::T0, Reg::A1, mask as i32);
                self.branch_deferred(id, Cond::Ne, Reg::T0, 0);
                multiply_by_known_int(&mut self.masm, Reg::A1, Reg::V0, value);
            }
            _ => unreachable!("{op} has no inline smi path"),
        }
        self.bind_deferred_exit(id)
    }

    fn smi_check(&mut self, id: crate::deferred::DeferredId, reg: Reg) {
        self.masm.and(Reg::T0, reg, 1);
        self.branch_deferred(id, Cond::Ne, Reg::T0, 0);
    }

    /// A non-smi input leaves its tag bit set in the result.
    fn smi_check_result(&mut self, id: crate::deferred::DeferredId) {
        self.smi_check(id, Reg::V0);
    }

    fn shift_or_move(&mut self, src: Reg, amount: u8, emit: fn(&mut Assembler, Reg, Reg, u8)) {
        if amount == 0 {
            self.masm.mov(Reg::V0, src);
        } else {
            emit(&mut self.masm, Reg::V0, src, amount);
        }
    }

    /// Both operands on the frame. A pair of smis is combined inline for
    /// the additive and bitwise operators; anything else calls the stub.
    pub(crate) fn binary_operation(&mut self, op: BinaryOp, mode: OverwriteMode) -> Result<()> {
        if !matches!(
            op,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::BitOr | BinaryOp::BitAnd | BinaryOp::BitXor
        ) {
            return self.generic_binary_operation(op, mode, None);
        }
        self.masm.comment(format!("[ inline binary operation {op}"));
        self.emit_pop(Reg::A0)?;
        self.emit_pop(Reg::A1)?;
        let key = StubKey::generic_binary(op, mode, None);
        let id = self.register_deferred("[ deferred binary operation", vec![], move |masm| {
            masm.call_stub(key);
            Ok(())
        });
        self.masm.or(Reg::T0, Reg::A0, Reg::A1);
        self.smi_check(id, Reg::T0);
        match op {
            BinaryOp::Add => {
                self.masm.addu(Reg::V0, Reg::A1, Reg::A0);
                self.masm.xor(Reg::T0, Reg::V0, Reg::A1);
                self.masm.xor(Reg::T1, Reg::V0, Reg::A0);
                self.masm.and(Reg::T0, Reg::T0, Reg::T1);
                self.branch_deferred(id, Cond::Lt, Reg::T0, 0);
            }
            BinaryOp::Sub => {
                self.masm.subu(Reg::V0, Reg::A1, Reg::A0);
                // Overflow iff the operand signs differ and the result's
                // sign differs from the left operand's.
                self.masm.xor(Reg::T0, Reg::V0, Reg::A1);
                self.masm.xor(Reg::T1, Reg::A1, Reg::A0);
                self.masm.and(Reg::T0, Reg::T0, Reg::T1);
                self.branch_deferred(id, Cond::Lt, Reg::T0, 0);
            }
            BinaryOp::BitOr => self.masm.or(Reg::V0, Reg::A1, Reg::A0),
            BinaryOp::BitAnd => self.masm.and(Reg::V0, Reg::A1, Reg::A0),
            _ => self.masm.xor(Reg::V0, Reg::A1, Reg::A0),
        }
        self.bind_deferred_exit(id)
    }

    /// Pops the right then the left operand and calls the binary op stub.
    /// The result is in `v0`.
    pub(crate) fn generic_binary_operation(
        &mut self,
        op: BinaryOp,
        mode: OverwriteMode,
        constant_rhs: Option<i32>,
    ) -> Result<()> {
        self.emit_pop(Reg::A0)?;
        self.emit_pop(Reg::A1)?;
        self.call_stub(StubKey::generic_binary(op, mode, constant_rhs), 0)
    }
}
