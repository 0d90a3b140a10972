//! Results of compiling an expression.
//!
//! A comparison does not have to produce a boolean object. It can leave a
//! [`Pending`] test in the two reserved condition registers and let the
//! consumer decide: a branch tests it directly, a value context turns it
//! into `true`/`false`.

use plinth_core::isa::{Cond, Operand, Reg, COND1, COND2};

use crate::merge::TargetId;

/// A computed but unconsumed test: `lhs cond rhs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    pub cond: Cond,
    pub lhs: Reg,
    pub rhs: Operand,
}

impl Pending {
    /// Test on the two condition registers.
    pub fn on_cond_regs(cond: Cond) -> Self {
        Self {
            cond,
            lhs: COND1,
            rhs: Operand::Reg(COND2),
        }
    }

    pub fn negate(self) -> Self {
        Self {
            cond: self.cond.negate(),
            ..self
        }
    }
}

/// What an expression visitor left behind, besides any edges it sent to
/// the true/false targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loaded {
    /// One value pushed on the frame.
    Value,
    /// Nothing pushed; the test is pending.
    Condition(Pending),
}

/// Where control goes when an expression evaluates to true or false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branches {
    pub on_true: TargetId,
    pub on_false: TargetId,
}

impl Branches {
    pub fn new(on_true: TargetId, on_false: TargetId) -> Self {
        Self { on_true, on_false }
    }

    pub fn swapped(self) -> Self {
        Self {
            on_true: self.on_false,
            on_false: self.on_true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_keeps_operands() {
        let p = Pending::on_cond_regs(Cond::Lt).negate();
        assert_eq!(p.cond, Cond::Ge);
        assert_eq!(p.lhs, COND1);
        assert_eq!(p.rhs, Operand::Reg(COND2));
    }

    #[test]
    fn swapping_branches_exchanges_targets() {
        let b = Branches::new(1, 2).swapped();
        assert_eq!((b.on_true, b.on_false), (2, 1));
    }
}
