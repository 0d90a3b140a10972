//! Operator tokens carried by the input tree.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

/// Arithmetic, bitwise and sequencing binary operators.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Sar,
    #[strum(serialize = ">>>")]
    Shr,
    #[strum(serialize = ",")]
    Comma,
}

impl BinaryOp {
    /// Operators whose operands may be swapped without changing the result.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::BitOr | BinaryOp::BitAnd | BinaryOp::BitXor
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Sar | BinaryOp::Shr)
    }
}

/// Short-circuiting operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "===")]
    EqStrict,
    #[strum(serialize = "!==")]
    NeStrict,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "instanceof")]
    InstanceOf,
}

impl CompareOp {
    /// The operator this one negates, for `!=` and `!==`.
    pub fn negated_equality(self) -> Option<CompareOp> {
        match self {
            CompareOp::Ne => Some(CompareOp::Eq),
            CompareOp::NeStrict => Some(CompareOp::EqStrict),
            _ => None,
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::EqStrict)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "~")]
    BitNot,
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "typeof")]
    Typeof,
    #[strum(serialize = "void")]
    Void,
    #[strum(serialize = "delete")]
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum CountOp {
    #[strum(serialize = "++")]
    Inc,
    #[strum(serialize = "--")]
    Dec,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn binary_ops_display_as_source_tokens() {
        let rendered: Vec<String> = BinaryOp::iter().map(|op| op.to_string()).collect();
        assert_eq!(rendered[0], "+");
        assert!(rendered.contains(&">>>".to_string()));
    }

    #[test]
    fn inequality_negates_equality() {
        assert_eq!(CompareOp::Ne.negated_equality(), Some(CompareOp::Eq));
        assert_eq!(CompareOp::NeStrict.negated_equality(), Some(CompareOp::EqStrict));
        assert_eq!(CompareOp::Lt.negated_equality(), None);
    }

    #[test]
    fn shifts_are_not_commutative() {
        for op in BinaryOp::iter().filter(|op| op.is_shift()) {
            assert!(!op.is_commutative());
        }
    }
}
