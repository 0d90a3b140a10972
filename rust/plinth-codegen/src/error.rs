//! Code generation errors.

use plinth_core::isa::Label;
use plinth_core::validate::TreeError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CodegenError {
    /// A visitor left the frame at the wrong height. Always a compiler bug.
    #[error("frame height mismatch after {node}: expected {expected}, found {found}")]
    FrameHeight {
        node: &'static str,
        expected: usize,
        found: usize,
    },
    /// Two edges reached one merge point with different frames.
    #[error("merge point {target} reached with height {found}, bound at {expected}")]
    MergeMismatch {
        target: usize,
        expected: usize,
        found: usize,
    },
    #[error("merge point {0} bound twice")]
    DoubleBind(usize),
    #[error("backward jump to forward-only merge point {0}")]
    BackwardJump(usize),
    #[error("operation needs a live frame but the current position is unreachable")]
    NoFrame,
    #[error("frame underflow: popped {requested} of {available} elements")]
    FrameUnderflow { requested: usize, available: usize },
    #[error("label {0} referenced but never bound")]
    UnboundLabel(Label),
    #[error("compile-time recursion limit {limit} exceeded in {function}")]
    StackOverflow { function: String, limit: usize },
    #[error("unsupported lowering: {0}")]
    Unsupported(String),
    #[error("invalid tree: {0}")]
    InvalidTree(#[from] TreeError),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CodegenError>;
