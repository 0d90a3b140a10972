//! Simulator errors.

use plinth_core::module::FunctionId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    /// An exception reached the outermost activation.
    #[error("uncaught exception: {0}")]
    Uncaught(String),
    /// A `stop` instruction was executed.
    #[error("trap: {0}")]
    Trap(String),
    #[error("function {0} has no code")]
    MissingCode(FunctionId),
    #[error("no function with id {0}")]
    UnknownFunction(FunctionId),
    #[error("step limit of {0} instructions exceeded")]
    StepLimit(u64),
    #[error("machine stack exhausted")]
    StackOverflow,
    #[error("invalid memory access at {address:#010x}")]
    InvalidAccess { address: u32 },
    #[error("heap exhausted allocating {0} bytes")]
    OutOfMemory(u32),
    #[error("bad operand: {0}")]
    BadOperand(String),
    #[error("jump to invalid code address {0:#010x}")]
    BadCodeAddress(u32),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VmError>;
