//! Plinth core types.
//!
//! Shared by the code generator and the simulator: the resolved input
//! tree, the word-level value layout, the target instruction set and the
//! identifiers of shared stubs and runtime entry points.

pub mod ast;
pub mod isa;
pub mod layout;
pub mod module;
pub mod runtime;
pub mod token;
pub mod validate;

pub use isa::{Code, Cond, Instr, Label, MemOperand, Operand, Reg, Root};
pub use module::{CompiledFunction, FunctionId, Module};
pub use runtime::{MajorKey, OverwriteMode, RuntimeFunction, StubKey};
