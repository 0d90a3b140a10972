//! Compiled output: one code object per function literal.

use serde::{Deserialize, Serialize};

use crate::isa::Code;
use crate::runtime::StubKey;

/// Index of a function literal in compilation order. The outermost
/// function is always `0`.
pub type FunctionId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub id: FunctionId,
    pub name: String,
    pub parameter_count: u32,
    pub heap_slots: u32,
    /// `None` when compilation of this function was abandoned.
    pub code: Option<Code>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub functions: Vec<CompiledFunction>,
    /// Distinct stubs referenced by any function, in first-use order.
    pub stubs: Vec<StubKey>,
}

impl Module {
    pub fn function(&self, id: FunctionId) -> Option<&CompiledFunction> {
        self.functions.get(id as usize)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&CompiledFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Functions that produced no code.
    pub fn failed(&self) -> impl Iterator<Item = &CompiledFunction> {
        self.functions.iter().filter(|f| f.code.is_none())
    }
}
