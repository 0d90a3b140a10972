//! Word-addressed simulator memory.
//!
//! ```text
//!   0 .. 64              unmapped; catches null dereferences
//!   64                   handler chain head
//!   68                   stack limit
//!   HEAP_START ..        bump-allocated heap
//!   .. stack_top         machine stack, growing down
//! ```
//!
//! Code lives outside this space. A code address names a function and an
//! instruction index; see [`code_address`].

use plinth_core::isa::External;
use plinth_core::module::FunctionId;

use crate::error::{Result, VmError};

pub const HANDLER_ADDRESS: u32 = 64;
pub const STACK_LIMIT_ADDRESS: u32 = 68;
const FIRST_MAPPED: u32 = 64;
const HEAP_START: u32 = 128;

const CODE_SPACE: u32 = 0xF000_0000;
/// Return address handed to a function entered from the host.
pub const HOST_RETURN: u32 = 0xFFFF_FFF0;

/// Address of instruction `pc` of function `id`.
pub fn code_address(id: FunctionId, pc: usize) -> u32 {
    CODE_SPACE | (id << 16) | pc as u32
}

pub fn decode_code_address(address: u32) -> Option<(FunctionId, usize)> {
    if address & CODE_SPACE != CODE_SPACE || address == HOST_RETURN {
        return None;
    }
    Some(((address & !CODE_SPACE) >> 16, (address & 0xffff) as usize))
}

#[derive(Debug)]
pub struct Memory {
    words: Vec<u32>,
    heap_top: u32,
    heap_end: u32,
    stack_top: u32,
}

impl Memory {
    pub fn new(heap_bytes: u32, stack_bytes: u32) -> Self {
        let heap_end = HEAP_START + (heap_bytes & !3);
        let stack_top = heap_end + (stack_bytes & !3);
        Self {
            words: vec![0; (stack_top / 4) as usize],
            heap_top: HEAP_START,
            heap_end,
            stack_top,
        }
    }

    fn index(&self, address: u32) -> Result<usize> {
        let index = (address / 4) as usize;
        if address % 4 != 0 || address < FIRST_MAPPED || index >= self.words.len() {
            return Err(VmError::InvalidAccess { address });
        }
        Ok(index)
    }

    pub fn read(&self, address: u32) -> Result<u32> {
        self.index(address).map(|i| self.words[i])
    }

    pub fn write(&mut self, address: u32, value: u32) -> Result<()> {
        let i = self.index(address)?;
        self.words[i] = value;
        Ok(())
    }

    /// Reserves `bytes` of zeroed heap, returning the untagged address.
    pub fn allocate(&mut self, bytes: u32) -> Result<u32> {
        let size = (bytes + 3) & !3;
        let address = self.heap_top;
        if self.heap_end - address < size {
            return Err(VmError::OutOfMemory(bytes));
        }
        self.heap_top += size;
        Ok(address)
    }

    pub fn is_heap_address(&self, address: u32) -> bool {
        (HEAP_START..self.heap_top).contains(&address)
    }

    pub fn heap_used(&self) -> u32 {
        self.heap_top - HEAP_START
    }

    /// Initial stack pointer.
    pub fn stack_top(&self) -> u32 {
        self.stack_top
    }

    /// Lowest stack address.
    pub fn stack_base(&self) -> u32 {
        self.heap_end
    }

    pub fn external(&self, external: External) -> u32 {
        match external {
            External::HandlerAddress => HANDLER_ADDRESS,
            External::StackLimit => STACK_LIMIT_ADDRESS,
        }
    }
}
