//! Plinth simulator.
//!
//! Executes a compiled [`Module`](plinth_core::Module) on a word-addressed
//! memory using the same object layouts the code generator emits loads and
//! stores against. Stubs and runtime functions are implemented on the host.

pub mod error;
pub mod heap;
pub mod machine;
pub mod memory;
pub mod options;
mod runtime;
mod stubs;
pub mod value;

pub use error::{Result, VmError};
pub use machine::{Stats, Vm};
pub use options::VmOptions;
pub use value::Value;

use plinth_core::Module;

/// Runs a module's main function on a fresh simulator.
pub fn run(module: &Module, options: VmOptions) -> Result<(Value, Vm)> {
    let mut vm = Vm::new(module, options)?;
    let value = vm.run_main()?;
    Ok((value, vm))
}
