//! Simulator options, read from the `[vm]` table of `plinth.toml`.

use serde::{Deserialize, Serialize};

use crate::error::VmError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    pub heap_bytes: u32,
    pub stack_bytes: u32,
    /// Stack space kept below the limit the stack check compares against.
    pub stack_reserve_bytes: u32,
    /// Nested JS activations before a `RangeError`.
    pub max_call_depth: usize,
    /// Abort after this many instructions; zero for no limit.
    pub max_steps: u64,
    /// Scramble caller-saved registers after every stub and runtime call.
    pub clobber_caller_saved: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            heap_bytes: 4 << 20,
            stack_bytes: 256 << 10,
            stack_reserve_bytes: 4 << 10,
            max_call_depth: 400,
            max_steps: 50_000_000,
            clobber_caller_saved: false,
        }
    }
}

impl VmOptions {
    pub fn from_toml(source: &str) -> Result<Self, VmError> {
        toml::from_str(source).map_err(|e| VmError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tables_fill_defaults() {
        let options = VmOptions::from_toml("max_steps = 10\nclobber_caller_saved = true").unwrap();
        assert_eq!(options.max_steps, 10);
        assert!(options.clobber_caller_saved);
        assert_eq!(options.heap_bytes, VmOptions::default().heap_bytes);
    }
}
