//! Compilation options.
//!
//! Normally read from the `[compile]` table of `plinth.toml`:
//!
//! ```toml
//! [compile]
//! max_depth = 200
//! strict_unsupported = false
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CodegenError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Tree nesting depth at which a function is abandoned.
    pub max_depth: usize,
    /// Fail compilation on an unsupported lowering instead of emitting a trap.
    pub strict_unsupported: bool,
    /// Emit stack limit checks at function entry and loop back edges.
    pub stack_checks: bool,
    /// Interleave comment pseudo-instructions with the code.
    pub comments: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_depth: 256,
            strict_unsupported: false,
            stack_checks: true,
            comments: true,
        }
    }
}

impl CompileOptions {
    pub fn from_toml(source: &str) -> Result<Self, CodegenError> {
        toml::from_str(source).map_err(|e| CodegenError::Config(e.to_string()))
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_unsupported = true;
        self
    }
}
