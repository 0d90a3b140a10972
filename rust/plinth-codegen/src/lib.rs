//! Plinth baseline code generation.
//!
//! Walks a resolved function tree once and emits code for the Plinth
//! simulator. Expressions compute into a virtual frame that mirrors the
//! machine stack; control flow meets at merge points that agree on the
//! frame height; rare paths are queued as deferred blocks and emitted after
//! the function body.

pub mod codegen;
pub mod compiler;
pub mod condition;
pub mod deferred;
pub mod error;
pub mod frame;
pub mod masm;
pub mod merge;
pub mod options;
pub mod shadow;
pub mod stubs;

pub use codegen::CodeGenerator;
pub use compiler::{compile, compile_function, FunctionQueue};
pub use error::{CodegenError, Result};
pub use options::CompileOptions;
pub use stubs::StubCache;
