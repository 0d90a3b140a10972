use std::path::PathBuf;

use plinth_codegen::CodegenError;
use plinth_vm::VmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid tree in '{path}': {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid toml in '{path}': {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{0} already exists, not overwriting")]
    Exists(PathBuf),
    #[error("cannot serialize: {0}")]
    Serialize(String),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Vm(#[from] VmError),
}

pub type Result<T> = std::result::Result<T, CliError>;
