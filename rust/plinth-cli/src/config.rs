//! Configuration file parsing for `plinth.toml`.
//!
//! The file is searched for in the current directory and then each of its
//! ancestors. Missing tables and keys take their defaults.

use std::path::{Path, PathBuf};

use plinth_codegen::CompileOptions;
use plinth_vm::VmOptions;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

pub const CONFIG_FILE: &str = "plinth.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlinthConfig {
    pub compile: CompileOptions,
    pub vm: VmOptions,
}

impl PlinthConfig {
    pub fn from_toml(source: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| CliError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Nearest `plinth.toml` at or above `start`.
    pub fn find_from(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Loads the nearest config above the current directory, or defaults
    /// when there is none. A config that exists but does not parse is an
    /// error.
    pub fn discover() -> Result<(Option<PathBuf>, Self)> {
        let Ok(cwd) = std::env::current_dir() else {
            return Ok((None, Self::default()));
        };
        match Self::find_from(&cwd) {
            Some(path) => {
                let config = Self::load_from(&path)?;
                Ok((Some(path), config))
            }
            None => Ok((None, Self::default())),
        }
    }

    pub fn default_template() -> &'static str {
        r#"# Plinth configuration

[compile]
# Tree nesting depth at which a function is given up on.
max_depth = 256
# Fail instead of emitting a trap for constructs the code generator lacks.
strict_unsupported = false
stack_checks = true
comments = true

[vm]
heap_bytes = 4194304
stack_bytes = 262144
max_call_depth = 400
# Zero disables the limit.
max_steps = 50000000
clobber_caller_saved = false
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = PlinthConfig::from_toml("").unwrap();
        assert_eq!(config, PlinthConfig::default());
    }

    #[test]
    fn tables_are_independent() {
        let config = PlinthConfig::from_toml("[vm]\nmax_steps = 99\n").unwrap();
        assert_eq!(config.vm.max_steps, 99);
        assert_eq!(config.compile, CompileOptions::default());
    }

    #[test]
    fn default_template_parses_to_defaults() {
        let config = PlinthConfig::from_toml(PlinthConfig::default_template()).unwrap();
        assert_eq!(config.compile, CompileOptions::default());
        assert_eq!(config.vm.max_call_depth, VmOptions::default().max_call_depth);
        assert_eq!(config.vm.max_steps, VmOptions::default().max_steps);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(PlinthConfig::from_toml("[compile]\nmax_depth = \"deep\"\n").is_err());
    }
}
