//! Compiler configuration.
//!
//! This language has no FFI manifests, no external builtins, no link-time
//! library search — the only things a caller can reasonably vary are which
//! `cc` to invoke and whether to keep the intermediate `.ll` around after
//! linking.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration for one compilation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// The C compiler driver used to assemble and link the generated IR.
    /// Defaults to `cc`, which on most systems resolves to clang or a
    /// clang-compatible wrapper; `driver` requires whatever this resolves
    /// to be clang-compatible enough to accept `.ll` input and emit
    /// opaque-pointer IR (LLVM 15+, see `driver::MIN_CC_FOR_OPAQUE_PTR`).
    pub cc: PathBuf,

    /// Keep the intermediate `.ll` file next to the output executable
    /// instead of deleting it once linking succeeds.
    pub keep_ir: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            cc: PathBuf::from("cc"),
            keep_ir: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Use a specific `cc` binary instead of the one on `PATH`.
    pub fn with_cc(mut self, cc: impl Into<PathBuf>) -> Self {
        self.cc = cc.into();
        self
    }

    pub fn with_keep_ir(mut self, keep_ir: bool) -> Self {
        self.keep_ir = keep_ir;
        self
    }

    /// Parses a config from TOML, e.g. a `flowc.toml` next to the project
    /// being built. Any field absent from `toml_str` keeps its default.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("failed to parse config: {e}"))
    }

    /// Reads and parses a config file from disk.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_toml(&text)
    }
}
