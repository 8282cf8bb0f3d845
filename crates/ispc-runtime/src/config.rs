//! Coordinator configuration (§6 expansion, "Configuration"): the handful of
//! execution limits the node hard-codes as constants
//! (`MAX_BYTECODE_SIZE`, `MAX_EXECUTION_SECS`, the allocator's `GUARD_SIZE`,
//! ONNX's `DEFAULT_CONCURRENCY`) made overridable through one JSON file,
//! the same way the node loads a single config file at startup rather than
//! reading scattered environment variables. The wider recognized-options
//! list in spec.md §6 (node endpoint, wallet paths, ...) belongs to the
//! surrounding node process, not this execution core, and is out of scope
//! here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The coordinator's on-disk configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum WASM module size accepted for execution, in bytes.
    /// Matches the node's `MAX_BYTECODE_SIZE`.
    pub max_bytecode_size: usize,
    /// Wall-clock ceiling on a single WASM call before the timeout safety
    /// net fires. Matches the node's `MAX_EXECUTION_SECS`.
    pub wasm_execution_timeout_secs: u64,
    /// Bytes of head-room the per-module bump allocator keeps free at the
    /// top of linear memory before it grows. Matches the node's
    /// `GUARD_SIZE`.
    pub allocator_guard_size: u32,
    /// Maximum number of ONNX inference sessions allowed to run
    /// concurrently. Matches the node's `DEFAULT_CONCURRENCY`.
    pub onnx_concurrency_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            max_bytecode_size: 1_048_576,
            wasm_execution_timeout_secs: 5,
            allocator_guard_size: 8_192,
            onnx_concurrency_limit: 10,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "config parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl CoordinatorConfig {
    /// Load the config file at `path`, or fall back to
    /// [`CoordinatorConfig::default`] if it doesn't exist yet — a fresh
    /// install runs with the node's own hard-coded limits until an operator
    /// writes an override file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(CoordinatorConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// The conventional config path: `<home>/.ispc/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(PathBuf::from(home).join(".ispc").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loading_a_missing_file_yields_defaults_matching_the_hardcoded_limits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = CoordinatorConfig::load(&path).unwrap();
        assert_eq!(config.max_bytecode_size, 1_048_576);
        assert_eq!(config.wasm_execution_timeout_secs, 5);
        assert_eq!(config.allocator_guard_size, 8_192);
        assert_eq!(config.onnx_concurrency_limit, 10);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = CoordinatorConfig {
            max_bytecode_size: 2_097_152,
            wasm_execution_timeout_secs: 10,
            allocator_guard_size: 16_384,
            onnx_concurrency_limit: 4,
        };
        config.save(&path).unwrap();
        let loaded = CoordinatorConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_fields_in_a_partial_file_default_individually() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"onnx_concurrency_limit": 2}"#).unwrap();
        let config = CoordinatorConfig::load(&path).unwrap();
        assert_eq!(config.onnx_concurrency_limit, 2);
        assert_eq!(config.max_bytecode_size, 1_048_576);
    }
}
