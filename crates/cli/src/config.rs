//! `whistle.toml`: optional defaults for every subcommand.
//!
//! ```toml
//! [compile]
//! include_source_positions = false
//! [engine]
//! parallel = false
//! max_stack_depth = 1000
//! [log]
//! level = "warn"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use whistle_compiler::CompileOptions;
use whistle_engine::EngineOptions;

/// File looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "whistle.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WhistleConfig {
    pub compile: CompileOptions,
    pub engine: EngineOptions,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// An `EnvFilter` directive such as `warn` or `whistle_engine=debug`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "warn".to_string(),
        }
    }
}

/// Reads the explicit config file, or `whistle.toml` in the working
/// directory if there is one, or falls back to the defaults.
pub fn load(explicit: Option<&Path>) -> Result<WhistleConfig, String> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !candidate.is_file() {
                return Ok(WhistleConfig::default());
            }
            candidate
        }
    };
    read_config(&path)
}

pub fn read_config(path: &Path) -> Result<WhistleConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}
