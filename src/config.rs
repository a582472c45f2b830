//! VM settings, loadable from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blocks::GameType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {source}")]
    Parse { source: toml::de::Error },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Ceiling on executed statements plus loop iterations per run.
    pub step_limit: usize,
    /// Number of step-back snapshots retained; older ones are dropped.
    pub history_limit: usize,
    /// Deepest allowed nesting of user function calls.
    pub call_depth_limit: usize,
    pub random_seed: u64,
    /// Variable names hidden from `get_variables` and call-stack views.
    pub internal_names: Vec<String>,
    /// Game whose legacy verbs are predefined for loaded programs.
    pub game: Option<GameType>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            step_limit: 100_000,
            history_limit: 1_000,
            call_depth_limit: 200,
            random_seed: 0,
            internal_names: Vec::new(),
            game: None,
        }
    }
}

impl VmConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse { source })
    }

    pub fn is_internal_name(&self, name: &str) -> bool {
        name.starts_with("__") || self.internal_names.iter().any(|internal| internal == name)
    }
}
