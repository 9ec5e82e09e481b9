use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codegen::TargetOptions;

/// A project config file, usually `cirgen.toml`.
///
/// ```toml
/// [target]
/// cpu = "generic"
///
/// [output]
/// emit_ir = true
/// opt_level = 2
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetOptions,
    pub output: Output,
}

/// Which artifacts to write and how.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    /// Where to write the object file, next to the input if not set.
    pub object: Option<PathBuf>,
    /// Whether to write the textual IR.
    pub emit_ir: bool,
    /// The optimization level, 0 to 3.
    pub opt_level: u8,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
