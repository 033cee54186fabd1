//! Editor configuration.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::firmware::BlockType;

/// Paths and defaults used by front-ends.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Firmware definition file.
    pub definition_path: Option<PathBuf>,
    /// Directory holding patch files.
    pub patches_dir: Option<PathBuf>,
    /// Block selected when none is given.
    #[serde(default)]
    pub default_block: BlockType,
}

impl EditorConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EditorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
