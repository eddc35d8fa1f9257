//! JSON-backed configuration overlay (`spec.md` §1, §6; `SPEC_FULL.md` §6).
//!
//! Every field is optional; an empty `{}` (or a missing file) yields exactly the
//! built-in defaults, so the crate works with zero configuration.

use crate::regs::RegisterFieldSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub backing_file: Option<BackingFileConfig>,
    #[serde(default)]
    pub registers: Vec<RegisterFieldSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackingFileConfig {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub block_size: u32,
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&text)?)
    }

    /// Apply `registers` on top of the built-in default table, by offset: an override
    /// with a matching `offset` replaces the default row outright rather than merging
    /// field-by-field, since the masks only make sense together.
    pub fn effective_register_table(&self) -> Vec<RegisterFieldSpec> {
        let mut table = crate::regs::default_table();
        for over in &self.registers {
            if let Some(existing) = table.iter_mut().find(|f| f.offset == over.offset) {
                *existing = *over;
            } else {
                table.push(*over);
            }
        }
        table
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}
