use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ra_core::{ReferenceLanguageInfo, Result, Versification};

use crate::reference_text::ReferenceTextId;

// ---------------------------------------------------------------------------
// ReferenceTextConfig
// ---------------------------------------------------------------------------

/// Everything needed to open a reference text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTextConfig {
    pub id: ReferenceTextId,
    #[serde(default)]
    pub language: ReferenceLanguageInfo,
    #[serde(default)]
    pub versification: VersificationConfig,
    /// SQLite database holding the reference books. `None` opens an empty
    /// in-memory store.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

/// A named versification table, optionally with its `.vrs` text inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersificationConfig {
    pub name: String,
    pub table: Option<String>,
}

impl Default for VersificationConfig {
    fn default() -> Self {
        Self {
            name: "English".to_string(),
            table: None,
        }
    }
}

impl VersificationConfig {
    pub fn build(&self) -> Result<Versification> {
        match &self.table {
            Some(text) => Versification::parse(self.name.clone(), text),
            None => Ok(Versification::new(self.name.clone())),
        }
    }
}

impl ReferenceTextConfig {
    pub fn new(id: ReferenceTextId) -> Self {
        Self {
            id,
            language: ReferenceLanguageInfo::default(),
            versification: VersificationConfig::default(),
            database_path: None,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
