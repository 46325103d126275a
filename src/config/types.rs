//! Raw config types matching the JSON model declaration format.

use crate::error::ConfigError;
use crate::model::RelationKind;
use crate::schema::TableSchema;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipConfig {
    #[serde(rename = "type")]
    pub kind: RelationKind,
    /// Name of the related model.
    pub model: String,
    /// Foreign-key column for `belongs_to` (on this table) and `has_one` (on the related table).
    #[serde(default)]
    pub foreign_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub table: String,
    pub schema: TableSchema,
    #[serde(default)]
    pub relationships: IndexMap<String, RelationshipConfig>,
    /// Tables owned by another system: readable, never written or migrated.
    #[serde(default)]
    pub read_only: bool,
}

/// All model declarations in one struct for in-memory loading.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl FullConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }
}
