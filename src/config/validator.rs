//! Config validation: referential integrity between models and schema sanity.

use crate::config::{FullConfig, ModelConfig};
use crate::error::ConfigError;
use crate::model::RelationKind;
use crate::schema::get_primary_column;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut by_name: HashMap<&str, &ModelConfig> = HashMap::new();
    let mut tables = HashSet::new();

    for m in &config.models {
        if m.name.trim().is_empty() || m.table.trim().is_empty() {
            return Err(ConfigError::InvalidModel {
                model: m.name.clone(),
                message: "name and table must not be empty".into(),
            });
        }
        if by_name.insert(m.name.as_str(), m).is_some() {
            return Err(ConfigError::DuplicateModel(m.name.clone()));
        }
        if !tables.insert(m.table.as_str()) {
            return Err(ConfigError::InvalidModel {
                model: m.name.clone(),
                message: format!("table {} is already declared by another model", m.table),
            });
        }
        if m.schema.fields.is_empty() {
            return Err(ConfigError::InvalidModel {
                model: m.name.clone(),
                message: "schema declares no fields".into(),
            });
        }
        let primary = get_primary_column(&m.table, &m.schema)?;
        if !m.schema.has_field(&primary) {
            return Err(ConfigError::InvalidModel {
                model: m.name.clone(),
                message: format!("primary column {} is not a declared field", primary),
            });
        }
    }

    for m in &config.models {
        for (label, rel) in &m.relationships {
            let target = by_name
                .get(rel.model.as_str())
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "model",
                    id: rel.model.clone(),
                })?;
            let (holder, column) = match rel.kind {
                RelationKind::BelongsTo => (m, rel.foreign_key.clone().unwrap_or_else(|| format!("{}_id", label))),
                RelationKind::HasOne => (*target, rel.foreign_key.clone().unwrap_or_else(|| format!("{}_id", m.name))),
                RelationKind::HasMany | RelationKind::ManyToMany => continue,
            };
            if !holder.schema.has_field(&column) {
                return Err(ConfigError::InvalidModel {
                    model: m.name.clone(),
                    message: format!(
                        "relationship '{}' needs column {} on {}",
                        label, column, holder.table
                    ),
                });
            }
        }
    }

    Ok(())
}
