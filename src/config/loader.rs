//! Build a model registry from config: validate first, then turn each
//! declaration into a shared `ModelDef`.

use crate::config::resolved::Registry;
use crate::config::{validate, FullConfig};
use crate::error::ConfigError;
use crate::model::{ModelDef, RelationshipDef};
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;

/// Build the registry from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<Registry, ConfigError> {
    validate(config)?;

    let mut models = IndexMap::with_capacity(config.models.len());
    for m in &config.models {
        let mut def = ModelDef::new(m.name.clone(), m.table.clone(), m.schema.clone())?
            .read_only(m.read_only);
        for (label, rel) in &m.relationships {
            let mut r = RelationshipDef::new(rel.kind, rel.model.clone());
            if let Some(fk) = &rel.foreign_key {
                r = r.with_foreign_key(fk.clone());
            }
            def = def.relationship(label.clone(), r);
        }
        tracing::debug!(model = %m.name, table = %m.table, relationships = m.relationships.len(), "model resolved");
        models.insert(m.name.clone(), Arc::new(def));
    }

    Ok(Registry { models })
}

/// Read a JSON config file and resolve it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Registry, ConfigError> {
    resolve(&FullConfig::from_path(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelationKind;

    const CONFIG: &str = r#"{
        "models": [
            {
                "name": "author",
                "table": "authors",
                "schema": {
                    "fields": {"id": "bigint unsigned NOT NULL AUTO_INCREMENT", "name": "varchar(100)"},
                    "indexes": ["PRIMARY KEY (id)"]
                }
            },
            {
                "name": "book",
                "table": "books",
                "schema": {
                    "fields": {
                        "isbn": "varchar(20) NOT NULL",
                        "writer": "bigint unsigned",
                        "title": "varchar(255)"
                    },
                    "indexes": ["PRIMARY KEY (isbn)", "KEY (title)"]
                },
                "relationships": {
                    "author": {"type": "belongs_to", "model": "author", "foreign_key": "writer"},
                    "related": {"type": "many_to_many", "model": "book"}
                }
            },
            {
                "name": "option",
                "table": "site_options",
                "schema": {"fields": {"key": "varchar(64)"}, "indexes": ["PRIMARY KEY (key)"]},
                "read_only": true
            }
        ]
    }"#;

    #[test]
    fn resolves_models_in_declaration_order() {
        let reg = resolve(&FullConfig::from_json_str(CONFIG).unwrap()).unwrap();
        let names: Vec<_> = reg.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["author", "book", "option"]);

        let book = reg.model("book").unwrap();
        assert_eq!(book.primary, "isbn");
        let author = &book.relationships["author"];
        assert_eq!(author.kind, RelationKind::BelongsTo);
        assert_eq!(author.foreign_key.as_deref(), Some("writer"));
        assert!(book.has_join_relationships());
        assert!(reg.model("option").unwrap().read_only);
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        assert!(matches!(
            FullConfig::from_json_str("{\"models\": 3}"),
            Err(ConfigError::Load(_))
        ));
        assert!(matches!(
            load_from_path("/nonexistent/relata.json"),
            Err(ConfigError::Load(_))
        ));
    }
}
