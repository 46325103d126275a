//! The resolved model registry used at runtime.

use crate::error::{ConfigError, RelationError, SchemaError};
use crate::migration::{ensure_model_tables, SchemaChange};
use crate::model::{Entity, ModelDef};
use crate::relation::{related_one, Association};
use indexmap::IndexMap;
use sqlx::AnyConnection;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct Registry {
    pub models: IndexMap<String, Arc<ModelDef>>,
}

impl Registry {
    pub fn get(&self, name: &str) -> Option<&Arc<ModelDef>> {
        self.models.get(name)
    }

    pub fn model(&self, name: &str) -> Result<Arc<ModelDef>, ConfigError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "model",
                id: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModelDef>> {
        self.models.values()
    }

    /// Join-table association `label` of model `owner`, with the related model looked up by name.
    pub fn association(&self, owner: &str, label: &str) -> Result<Association, RelationError> {
        let owner = self
            .get(owner)
            .ok_or_else(|| RelationError::UnknownModel(owner.to_string()))?;
        let target = owner
            .relationships
            .get(label)
            .ok_or_else(|| RelationError::UnknownRelationship {
                model: owner.name.clone(),
                label: label.to_string(),
            })?;
        let related = self
            .get(&target.model)
            .ok_or_else(|| RelationError::UnknownModel(target.model.clone()))?;
        Association::new(owner.clone(), label, related.clone())
    }

    /// Follow a `belongs_to` / `has_one` relationship of `entity`.
    pub async fn related_one(
        &self,
        conn: &mut AnyConnection,
        entity: &Entity,
        label: &str,
    ) -> Result<Option<Entity>, RelationError> {
        let owner = entity.model();
        let target = owner
            .relationships
            .get(label)
            .ok_or_else(|| RelationError::UnknownRelationship {
                model: owner.name.clone(),
                label: label.to_string(),
            })?;
        let related = self
            .get(&target.model)
            .ok_or_else(|| RelationError::UnknownModel(target.model.clone()))?;
        related_one(conn, entity, label, related).await
    }

    /// Create or conform every writable model's tables. Read-only models are skipped.
    pub async fn ensure_tables(
        &self,
        conn: &mut AnyConnection,
    ) -> Result<Vec<(String, SchemaChange)>, SchemaError> {
        let mut changes = Vec::new();
        for model in self.iter() {
            if model.read_only {
                tracing::info!(model = %model.name, table = %model.table, "skipping read-only table");
                continue;
            }
            changes.extend(ensure_model_tables(conn, model).await?);
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RelationKind, RelationshipDef};
    use crate::schema::TableSchema;

    fn registry() -> Registry {
        let schema = || TableSchema::new().field("id", "int").index("PRIMARY KEY (id)");
        let tag = ModelDef::new("tag", "tags", schema()).unwrap();
        let post = ModelDef::new("post", "posts", schema())
            .unwrap()
            .relationship("tags", RelationshipDef::new(RelationKind::HasMany, "tag"))
            .relationship("ghost", RelationshipDef::new(RelationKind::HasMany, "missing"));
        let mut models = IndexMap::new();
        models.insert("post".to_string(), Arc::new(post));
        models.insert("tag".to_string(), Arc::new(tag));
        Registry { models }
    }

    #[test]
    fn looks_up_associations_by_name() {
        let reg = registry();
        assert_eq!(reg.association("post", "tags").unwrap().table(), "posts_relationships");
        assert!(matches!(reg.association("nope", "tags"), Err(RelationError::UnknownModel(_))));
        assert!(matches!(
            reg.association("post", "ghost"),
            Err(RelationError::UnknownModel(m)) if m == "missing"
        ));
        assert!(matches!(
            reg.association("tag", "tags"),
            Err(RelationError::UnknownRelationship { .. })
        ));
        assert!(matches!(
            reg.model("nope"),
            Err(ConfigError::MissingReference { kind: "model", .. })
        ));
    }
}
