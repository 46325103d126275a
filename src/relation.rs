//! Associations between models.
//!
//! Has-many and many-to-many relationships of one model share a single
//! `<table>_relationships` table of `(relationship, left_id, right_id)` rows,
//! discriminated by the relationship label. Belongs-to and has-one are plain
//! foreign-key columns and need no extra table.

use crate::dialect::quoted;
use crate::error::{EntityError, RelationError};
use crate::model::{association_table_name, Entity, ModelDef, RelationKind, RelationshipDef};
use crate::query::{Query, QueryArgs};
use crate::sql::{self, exec, Filter, QueryBuf, Row};
use serde_json::Value;
use sqlx::AnyConnection;
use std::sync::Arc;

/// What `add` / `remove` found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationChange {
    Added,
    /// The row already existed (rejected by the table's primary key).
    AlreadyPresent,
    Removed,
    NotPresent,
}

/// One labelled join-table relationship from `owner` to `related`.
#[derive(Clone, Debug)]
pub struct Association {
    owner: Arc<ModelDef>,
    related: Arc<ModelDef>,
    label: String,
    table: String,
}

impl Association {
    pub fn new(
        owner: Arc<ModelDef>,
        label: &str,
        related: Arc<ModelDef>,
    ) -> Result<Self, RelationError> {
        let def = relationship(&owner, label)?;
        if !def.kind.uses_join_table() {
            return Err(RelationError::UnsupportedKind {
                label: label.to_string(),
                kind: def.kind.as_str(),
            });
        }
        if def.model != related.name {
            return Err(RelationError::ModelMismatch {
                expected: def.model.clone(),
                found: related.name.clone(),
            });
        }
        let table = association_table_name(&owner.table);
        Ok(Association {
            owner,
            related,
            label: label.to_string(),
            table,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Identities of the right-side entities related to `owner`.
    pub async fn right_ids(
        &self,
        conn: &mut AnyConnection,
        owner: &Entity,
    ) -> Result<Vec<Value>, RelationError> {
        let left = id_of(owner, &self.owner)?;
        self.column_where(conn, "right_id", "left_id", left).await
    }

    /// Right-side entities related to `owner`.
    pub async fn items_of(
        &self,
        conn: &mut AnyConnection,
        owner: &Entity,
    ) -> Result<Vec<Entity>, RelationError> {
        let ids = self.right_ids(conn, owner).await?;
        Ok(Entity::get_many(conn, &self.related, &ids).await?)
    }

    /// Left-side entities that relate to `other`.
    pub async fn owners_of(
        &self,
        conn: &mut AnyConnection,
        other: &Entity,
    ) -> Result<Vec<Entity>, RelationError> {
        let right = id_of(other, &self.related)?;
        let ids = self.column_where(conn, "left_id", "right_id", right).await?;
        Ok(Entity::get_many(conn, &self.owner, &ids).await?)
    }

    /// Relate `owner` to `other`. A duplicate is reported, not treated as an error.
    pub async fn add(
        &self,
        conn: &mut AnyConnection,
        owner: &Entity,
        other: &Entity,
    ) -> Result<AssociationChange, RelationError> {
        let (left, right) = (id_of(owner, &self.owner)?, id_of(other, &self.related)?);
        let mut row = Row::new();
        row.insert("relationship".into(), Value::String(self.label.clone()));
        row.insert("left_id".into(), left);
        row.insert("right_id".into(), right);
        match exec::execute(conn, &sql::insert(&self.table, &row)).await {
            Ok(_) => Ok(AssociationChange::Added),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::debug!(table = %self.table, label = %self.label, "association already present");
                Ok(AssociationChange::AlreadyPresent)
            }
            Err(source) => Err(RelationError::Driver {
                table: self.table.clone(),
                source,
            }),
        }
    }

    /// Unrelate `owner` and `other`; absent rows are not an error.
    pub async fn remove(
        &self,
        conn: &mut AnyConnection,
        owner: &Entity,
        other: &Entity,
    ) -> Result<AssociationChange, RelationError> {
        let (left, right) = (id_of(owner, &self.owner)?, id_of(other, &self.related)?);
        let q = delete_link(&self.table, &self.label, left, right);
        let res = exec::execute(conn, &q)
            .await
            .map_err(|source| RelationError::Driver {
                table: self.table.clone(),
                source,
            })?;
        Ok(if res.rows_affected() > 0 {
            AssociationChange::Removed
        } else {
            AssociationChange::NotPresent
        })
    }

    async fn column_where(
        &self,
        conn: &mut AnyConnection,
        select: &str,
        key: &str,
        id: Value,
    ) -> Result<Vec<Value>, RelationError> {
        let q = select_linked(&self.table, &self.label, select, key, id);
        let rows = exec::query_many(conn, &q)
            .await
            .map_err(|source| RelationError::Driver {
                table: self.table.clone(),
                source,
            })?;
        Ok(rows
            .into_iter()
            .filter_map(|mut r| r.remove(select))
            .filter(|v| !v.is_null())
            .collect())
    }
}

/// Follow a `belongs_to` or `has_one` relationship of `entity`.
pub async fn related_one(
    conn: &mut AnyConnection,
    entity: &Entity,
    label: &str,
    related: &Arc<ModelDef>,
) -> Result<Option<Entity>, RelationError> {
    let owner = entity.model();
    let def = relationship(owner, label)?;
    if def.model != related.name {
        return Err(RelationError::ModelMismatch {
            expected: def.model.clone(),
            found: related.name.clone(),
        });
    }
    match def.kind {
        RelationKind::BelongsTo => {
            let column = def.foreign_key.clone().unwrap_or_else(|| format!("{}_id", label));
            match entity.get_field(&column) {
                Some(v) if !v.is_null() => Ok(Entity::get(conn, related, v.clone()).await?),
                _ => Ok(None),
            }
        }
        RelationKind::HasOne => {
            let column = def
                .foreign_key
                .clone()
                .unwrap_or_else(|| format!("{}_id", owner.name));
            let id = entity.get_id().cloned().ok_or(RelationError::Unsaved)?;
            let q = Query::new(related.clone(), Filter::eq(column, id), QueryArgs::page(1, 1));
            Ok(q.get_results(conn).await?.get(0))
        }
        kind => Err(RelationError::UnsupportedKind {
            label: label.to_string(),
            kind: kind.as_str(),
        }),
    }
}

fn delete_link(table: &str, label: &str, left: Value, right: Value) -> QueryBuf {
    QueryBuf {
        sql: format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ? AND {} = ?",
            quoted(table),
            quoted("relationship"),
            quoted("left_id"),
            quoted("right_id")
        ),
        params: vec![Value::String(label.to_string()), left, right],
    }
}

/// `select` column of every `label` row whose `key` column equals `id`.
fn select_linked(table: &str, label: &str, select: &str, key: &str, id: Value) -> QueryBuf {
    QueryBuf {
        sql: format!(
            "SELECT {} FROM {} WHERE {} = ? AND {} = ?",
            quoted(select),
            quoted(table),
            quoted("relationship"),
            quoted(key)
        ),
        params: vec![Value::String(label.to_string()), id],
    }
}

fn relationship<'a>(model: &'a ModelDef, label: &str) -> Result<&'a RelationshipDef, RelationError> {
    model
        .relationships
        .get(label)
        .ok_or_else(|| RelationError::UnknownRelationship {
            model: model.name.clone(),
            label: label.to_string(),
        })
}

fn id_of(entity: &Entity, expected: &ModelDef) -> Result<Value, RelationError> {
    if entity.model().name != expected.name {
        return Err(RelationError::ModelMismatch {
            expected: expected.name.clone(),
            found: entity.model().name.clone(),
        });
    }
    if entity.is_deleted() {
        return Err(EntityError::AlreadyDeleted {
            table: expected.table.clone(),
        }
        .into());
    }
    if entity.is_new() {
        return Err(RelationError::Unsaved);
    }
    entity.get_id().cloned().ok_or(RelationError::Unsaved)
}
