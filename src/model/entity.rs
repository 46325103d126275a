//! Entity: one row of a model's table with persisted vs. pending state.

use crate::dialect::Dialect;
use crate::error::{DeleteFailure, EntityError};
use crate::model::ModelDef;
use crate::sanitize::Sanitizers;
use crate::schema::ColumnKind;
use crate::sql::{self, exec, QueryBuf, Row};
use serde_json::Value;
use sqlx::any::AnyQueryResult;
use sqlx::AnyConnection;
use std::sync::Arc;

/// What a call to [`Entity::save`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
    /// Nothing pending; no statement was issued.
    Unchanged,
    /// The statement ran without error but matched no row. Pending changes are kept.
    NoRowsAffected,
}

impl SaveOutcome {
    /// True when a row was written.
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Inserted | SaveOutcome::Updated)
    }
}

/// In-memory state of an entity, used to undo a rolled-back batch.
#[derive(Clone, Debug)]
pub(crate) struct EntitySnapshot {
    persisted: Row,
    pending: Row,
    deleted: bool,
}

#[derive(Clone, Debug)]
pub struct Entity {
    model: Arc<ModelDef>,
    persisted: Row,
    pending: Row,
    deleted: bool,
}

impl Entity {
    /// A new, unsaved entity.
    pub fn new(model: Arc<ModelDef>) -> Self {
        Entity {
            model,
            persisted: Row::new(),
            pending: Row::new(),
            deleted: false,
        }
    }

    /// Wrap a row read from the model's table.
    pub fn from_row(model: Arc<ModelDef>, row: Row) -> Self {
        Entity {
            model,
            persisted: row,
            pending: Row::new(),
            deleted: false,
        }
    }

    /// Load one entity by identity. A missing row is `Ok(None)`.
    pub async fn get(
        conn: &mut AnyConnection,
        model: &Arc<ModelDef>,
        id: impl Into<Value>,
    ) -> Result<Option<Entity>, EntityError> {
        let row = fetch_row(conn, model, &id.into()).await?;
        Ok(row.map(|r| Entity::from_row(model.clone(), r)))
    }

    /// Load every entity whose identity is in `ids`, in table order.
    pub async fn get_many(
        conn: &mut AnyConnection,
        model: &Arc<ModelDef>,
        ids: &[Value],
    ) -> Result<Vec<Entity>, EntityError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let dialect = Dialect::of(conn)?;
        let q = sql::select_by_column_in(&model.table, &model.schema, &model.primary, dialect, ids);
        let rows = exec::query_many(conn, &q)
            .await
            .map_err(|source| EntityError::Fetch {
                table: model.table.clone(),
                source,
            })?;
        Ok(rows
            .into_iter()
            .map(|mut r| {
                exec::restore_kinds(&model.schema, &mut r);
                Entity::from_row(model.clone(), r)
            })
            .collect())
    }

    pub fn model(&self) -> &Arc<ModelDef> {
        &self.model
    }

    pub fn is_new(&self) -> bool {
        self.persisted.is_empty()
    }

    pub fn is_modified(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Identity value, if the entity has one.
    pub fn get_id(&self) -> Option<&Value> {
        self.get_field(&self.model.primary).filter(|v| !v.is_null())
    }

    /// Pending value first, then persisted. Deleted entities expose nothing.
    pub fn get_field(&self, key: &str) -> Option<&Value> {
        if self.deleted {
            return None;
        }
        self.pending.get(key).or_else(|| self.persisted.get(key))
    }

    /// Stage a write; persisted state is untouched until save.
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), EntityError> {
        if self.deleted {
            return Err(EntityError::AlreadyDeleted {
                table: self.model.table.clone(),
            });
        }
        self.pending.insert(key.into(), value.into());
        Ok(())
    }

    /// Stage sanitised values for every declared field in `changes`. Unknown
    /// keys are skipped; if any field is invalid nothing is staged.
    pub fn assign(&mut self, changes: &Row, sanitizers: &Sanitizers) -> Result<(), EntityError> {
        if self.deleted {
            return Err(EntityError::AlreadyDeleted {
                table: self.model.table.clone(),
            });
        }
        let clean = sanitizers
            .sanitize_changes(&self.model.schema, changes)
            .map_err(EntityError::InvalidFields)?;
        self.pending.extend(clean);
        Ok(())
    }

    /// Persisted row merged with pending changes.
    pub fn fields(&self) -> Row {
        let mut out = self.persisted.clone();
        for (k, v) in &self.pending {
            out.insert(k.clone(), v.clone());
        }
        out
    }

    /// Uncommitted writes.
    pub fn pending(&self) -> &Row {
        &self.pending
    }

    /// Write pending changes: INSERT when new, UPDATE by identity otherwise.
    pub async fn save(&mut self, conn: &mut AnyConnection) -> Result<SaveOutcome, EntityError> {
        self.ensure_writable()?;
        if self.pending.is_empty() {
            return Ok(SaveOutcome::Unchanged);
        }
        if self.is_new() {
            self.insert(conn).await
        } else {
            self.update(conn).await
        }
    }

    async fn insert(&mut self, conn: &mut AnyConnection) -> Result<SaveOutcome, EntityError> {
        let table = self.model.table.clone();
        let q = sql::insert(&table, &self.pending);
        let res = exec::execute(conn, &q)
            .await
            .map_err(|source| EntityError::Save {
                table: table.clone(),
                fields: self.pending.keys().cloned().collect(),
                filter: None,
                source,
            })?;
        if res.rows_affected() == 0 {
            return Ok(SaveOutcome::NoRowsAffected);
        }

        let primary = self.model.primary.clone();
        let supplied = self.pending.get(&primary).filter(|v| !v.is_null()).cloned();

        // The row exists now; local state must say so even if the identity
        // lookup or the re-read fails, so a retry cannot insert it twice.
        self.persisted = std::mem::take(&mut self.pending);

        let id = match supplied {
            Some(id) => id,
            None => inserted_id(conn, &res, &self.model)
                .await?
                .ok_or_else(|| EntityError::MissingIdentity {
                    table: table.clone(),
                })?,
        };
        self.persisted.insert(primary.clone(), id.clone());

        let row = fetch_row(conn, &self.model, &id)
            .await?
            .ok_or_else(|| EntityError::NotFound {
                table,
                column: primary,
                id,
            })?;
        self.persisted = row;
        Ok(SaveOutcome::Inserted)
    }

    async fn update(&mut self, conn: &mut AnyConnection) -> Result<SaveOutcome, EntityError> {
        let primary = self.model.primary.clone();
        let id = self
            .persisted
            .get(&primary)
            .cloned()
            .filter(|v| !v.is_null())
            .ok_or_else(|| EntityError::MissingIdentity {
                table: self.model.table.clone(),
            })?;
        let q = sql::update(&self.model.table, &primary, &id, &self.pending);
        let res = exec::execute(conn, &q)
            .await
            .map_err(|source| EntityError::Save {
                table: self.model.table.clone(),
                fields: self.pending.keys().cloned().collect(),
                filter: Some((primary.clone(), id.clone())),
                source,
            })?;
        if res.rows_affected() == 0 {
            return Ok(SaveOutcome::NoRowsAffected);
        }
        let pending = std::mem::take(&mut self.pending);
        self.persisted.extend(pending);
        Ok(SaveOutcome::Updated)
    }

    /// Delete by identity. Exactly one row must go.
    pub async fn delete(&mut self, conn: &mut AnyConnection) -> Result<(), EntityError> {
        self.ensure_writable()?;
        let table = self.model.table.clone();
        let primary = self.model.primary.clone();
        let Some(id) = self.persisted.get(&primary).cloned().filter(|v| !v.is_null()) else {
            return Err(EntityError::Delete {
                table,
                filter: None,
                reason: DeleteFailure::MissingIdentity,
            });
        };
        let q = sql::delete(&table, &primary, &id);
        let filter = Some((primary, id));
        match exec::execute(conn, &q).await {
            Ok(res) if res.rows_affected() == 1 => {
                self.deleted = true;
                self.pending.clear();
                Ok(())
            }
            Ok(res) => Err(EntityError::Delete {
                table,
                filter,
                reason: DeleteFailure::RowsAffected(res.rows_affected()),
            }),
            Err(e) => Err(EntityError::Delete {
                table,
                filter,
                reason: DeleteFailure::Driver(e),
            }),
        }
    }

    /// Re-read the persisted row and drop pending changes.
    pub async fn reload(&mut self, conn: &mut AnyConnection) -> Result<(), EntityError> {
        if self.deleted {
            return Err(EntityError::CannotReloadDeleted);
        }
        if self.is_new() {
            return Err(EntityError::CannotReloadNew);
        }
        let primary = &self.model.primary;
        let id = self.persisted.get(primary).cloned().unwrap_or(Value::Null);
        let row = fetch_row(conn, &self.model, &id)
            .await?
            .ok_or_else(|| EntityError::NotFound {
                table: self.model.table.clone(),
                column: primary.clone(),
                id,
            })?;
        self.persisted = row;
        self.pending.clear();
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), EntityError> {
        if self.deleted {
            return Err(EntityError::AlreadyDeleted {
                table: self.model.table.clone(),
            });
        }
        if self.model.read_only {
            return Err(EntityError::ReadOnly {
                table: self.model.table.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            persisted: self.persisted.clone(),
            pending: self.pending.clone(),
            deleted: self.deleted,
        }
    }

    pub(crate) fn restore(&mut self, snapshot: EntitySnapshot) {
        self.persisted = snapshot.persisted;
        self.pending = snapshot.pending;
        self.deleted = snapshot.deleted;
    }
}

async fn fetch_row(
    conn: &mut AnyConnection,
    model: &ModelDef,
    id: &Value,
) -> Result<Option<Row>, EntityError> {
    let dialect = Dialect::of(conn)?;
    let q = sql::select_by_id(&model.table, &model.schema, &model.primary, dialect, id);
    let mut row = exec::query_optional(conn, &q)
        .await
        .map_err(|source| EntityError::Fetch {
            table: model.table.clone(),
            source,
        })?;
    if let Some(row) = row.as_mut() {
        exec::restore_kinds(&model.schema, row);
    }
    Ok(row)
}

/// Identity the database assigned to the row just inserted on `conn`.
/// Only integer primary columns are auto-assigned.
async fn inserted_id(
    conn: &mut AnyConnection,
    res: &AnyQueryResult,
    model: &ModelDef,
) -> Result<Option<Value>, EntityError> {
    if model.schema.column_kind(&model.primary) != Some(ColumnKind::Integer) {
        return Ok(None);
    }
    if let Some(id) = res.last_insert_id().filter(|id| *id != 0) {
        return Ok(Some(Value::from(id)));
    }
    let Some(sql) = Dialect::of(conn)?.last_insert_id_sql() else {
        return Ok(None);
    };
    let q = QueryBuf {
        sql: sql.to_string(),
        params: Vec::new(),
    };
    let row = exec::query_optional(conn, &q)
        .await
        .map_err(|source| EntityError::Fetch {
            table: model.table.clone(),
            source,
        })?;
    Ok(row
        .and_then(|r| r.values().next().and_then(Value::as_i64))
        .filter(|id| *id != 0)
        .map(Value::from))
}
