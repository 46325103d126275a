//! Model definitions: a table, its declared schema, and its relationships.

mod entity;

pub use entity::*;

use crate::error::SchemaError;
use crate::schema::{get_primary_column, TableSchema};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The interface the schema manager and query layer consume.
pub trait Table {
    fn table_name(&self) -> &str;
    fn table_schema(&self) -> &TableSchema;

    fn primary_column(&self) -> Result<String, SchemaError> {
        get_primary_column(self.table_name(), self.table_schema())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    HasMany,
    ManyToMany,
    BelongsTo,
    HasOne,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::HasMany => "has_many",
            RelationKind::ManyToMany => "many_to_many",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::HasOne => "has_one",
        }
    }

    /// Whether rows of this kind live in the shared association table.
    pub fn uses_join_table(&self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::ManyToMany)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationshipDef {
    pub kind: RelationKind,
    /// Name of the related model.
    pub model: String,
    /// `belongs_to`: column on this table; `has_one`: column on the related table.
    pub foreign_key: Option<String>,
}

impl RelationshipDef {
    pub fn new(kind: RelationKind, model: impl Into<String>) -> Self {
        RelationshipDef {
            kind,
            model: model.into(),
            foreign_key: None,
        }
    }

    pub fn with_foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }
}

/// A validated model: table name, schema with a single-column primary key,
/// and labelled relationships.
#[derive(Clone, Debug)]
pub struct ModelDef {
    pub name: String,
    pub table: String,
    pub schema: TableSchema,
    pub primary: String,
    pub relationships: IndexMap<String, RelationshipDef>,
    /// Built-in tables owned by something else: never written or migrated.
    pub read_only: bool,
}

impl ModelDef {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        schema: TableSchema,
    ) -> Result<Self, SchemaError> {
        let table = table.into();
        let primary = get_primary_column(&table, &schema)?;
        Ok(ModelDef {
            name: name.into(),
            table,
            schema,
            primary,
            relationships: IndexMap::new(),
            read_only: false,
        })
    }

    pub fn relationship(mut self, label: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.insert(label.into(), def);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Whether any relationship needs the shared association table.
    pub fn has_join_relationships(&self) -> bool {
        self.relationships.values().any(|r| r.kind.uses_join_table())
    }
}

impl Table for ModelDef {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn table_schema(&self) -> &TableSchema {
        &self.schema
    }

    fn primary_column(&self) -> Result<String, SchemaError> {
        Ok(self.primary.clone())
    }
}

/// Name of the association table shared by a model's join relationships.
pub fn association_table_name(table: &str) -> String {
    format!("{}_relationships", table)
}

/// Schema of the shared association table.
pub fn association_schema() -> TableSchema {
    TableSchema::new()
        .field("relationship", "varchar(255) NOT NULL")
        .field("left_id", "bigint unsigned NOT NULL")
        .field("right_id", "bigint unsigned NOT NULL")
        .index("PRIMARY KEY (relationship, left_id, right_id)")
        .index("KEY (relationship, right_id)")
}
