//! Relata: schema-declared relational data layer over MySQL and SQLite.
//!
//! Models declare their table schema and relationships as data. From that the
//! crate creates and reconciles live tables, tracks entity changes, compiles
//! filter expressions into parameterized SQL, and saves batches atomically.

pub mod batch;
pub mod config;
pub mod dialect;
pub mod error;
pub mod migration;
pub mod model;
pub mod query;
pub mod relation;
pub mod sanitize;
pub mod schema;
pub mod sql;

pub use batch::{save_many, BatchReport, BatchState, SaveManyOptions};
pub use config::{load_from_path, resolve, DbSettings, FullConfig, Registry};
pub use dialect::Dialect;
pub use error::{BatchError, ConfigError, EntityError, Error, QueryError, RelationError, SchemaError};
pub use migration::{ensure_model_tables, ensure_table, SchemaChange};
pub use model::{Entity, ModelDef, RelationKind, RelationshipDef, SaveOutcome, Table};
pub use query::{Query, QueryArgs, QueryResults};
pub use relation::{Association, AssociationChange};
pub use sanitize::Sanitizers;
pub use schema::TableSchema;
pub use sql::{Direction, Filter, RelationFilter, WhereClause};
