//! Typed errors for every layer. Driver failures are carried as `sqlx::Error`
//! together with enough context (table, statement, attempted fields) for a
//! caller to render a diagnostic.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate model name: {0}")]
    DuplicateModel(String),
    #[error("model {model}: {message}")]
    InvalidModel { model: String, message: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("config load: {0}")]
    Load(String),
}

#[derive(Error, Debug)]
pub enum SchemaError {
    /// An index declaration that does not follow the index grammar.
    #[error("could not parse index: {0}")]
    Parse(String),
    #[error("table {table} declares no PRIMARY KEY index")]
    MissingPrimaryKey { table: String },
    #[error("table {table} declares {count} PRIMARY KEY indexes")]
    MultiplePrimaryKeys { table: String, count: usize },
    #[error("table {table} has a composite primary key ({columns}); entities need exactly one identity column")]
    CompositePrimaryKey { table: String, columns: String },
    #[error("could not apply schema to {table}: {source}\nstatement: {statement}")]
    Statement {
        table: String,
        statement: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("could not inspect table {table}: {source}")]
    Introspect {
        table: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("unsupported database backend: {0}")]
    UnsupportedDialect(String),
    #[error("cannot conform table {table}: {reason}")]
    Unsupported { table: String, reason: String },
    #[error("table {0} belongs to a read-only model and cannot be created or altered")]
    ReadOnlyTable(String),
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid filter expression: {0}")]
    InvalidFilterExpression(String),
    #[error("invalid comparison '{compare}' for field {field}")]
    InvalidComparison { field: String, compare: String },
    #[error("invalid relation: {0}")]
    InvalidRelation(String),
    #[error("query failed: {source}\nsql: {sql}")]
    Execution {
        sql: String,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Why a delete did not remove exactly one row.
#[derive(Debug)]
pub enum DeleteFailure {
    Driver(sqlx::Error),
    RowsAffected(u64),
    MissingIdentity,
}

impl std::fmt::Display for DeleteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteFailure::Driver(e) => write!(f, "{}", e),
            DeleteFailure::RowsAffected(n) => write!(f, "expected 1 affected row, got {}", n),
            DeleteFailure::MissingIdentity => f.write_str("entity has no identity value"),
        }
    }
}

#[derive(Error, Debug)]
pub enum EntityError {
    #[error("deleted entity in {table} cannot be saved or deleted")]
    AlreadyDeleted { table: String },
    #[error("{table} is a read-only model")]
    ReadOnly { table: String },
    #[error("could not save to {table} (fields: {fields:?}, filter: {filter:?}): {source}")]
    Save {
        table: String,
        fields: Vec<String>,
        filter: Option<(String, Value)>,
        #[source]
        source: sqlx::Error,
    },
    #[error("could not delete from {table} (filter: {filter:?}): {reason}")]
    Delete {
        table: String,
        filter: Option<(String, Value)>,
        reason: DeleteFailure,
    },
    #[error("{table} row has no identity value after insert")]
    MissingIdentity { table: String },
    #[error("deleted entities cannot be reloaded")]
    CannotReloadDeleted,
    #[error("new entities cannot be reloaded")]
    CannotReloadNew,
    #[error("no row in {table} with {column} = {id}")]
    NotFound {
        table: String,
        column: String,
        id: Value,
    },
    #[error("could not read from {table}: {source}")]
    Fetch {
        table: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("invalid field(s): {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
    InvalidFields(indexmap::IndexMap<String, String>),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Error, Debug)]
pub enum RelationError {
    #[error("model {model} has no relationship '{label}'")]
    UnknownRelationship { model: String, label: String },
    #[error("relationship '{label}' is {kind}, which has no association table")]
    UnsupportedKind { label: String, kind: &'static str },
    #[error("no model named '{0}' is registered")]
    UnknownModel(String),
    #[error("both entities must be saved before they can be related")]
    Unsaved,
    #[error("expected a {expected} entity, got {found}")]
    ModelMismatch { expected: String, found: String },
    #[error("association table {table}: {source}")]
    Driver {
        table: String,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("could not start transaction: {0}")]
    Begin(#[source] sqlx::Error),
    #[error("entity {index} in batch failed: {source}")]
    Save {
        index: usize,
        #[source]
        source: EntityError,
    },
    #[error("could not commit changes: {0}")]
    Commit(#[source] sqlx::Error),
    #[error("could not roll back dry run: {0}")]
    Rollback(#[source] sqlx::Error),
}

/// Crate-level error for callers that do not care which layer failed.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Relation(#[from] RelationError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}
