//! Schema reconciliation: create declared tables, or add whatever columns and
//! indexes a live table is missing. Existing structure is never dropped,
//! renamed or reordered.

use crate::dialect::{is_auto_increment, quoted, Dialect};
use crate::error::SchemaError;
use crate::model::{association_schema, association_table_name, ModelDef};
use crate::schema::{ColumnKind, IndexKind, IndexSpec, TableSchema, PRIMARY_INDEX_NAME};
use crate::sql::{exec, QueryBuf};
use serde_json::Value;
use sqlx::AnyConnection;
use std::collections::HashSet;

/// What reconciling one table did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaChange {
    Created,
    /// Names of the columns and indexes that were added.
    Altered {
        columns: Vec<String>,
        indexes: Vec<String>,
    },
    Unchanged,
}

impl SchemaChange {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, SchemaChange::Unchanged)
    }
}

/// Create `table` if it does not exist, otherwise conform it to `schema`.
pub async fn ensure_table(
    conn: &mut AnyConnection,
    table: &str,
    schema: &TableSchema,
) -> Result<SchemaChange, SchemaError> {
    let dialect = Dialect::of(conn)?;
    if table_exists(conn, dialect, table).await? {
        conform_table(conn, table, schema).await
    } else {
        create_table(conn, table, schema).await?;
        Ok(SchemaChange::Created)
    }
}

/// Ensure a model's table and, when it declares join relationships, its
/// shared association table. Read-only models are refused.
pub async fn ensure_model_tables(
    conn: &mut AnyConnection,
    model: &ModelDef,
) -> Result<Vec<(String, SchemaChange)>, SchemaError> {
    if model.read_only {
        return Err(SchemaError::ReadOnlyTable(model.table.clone()));
    }
    let mut changes = vec![(
        model.table.clone(),
        ensure_table(conn, &model.table, &model.schema).await?,
    )];
    if model.has_join_relationships() {
        let assoc = association_table_name(&model.table);
        let change = ensure_table(conn, &assoc, &association_schema()).await?;
        changes.push((assoc, change));
    }
    Ok(changes)
}

pub async fn create_table(
    conn: &mut AnyConnection,
    table: &str,
    schema: &TableSchema,
) -> Result<(), SchemaError> {
    let dialect = Dialect::of(conn)?;
    for statement in create_statements(dialect, table, schema)? {
        run_statement(conn, table, statement).await?;
    }
    tracing::info!(table = %table, "created table");
    Ok(())
}

/// Add the declared columns and indexes the live table lacks.
pub async fn conform_table(
    conn: &mut AnyConnection,
    table: &str,
    schema: &TableSchema,
) -> Result<SchemaChange, SchemaError> {
    let dialect = Dialect::of(conn)?;
    let live_columns: HashSet<String> = live_columns(conn, dialect, table)
        .await?
        .into_iter()
        .map(|c| c.to_lowercase())
        .collect();
    let live_indexes: HashSet<String> = live_indexes(conn, dialect, table)
        .await?
        .into_iter()
        .map(|i| i.to_lowercase())
        .collect();

    let missing_columns: Vec<(&String, &String)> = schema
        .fields
        .iter()
        .filter(|(name, _)| !live_columns.contains(&name.to_lowercase()))
        .collect();
    let missing_indexes: Vec<IndexSpec> = schema
        .parsed_indexes()?
        .into_iter()
        .filter(|idx| !live_indexes.contains(&idx.physical_name().to_lowercase()))
        .collect();

    if missing_columns.is_empty() && missing_indexes.is_empty() {
        tracing::debug!(table = %table, "table matches schema");
        return Ok(SchemaChange::Unchanged);
    }

    for statement in alter_statements(dialect, table, &missing_columns, &missing_indexes)? {
        run_statement(conn, table, statement).await?;
    }
    let columns: Vec<String> = missing_columns.iter().map(|(n, _)| (*n).clone()).collect();
    let indexes: Vec<String> = missing_indexes.iter().map(IndexSpec::physical_name).collect();
    tracing::info!(table = %table, columns = ?columns, indexes = ?indexes, "altered table");
    Ok(SchemaChange::Altered { columns, indexes })
}

async fn run_statement(
    conn: &mut AnyConnection,
    table: &str,
    statement: String,
) -> Result<(), SchemaError> {
    let q = QueryBuf {
        sql: statement,
        params: Vec::new(),
    };
    match exec::execute(conn, &q).await {
        Ok(_) => Ok(()),
        Err(source) => Err(SchemaError::Statement {
            table: table.to_string(),
            statement: q.sql,
            source,
        }),
    }
}

async fn introspect(
    conn: &mut AnyConnection,
    table: &str,
    sql: &str,
) -> Result<Vec<crate::sql::Row>, SchemaError> {
    let q = QueryBuf {
        sql: sql.to_string(),
        params: vec![Value::String(table.to_string())],
    };
    exec::query_many(conn, &q)
        .await
        .map_err(|source| SchemaError::Introspect {
            table: table.to_string(),
            source,
        })
}

pub async fn table_exists(
    conn: &mut AnyConnection,
    dialect: Dialect,
    table: &str,
) -> Result<bool, SchemaError> {
    Ok(!introspect(conn, table, dialect.table_exists_sql()).await?.is_empty())
}

pub async fn live_columns(
    conn: &mut AnyConnection,
    dialect: Dialect,
    table: &str,
) -> Result<Vec<String>, SchemaError> {
    let rows = introspect(conn, table, dialect.columns_sql()).await?;
    Ok(exec::first_column_strings(&rows))
}

/// Live index names, as the declared-index parser would name them: the
/// primary key is always `PRIMARY`.
pub async fn live_indexes(
    conn: &mut AnyConnection,
    dialect: Dialect,
    table: &str,
) -> Result<Vec<String>, SchemaError> {
    let rows = introspect(conn, table, dialect.indexes_sql()).await?;
    let mut names = Vec::with_capacity(rows.len());
    match dialect {
        Dialect::MySql => names.extend(exec::first_column_strings(&rows)),
        Dialect::Sqlite => {
            let prefix = sqlite_index_prefix(table);
            for row in &rows {
                let name = row.get("name").and_then(Value::as_str).unwrap_or_default();
                let origin = row.get("origin").and_then(Value::as_str).unwrap_or_default();
                if origin == "pk" {
                    names.push(PRIMARY_INDEX_NAME.to_string());
                } else if let Some(stripped) = name.strip_prefix(&prefix) {
                    names.push(stripped.to_string());
                } else {
                    names.push(name.to_string());
                }
            }
        }
    }
    if let Some(sql) = dialect.primary_columns_sql() {
        let has_primary = !introspect(conn, table, sql).await?.is_empty();
        if has_primary && !names.iter().any(|n| n == PRIMARY_INDEX_NAME) {
            names.push(PRIMARY_INDEX_NAME.to_string());
        }
    }
    Ok(names)
}

/// SQLite index names are database-wide, so they carry the table name.
fn sqlite_index_prefix(table: &str) -> String {
    format!("{}__", table)
}

fn sqlite_index_name(table: &str, idx: &IndexSpec) -> String {
    format!("{}{}", sqlite_index_prefix(table), idx.physical_name())
}

fn quoted_columns(idx: &IndexSpec) -> String {
    idx.column_names()
        .iter()
        .map(|c| quoted(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn mysql_index_clause(idx: &IndexSpec) -> String {
    match idx.kind {
        IndexKind::Primary => format!("PRIMARY KEY ({})", idx.raw_columns),
        kind => format!(
            "{} {} ({})",
            kind.as_sql(),
            quoted(&idx.physical_name()),
            idx.raw_columns
        ),
    }
}

fn sqlite_create_index(table: &str, idx: &IndexSpec) -> String {
    let unique = match idx.kind {
        IndexKind::Unique => "UNIQUE ",
        IndexKind::Fulltext | IndexKind::Spatial => {
            tracing::warn!(
                table = %table,
                index = %idx.name,
                kind = idx.kind.as_sql(),
                "index kind not supported by SQLite; creating a plain index"
            );
            ""
        }
        _ => "",
    };
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        quoted(&sqlite_index_name(table, idx)),
        quoted(table),
        quoted_columns(idx)
    )
}

/// Integer single-column primary key on SQLite: declared inline as a rowid alias.
fn sqlite_rowid_column<'a>(schema: &'a TableSchema, indexes: &[IndexSpec]) -> Option<&'a str> {
    let primary = indexes.iter().find(|i| i.kind == IndexKind::Primary)?;
    let [column] = primary.column_names().try_into().ok()?;
    let (name, spec) = schema.fields.get_key_value(column.as_str())?;
    (ColumnKind::of(spec) == ColumnKind::Integer).then_some(name.as_str())
}

/// Statements creating `table` from its declaration.
pub fn create_statements(
    dialect: Dialect,
    table: &str,
    schema: &TableSchema,
) -> Result<Vec<String>, SchemaError> {
    let indexes = schema.parsed_indexes()?;
    let mut defs: Vec<String> = Vec::new();
    let mut after: Vec<String> = Vec::new();

    match dialect {
        Dialect::MySql => {
            for (name, spec) in &schema.fields {
                defs.push(format!("{} {}", quoted(name), spec.trim()));
            }
            defs.extend(indexes.iter().map(mysql_index_clause));
        }
        Dialect::Sqlite => {
            let rowid = sqlite_rowid_column(schema, &indexes);
            for (name, spec) in &schema.fields {
                if Some(name.as_str()) == rowid {
                    let auto = if is_auto_increment(spec) { " AUTOINCREMENT" } else { "" };
                    defs.push(format!("{} INTEGER PRIMARY KEY{}", quoted(name), auto));
                } else {
                    defs.push(format!("{} {}", quoted(name), dialect.column_definition(spec)));
                }
            }
            for idx in &indexes {
                match idx.kind {
                    IndexKind::Primary if rowid.is_some() => {}
                    IndexKind::Primary => defs.push(format!("PRIMARY KEY ({})", quoted_columns(idx))),
                    _ => after.push(sqlite_create_index(table, idx)),
                }
            }
        }
    }

    let mut statements = vec![format!(
        "CREATE TABLE {} (\n  {}\n)",
        quoted(table),
        defs.join(",\n  ")
    )];
    statements.extend(after);
    Ok(statements)
}

/// Statements adding the given columns and indexes to an existing table.
pub fn alter_statements(
    dialect: Dialect,
    table: &str,
    columns: &[(&String, &String)],
    indexes: &[IndexSpec],
) -> Result<Vec<String>, SchemaError> {
    match dialect {
        Dialect::MySql => {
            let mut clauses: Vec<String> = columns
                .iter()
                .map(|(name, spec)| format!("ADD COLUMN {} {}", quoted(name), spec.trim()))
                .collect();
            clauses.extend(indexes.iter().map(|i| format!("ADD {}", mysql_index_clause(i))));
            Ok(vec![format!("ALTER TABLE {} {}", quoted(table), clauses.join(", "))])
        }
        Dialect::Sqlite => {
            if indexes.iter().any(|i| i.kind == IndexKind::Primary) {
                return Err(SchemaError::Unsupported {
                    table: table.to_string(),
                    reason: "SQLite cannot add a primary key to an existing table".into(),
                });
            }
            let mut out: Vec<String> = columns
                .iter()
                .map(|(name, spec)| {
                    format!(
                        "ALTER TABLE {} ADD COLUMN {} {}",
                        quoted(table),
                        quoted(name),
                        dialect.column_definition(spec)
                    )
                })
                .collect();
            out.extend(indexes.iter().map(|i| sqlite_create_index(table, i)));
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posts() -> TableSchema {
        TableSchema::new()
            .field("id", "bigint unsigned NOT NULL AUTO_INCREMENT")
            .field("slug", "varchar(200) NOT NULL")
            .field("title", "text")
            .index("PRIMARY KEY (id)")
            .index("UNIQUE KEY slug (slug(191))")
            .index("KEY (title(20), id)")
    }

    #[test]
    fn mysql_create_is_one_statement_with_named_indexes() {
        let s = create_statements(Dialect::MySql, "posts", &posts()).unwrap();
        assert_eq!(
            s,
            vec![concat!(
                "CREATE TABLE `posts` (\n",
                "  `id` bigint unsigned NOT NULL AUTO_INCREMENT,\n",
                "  `slug` varchar(200) NOT NULL,\n",
                "  `title` text,\n",
                "  PRIMARY KEY (id),\n",
                "  UNIQUE KEY `slug` (slug(191)),\n",
                "  KEY `title_20_id` (title(20), id)\n",
                ")"
            )]
        );
    }

    #[test]
    fn sqlite_create_uses_rowid_and_separate_indexes() {
        let s = create_statements(Dialect::Sqlite, "posts", &posts()).unwrap();
        assert_eq!(s.len(), 3);
        assert!(s[0].contains("`id` INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(!s[0].contains("AUTO_INCREMENT"));
        assert_eq!(s[1], "CREATE UNIQUE INDEX `posts__slug` ON `posts` (`slug`)");
        assert_eq!(s[2], "CREATE INDEX `posts__title_20_id` ON `posts` (`title`, `id`)");
    }

    #[test]
    fn sqlite_composite_primary_key_is_a_table_constraint() {
        let s = create_statements(Dialect::Sqlite, "posts_relationships", &association_schema()).unwrap();
        assert!(s[0].contains("PRIMARY KEY (`relationship`, `left_id`, `right_id`)"));
        assert_eq!(
            s[1],
            "CREATE INDEX `posts_relationships__relationship_right_id` ON `posts_relationships` (`relationship`, `right_id`)"
        );
    }

    #[test]
    fn alter_adds_only_what_is_given() {
        let name = "summary".to_string();
        let spec = "text".to_string();
        let idx = crate::schema::parse_index("KEY (summary(50))").unwrap();
        let my = alter_statements(Dialect::MySql, "posts", &[(&name, &spec)], &[idx.clone()]).unwrap();
        assert_eq!(
            my,
            vec!["ALTER TABLE `posts` ADD COLUMN `summary` text, ADD KEY `summary_50` (summary(50))"]
        );
        let lite = alter_statements(Dialect::Sqlite, "posts", &[(&name, &spec)], &[idx]).unwrap();
        assert_eq!(
            lite,
            vec![
                "ALTER TABLE `posts` ADD COLUMN `summary` text".to_string(),
                "CREATE INDEX `posts__summary_50` ON `posts` (`summary`)".to_string(),
            ]
        );
    }

    #[test]
    fn sqlite_refuses_to_add_primary_key() {
        let idx = crate::schema::parse_index("PRIMARY KEY (id)").unwrap();
        assert!(matches!(
            alter_statements(Dialect::Sqlite, "posts", &[], &[idx]),
            Err(SchemaError::Unsupported { .. })
        ));
    }
}
