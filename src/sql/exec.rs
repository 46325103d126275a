//! Statement execution over an `Any` connection: JSON values in, JSON rows out.

use crate::schema::{ColumnKind, TableSchema};
use crate::sql::{QueryBuf, Row};
use serde_json::Value;
use sqlx::any::{AnyArguments, AnyQueryResult, AnyRow};
use sqlx::{Any, AnyConnection};

pub type AnyQuery<'q> = sqlx::query::Query<'q, Any, AnyArguments<'q>>;

/// Bind one JSON value. Arrays and objects are bound as their JSON text.
pub fn bind_json<'q>(query: AnyQuery<'q>, v: &Value) -> AnyQuery<'q> {
    match v {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(v.to_string()),
    }
}

fn prepare(q: &QueryBuf) -> AnyQuery<'_> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = bind_json(query, p);
    }
    query
}

pub async fn query_many(conn: &mut AnyConnection, q: &QueryBuf) -> Result<Vec<Row>, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let rows = prepare(q).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(row_to_map).collect())
}

pub async fn query_optional(conn: &mut AnyConnection, q: &QueryBuf) -> Result<Option<Row>, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let row = prepare(q).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(row_to_map))
}

pub async fn execute(conn: &mut AnyConnection, q: &QueryBuf) -> Result<AnyQueryResult, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    prepare(q).execute(&mut *conn).await
}

/// First column of each row as a string (introspection queries).
pub(crate) fn first_column_strings(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.values().next())
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect()
}

pub fn row_to_map(row: &AnyRow) -> Row {
    use sqlx::{Column, Row as _};
    let mut map = Row::new();
    for col in row.columns() {
        map.insert(col.name().to_string(), cell_to_value(row, col.ordinal()));
    }
    map
}

/// Undo projection casts the schema knows about: boolean columns come back
/// from the driver as 0/1 integers.
pub fn restore_kinds(schema: &TableSchema, row: &mut Row) {
    for (name, value) in row.iter_mut() {
        if schema.column_kind(name) != Some(ColumnKind::Bool) {
            continue;
        }
        if let Some(n) = value.as_i64() {
            *value = Value::Bool(n != 0);
        }
    }
}

fn cell_to_value(row: &AnyRow, idx: usize) -> Value {
    use sqlx::Row as _;
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v
            .map(|b| Value::String(String::from_utf8_lossy(&b).into_owned()))
            .unwrap_or(Value::Null);
    }
    Value::Null
}
