//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for declared tables.

use crate::dialect::{qualified, quoted, Dialect};
use crate::schema::TableSchema;
use crate::sql::{Fragment, Row};
use serde_json::Value;

/// Column carrying the window count of a paged select; stripped from rows.
pub const FOUND_ROWS_COLUMN: &str = "__found_rows";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) {
        self.params.push(v);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Everything a paged select needs besides the table itself.
#[derive(Clone, Debug)]
pub struct PageSpec<'a> {
    pub joins: &'a [String],
    pub filter: &'a Fragment,
    /// Collapse join fan-out to one row per entity.
    pub group_by: Option<&'a str>,
    pub order_by: &'a str,
    pub direction: Direction,
    pub offset: u64,
    pub limit: u64,
}

/// SELECT list: every declared column, cast where the driver needs it.
pub fn select_column_list(table: &str, schema: &TableSchema, dialect: Dialect) -> String {
    schema
        .fields
        .iter()
        .map(|(name, spec)| {
            dialect.readable_column(table, name, crate::schema::ColumnKind::of(spec))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_sql(filter: &Fragment) -> String {
    if filter.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", filter.sql)
    }
}

fn join_sql(joins: &[String]) -> String {
    joins.iter().map(|j| format!(" {}", j)).collect()
}

/// SELECT one row by primary key.
pub fn select_by_id(
    table: &str,
    schema: &TableSchema,
    primary: &str,
    dialect: Dialect,
    id: &Value,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = ? LIMIT 1",
        select_column_list(table, schema, dialect),
        quoted(table),
        qualified(table, primary)
    );
    q.push_param(id.clone());
    q
}

/// SELECT rows where column IN (values). Used for bulk-loading related rows.
pub fn select_by_column_in(
    table: &str,
    schema: &TableSchema,
    column: &str,
    dialect: Dialect,
    values: &[Value],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let placeholders = vec!["?"; values.len()].join(", ");
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({})",
        select_column_list(table, schema, dialect),
        quoted(table),
        qualified(table, column),
        placeholders
    );
    q.params.extend(values.iter().cloned());
    q
}

/// Paged SELECT with the total match count computed in the same statement.
pub fn select_page(
    table: &str,
    schema: &TableSchema,
    dialect: Dialect,
    page: &PageSpec<'_>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let group = page
        .group_by
        .map(|c| format!(" GROUP BY {}", qualified(table, c)))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT COUNT(*) OVER () AS {}, {} FROM {}{}{}{} ORDER BY {} {} LIMIT {}, {}",
        quoted(FOUND_ROWS_COLUMN),
        select_column_list(table, schema, dialect),
        quoted(table),
        join_sql(page.joins),
        where_sql(page.filter),
        group,
        qualified(table, page.order_by),
        page.direction.as_sql(),
        page.offset,
        page.limit
    );
    q.params.extend(page.filter.params.iter().cloned());
    q
}

/// COUNT over the same FROM/WHERE as a paged select.
pub fn count_matching(
    table: &str,
    joins: &[String],
    filter: &Fragment,
    distinct_on: Option<&str>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let counted = match distinct_on {
        Some(c) => format!("COUNT(DISTINCT {})", qualified(table, c)),
        None => "COUNT(*)".to_string(),
    };
    q.sql = format!(
        "SELECT {} AS {} FROM {}{}{}",
        counted,
        quoted(FOUND_ROWS_COLUMN),
        quoted(table),
        join_sql(joins),
        where_sql(filter)
    );
    q.params.extend(filter.params.iter().cloned());
    q
}

/// Split the count marker off a page of rows. Returns the total when any row carried it.
pub fn take_found_rows(rows: &mut [Row]) -> Option<u64> {
    let mut total = None;
    for row in rows.iter_mut() {
        if let Some(v) = row.shift_remove(FOUND_ROWS_COLUMN) {
            total = total.or_else(|| count_of(&v));
        }
    }
    total
}

pub fn count_of(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// INSERT with exactly the given columns.
pub fn insert(table: &str, fields: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols: Vec<String> = fields.keys().map(|k| quoted(k)).collect();
    let placeholders = vec!["?"; fields.len()].join(", ");
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quoted(table),
        cols.join(", "),
        placeholders
    );
    q.params.extend(fields.values().cloned());
    q
}

/// UPDATE the given columns of one row, keyed by primary column.
pub fn update(table: &str, primary: &str, id: &Value, fields: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let sets: Vec<String> = fields.keys().map(|k| format!("{} = ?", quoted(k))).collect();
    q.params.extend(fields.values().cloned());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quoted(table),
        sets.join(", "),
        quoted(primary)
    );
    q.push_param(id.clone());
    q
}

/// DELETE one row by primary column.
pub fn delete(table: &str, primary: &str, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("DELETE FROM {} WHERE {} = ?", quoted(table), quoted(primary));
    q.push_param(id.clone());
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> TableSchema {
        TableSchema::new()
            .field("id", "bigint unsigned NOT NULL AUTO_INCREMENT")
            .field("title", "varchar(255)")
            .field("published", "datetime")
            .index("PRIMARY KEY (id)")
    }

    #[test]
    fn select_by_id_casts_temporal_columns() {
        let q = select_by_id("posts", &schema(), "id", Dialect::Sqlite, &json!(3));
        assert_eq!(
            q.sql,
            "SELECT `posts`.`id`, `posts`.`title`, CAST(`posts`.`published` AS TEXT) AS `published` FROM `posts` WHERE `posts`.`id` = ? LIMIT 1"
        );
        assert_eq!(q.params, vec![json!(3)]);
    }

    #[test]
    fn paged_select_carries_count_marker_and_limit() {
        let filter = Fragment::new("`posts`.`title` = ?", vec![json!("x")]);
        let page = PageSpec {
            joins: &[],
            filter: &filter,
            group_by: None,
            order_by: "id",
            direction: Direction::Desc,
            offset: 20,
            limit: 10,
        };
        let q = select_page("posts", &schema(), Dialect::MySql, &page);
        assert!(q.sql.starts_with("SELECT COUNT(*) OVER () AS `__found_rows`, `posts`.`id`"));
        assert!(q.sql.ends_with(
            "FROM `posts` WHERE `posts`.`title` = ? ORDER BY `posts`.`id` DESC LIMIT 20, 10"
        ));
        assert_eq!(q.params, vec![json!("x")]);
    }

    #[test]
    fn count_marker_is_stripped() {
        let mut rows = vec![Row::new(), Row::new()];
        for (i, r) in rows.iter_mut().enumerate() {
            r.insert(FOUND_ROWS_COLUMN.into(), json!(25));
            r.insert("id".into(), json!(i));
        }
        assert_eq!(take_found_rows(&mut rows), Some(25));
        assert!(rows.iter().all(|r| !r.contains_key(FOUND_ROWS_COLUMN)));
        assert_eq!(take_found_rows(&mut []), None);
    }

    #[test]
    fn writes_use_only_given_fields() {
        let mut fields = Row::new();
        fields.insert("title".into(), json!("Hello"));
        fields.insert("published".into(), Value::Null);

        let q = insert("posts", &fields);
        assert_eq!(q.sql, "INSERT INTO `posts` (`title`, `published`) VALUES (?, ?)");
        assert_eq!(q.params, vec![json!("Hello"), Value::Null]);

        let q = update("posts", "id", &json!(7), &fields);
        assert_eq!(q.sql, "UPDATE `posts` SET `title` = ?, `published` = ? WHERE `id` = ?");
        assert_eq!(q.params, vec![json!("Hello"), Value::Null, json!(7)]);

        let q = delete("posts", "id", &json!(7));
        assert_eq!(q.sql, "DELETE FROM `posts` WHERE `id` = ?");
    }
}
