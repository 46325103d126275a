//! Declarative table schema: ordered column specs plus index declarations.
//!
//! Column specs are opaque to this crate except for their leading type word,
//! which decides how values are read back and how filters compile. Index
//! declarations follow the grammar
//! `(PRIMARY KEY|UNIQUE KEY|FULLTEXT KEY|SPATIAL KEY|KEY|INDEX) [name] (col, ...)`.

use crate::error::SchemaError;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Name forced onto every primary key index.
pub const PRIMARY_INDEX_NAME: &str = "PRIMARY";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Column name -> column type spec, in declaration order.
    pub fields: IndexMap<String, String>,
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: impl Into<String>) -> Self {
        self.fields.insert(name.into(), spec.into());
        self
    }

    pub fn index(mut self, spec: impl Into<String>) -> Self {
        self.indexes.push(spec.into());
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.fields.get(name).map(|spec| ColumnKind::of(spec))
    }

    /// Parse every index declaration; the first malformed one is an error.
    pub fn parsed_indexes(&self) -> Result<Vec<IndexSpec>, SchemaError> {
        self.indexes
            .iter()
            .map(|raw| parse_index(raw).ok_or_else(|| SchemaError::Parse(raw.clone())))
            .collect()
    }

    /// Columns of the PRIMARY KEY index. Exactly one primary index must exist.
    pub fn primary_columns(&self, table: &str) -> Result<Vec<String>, SchemaError> {
        let primaries: Vec<IndexSpec> = self
            .parsed_indexes()?
            .into_iter()
            .filter(|idx| idx.kind == IndexKind::Primary)
            .collect();
        match primaries.len() {
            0 => Err(SchemaError::MissingPrimaryKey {
                table: table.to_string(),
            }),
            1 => Ok(primaries[0].columns.clone()),
            count => Err(SchemaError::MultiplePrimaryKeys {
                table: table.to_string(),
                count,
            }),
        }
    }
}

/// The identity column of a schema: the single column of its PRIMARY KEY.
pub fn get_primary_column(table: &str, schema: &TableSchema) -> Result<String, SchemaError> {
    let mut columns = schema.primary_columns(table)?;
    if columns.len() != 1 {
        return Err(SchemaError::CompositePrimaryKey {
            table: table.to_string(),
            columns: columns.join(", "),
        });
    }
    Ok(columns.remove(0))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Primary,
    Key,
    Unique,
    Fulltext,
    Spatial,
}

impl IndexKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IndexKind::Primary => "PRIMARY KEY",
            IndexKind::Key => "KEY",
            IndexKind::Unique => "UNIQUE KEY",
            IndexKind::Fulltext => "FULLTEXT KEY",
            IndexKind::Spatial => "SPATIAL KEY",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        let normalized = keyword
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase()
            .replace("INDEX", "KEY");
        match normalized.as_str() {
            "PRIMARY KEY" => Some(IndexKind::Primary),
            "KEY" => Some(IndexKind::Key),
            "UNIQUE KEY" => Some(IndexKind::Unique),
            "FULLTEXT KEY" => Some(IndexKind::Fulltext),
            "SPATIAL KEY" => Some(IndexKind::Spatial),
            _ => None,
        }
    }
}

/// A parsed index declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSpec {
    pub kind: IndexKind,
    /// Declared name; `PRIMARY` for primary keys, the raw column list when omitted.
    pub name: String,
    /// Column list exactly as written between the parentheses.
    pub raw_columns: String,
    /// Column entries split on top-level commas, trimmed. Prefix lengths and
    /// sort orders stay attached (`slug(191)`, `created DESC`).
    pub columns: Vec<String>,
}

impl IndexSpec {
    /// Name used for the index in the database. Column-list default names are
    /// folded to identifier characters so the same declaration always maps to
    /// the same physical index.
    pub fn physical_name(&self) -> String {
        if self.kind == IndexKind::Primary {
            return PRIMARY_INDEX_NAME.to_string();
        }
        let mut out = String::with_capacity(self.name.len());
        let mut last_sep = false;
        for c in self.name.chars() {
            if c.is_alphanumeric() || c == '_' || c == '$' || c == '-' {
                out.push(c);
                last_sep = false;
            } else if !last_sep && !out.is_empty() {
                out.push('_');
                last_sep = true;
            }
        }
        while out.ends_with('_') {
            out.pop();
        }
        out
    }

    /// Bare column names with prefix lengths and sort orders stripped.
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| {
                let c = c.trim().trim_matches('`');
                let c = c.split('(').next().unwrap_or(c);
                let c = c.split_whitespace().next().unwrap_or(c);
                c.trim_matches('`').to_string()
            })
            .collect()
    }
}

fn index_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?is)^",
            r"(?P<kind>PRIMARY\s+KEY|(?:UNIQUE|FULLTEXT|SPATIAL)\s+(?:KEY|INDEX)|KEY|INDEX)",
            r"\s+",
            r"(?:`?(?P<name>[0-9\p{L}$_-]+)`?\s*)?",
            r"\((?P<columns>.+)\)$",
        ))
        .expect("index pattern is valid")
    })
}

/// Parse an index declaration into `{kind, name, columns}`. Returns `None`
/// when the declaration does not follow the index grammar.
pub fn parse_index(spec: &str) -> Option<IndexSpec> {
    let trimmed = spec.trim();
    let caps = index_regex().captures(trimmed)?;
    let kind = IndexKind::from_keyword(caps.name("kind")?.as_str())?;
    let raw_columns = caps.name("columns")?.as_str().trim().to_string();
    let columns = split_columns(&raw_columns);
    if columns.is_empty() || columns.iter().any(|c| c.is_empty()) {
        return None;
    }
    let name = match (kind, caps.name("name")) {
        (IndexKind::Primary, _) => PRIMARY_INDEX_NAME.to_string(),
        (_, Some(n)) => n.as_str().to_string(),
        (_, None) => raw_columns.clone(),
    };
    Some(IndexSpec {
        kind,
        name,
        raw_columns,
        columns,
    })
}

fn split_columns(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in raw.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    out.push(current.trim().to_string());
    out
}

/// Coarse storage class of a column, derived from the leading word of its spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Integer,
    Float,
    Decimal,
    Bool,
    Text,
    Date,
    DateTime,
    Time,
    Blob,
    Other,
}

impl ColumnKind {
    pub fn of(spec: &str) -> Self {
        let lower = spec.trim().to_ascii_lowercase();
        let base: String = lower
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        match base.as_str() {
            "tinyint" if lower.starts_with("tinyint(1)") => ColumnKind::Bool,
            "bool" | "boolean" => ColumnKind::Bool,
            "int" | "integer" | "tinyint" | "smallint" | "mediumint" | "bigint" | "serial"
            | "bigserial" => ColumnKind::Integer,
            "float" | "double" | "real" => ColumnKind::Float,
            "decimal" | "numeric" | "dec" => ColumnKind::Decimal,
            "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" | "enum"
            | "set" | "json" | "clob" => ColumnKind::Text,
            "date" => ColumnKind::Date,
            "datetime" | "timestamp" => ColumnKind::DateTime,
            "time" => ColumnKind::Time,
            "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
                ColumnKind::Blob
            }
            _ => ColumnKind::Other,
        }
    }

    /// Date-typed columns compile structured filters through the date-range compiler.
    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnKind::Date | ColumnKind::DateTime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primary_key_and_forces_name() {
        let idx = parse_index("PRIMARY KEY  (term_id)").unwrap();
        assert_eq!(idx.kind, IndexKind::Primary);
        assert_eq!(idx.name, "PRIMARY");
        assert_eq!(idx.columns, vec!["term_id"]);

        let named = parse_index("primary key pk_name (id)").unwrap();
        assert_eq!(named.name, "PRIMARY");
    }

    #[test]
    fn name_defaults_to_column_list() {
        let idx = parse_index("KEY (relationship, right_id)").unwrap();
        assert_eq!(idx.kind, IndexKind::Key);
        assert_eq!(idx.name, "relationship, right_id");
        assert_eq!(idx.columns, vec!["relationship", "right_id"]);
        assert_eq!(idx.physical_name(), "relationship_right_id");
    }

    #[test]
    fn index_is_a_synonym_for_key() {
        assert_eq!(parse_index("INDEX idx_a (a)").unwrap().kind, IndexKind::Key);
        assert_eq!(
            parse_index("UNIQUE INDEX `slug_unique` (slug)").unwrap(),
            IndexSpec {
                kind: IndexKind::Unique,
                name: "slug_unique".into(),
                raw_columns: "slug".into(),
                columns: vec!["slug".into()],
            }
        );
        assert_eq!(parse_index("fulltext key body (body)").unwrap().kind, IndexKind::Fulltext);
        assert_eq!(parse_index("SPATIAL KEY geo (pt)").unwrap().kind, IndexKind::Spatial);
    }

    #[test]
    fn keeps_prefix_lengths_inside_columns() {
        let idx = parse_index("KEY slug (slug(191), created DESC)").unwrap();
        assert_eq!(idx.name, "slug");
        assert_eq!(idx.columns, vec!["slug(191)", "created DESC"]);
        assert_eq!(idx.column_names(), vec!["slug", "created"]);
    }

    #[test]
    fn rejects_malformed_declarations() {
        assert!(parse_index("").is_none());
        assert!(parse_index("KEY name").is_none());
        assert!(parse_index("FOREIGN KEY (a)").is_none());
        assert!(parse_index("KEY ()").is_none());
        assert!(parse_index("UNIQUE (a)").is_none());
    }

    #[test]
    fn primary_column_requires_exactly_one_primary_index() {
        let schema = TableSchema::new()
            .field("id", "bigint NOT NULL")
            .index("PRIMARY KEY (id)")
            .index("KEY title (title)");
        assert_eq!(get_primary_column("posts", &schema).unwrap(), "id");

        let none = TableSchema::new().field("id", "bigint").index("KEY (id)");
        assert!(matches!(
            get_primary_column("posts", &none),
            Err(SchemaError::MissingPrimaryKey { .. })
        ));

        let two = none.clone().index("PRIMARY KEY (id)").index("PRIMARY KEY (title)");
        assert!(matches!(
            get_primary_column("posts", &two),
            Err(SchemaError::MultiplePrimaryKeys { count: 2, .. })
        ));

        let composite = TableSchema::new().index("PRIMARY KEY (relationship, left_id, right_id)");
        assert!(matches!(
            get_primary_column("rel", &composite),
            Err(SchemaError::CompositePrimaryKey { .. })
        ));

        let broken = TableSchema::new().index("PRIMARY (id)");
        assert!(matches!(get_primary_column("posts", &broken), Err(SchemaError::Parse(_))));
    }

    #[test]
    fn classifies_column_specs() {
        assert_eq!(ColumnKind::of("bigint(20) unsigned NOT NULL auto_increment"), ColumnKind::Integer);
        assert_eq!(ColumnKind::of("tinyint(1) NOT NULL"), ColumnKind::Bool);
        assert_eq!(ColumnKind::of("varchar(200) NOT NULL default ''"), ColumnKind::Text);
        assert_eq!(ColumnKind::of("date"), ColumnKind::Date);
        assert_eq!(ColumnKind::of("DATETIME NULL"), ColumnKind::DateTime);
        assert_eq!(ColumnKind::of("decimal(10,2)"), ColumnKind::Decimal);
        assert!(ColumnKind::of("timestamp").is_temporal());
        assert!(!ColumnKind::of("time").is_temporal());
    }
}
