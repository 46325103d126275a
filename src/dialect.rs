//! SQL dialect differences between the supported backends.
//!
//! Both MySQL and SQLite accept backtick-quoted identifiers, `?` placeholders
//! and `LIMIT offset, count`, so most SQL is shared. They differ in how date
//! parts are extracted, how tables are introspected, and which index kinds can
//! be declared inline in `CREATE TABLE`.
//!
//! Week numbers follow SQLite's `%W` on both backends (MySQL `WEEK(col, 5)`):
//! weeks start on Monday and days before the first Monday of the year are
//! week 0.

use crate::error::SchemaError;
use crate::schema::ColumnKind;
use regex::Regex;
use sqlx::AnyConnection;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn from_backend_name(name: &str) -> Result<Self, SchemaError> {
        match name.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(SchemaError::UnsupportedDialect(name.to_string())),
        }
    }

    /// Dialect of an open connection.
    pub fn of(conn: &AnyConnection) -> Result<Self, SchemaError> {
        Self::from_backend_name(conn.backend_name())
    }

    /// Expression that reads `column` back in a form the `Any` driver decodes:
    /// temporal and decimal columns as text, booleans as integers.
    pub fn readable_column(&self, table: &str, column: &str, kind: ColumnKind) -> String {
        let col = qualified(table, column);
        let text = match self {
            Dialect::MySql => "CHAR",
            Dialect::Sqlite => "TEXT",
        };
        let int = match self {
            Dialect::MySql => "SIGNED",
            Dialect::Sqlite => "INTEGER",
        };
        match kind {
            ColumnKind::Date
            | ColumnKind::DateTime
            | ColumnKind::Time
            | ColumnKind::Decimal
            | ColumnKind::Other => format!("CAST({} AS {}) AS {}", col, text, quoted(column)),
            ColumnKind::Bool => format!("CAST({} AS {}) AS {}", col, int, quoted(column)),
            ColumnKind::Integer | ColumnKind::Float | ColumnKind::Text | ColumnKind::Blob => col,
        }
    }

    /// Integer expression for one component of a date column.
    pub fn date_part(&self, part: DatePart, column: &str) -> String {
        match self {
            Dialect::MySql => match part {
                DatePart::Year => format!("YEAR({})", column),
                DatePart::Month => format!("MONTH({})", column),
                DatePart::Week => format!("WEEK({}, 5)", column),
                DatePart::DayOfYear => format!("DAYOFYEAR({})", column),
                DatePart::Day => format!("DAYOFMONTH({})", column),
                DatePart::DayOfWeek => format!("DAYOFWEEK({})", column),
                DatePart::Hour => format!("HOUR({})", column),
                DatePart::Minute => format!("MINUTE({})", column),
                DatePart::Second => format!("SECOND({})", column),
            },
            Dialect::Sqlite => {
                let (fmt, adjust) = match part {
                    DatePart::Year => ("%Y", ""),
                    DatePart::Month => ("%m", ""),
                    DatePart::Week => ("%W", ""),
                    DatePart::DayOfYear => ("%j", ""),
                    DatePart::Day => ("%d", ""),
                    // %w is 0 = Sunday; match MySQL's DAYOFWEEK (1 = Sunday).
                    DatePart::DayOfWeek => ("%w", " + 1"),
                    DatePart::Hour => ("%H", ""),
                    DatePart::Minute => ("%M", ""),
                    DatePart::Second => ("%S", ""),
                };
                format!("(CAST(strftime('{}', {}) AS INTEGER){})", fmt, column, adjust)
            }
        }
    }

    /// Query listing the live column names of a table (bound: table name).
    pub fn columns_sql(&self) -> &'static str {
        match self {
            Dialect::MySql => "SELECT COLUMN_NAME FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
            Dialect::Sqlite => "SELECT name FROM pragma_table_info(?)",
        }
    }

    /// Query listing the live index names of a table (bound: table name).
    /// SQLite rows carry the index origin as a second column.
    pub fn indexes_sql(&self) -> &'static str {
        match self {
            Dialect::MySql => "SELECT DISTINCT INDEX_NAME FROM information_schema.STATISTICS WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
            Dialect::Sqlite => "SELECT name, origin FROM pragma_index_list(?)",
        }
    }

    /// SQLite only: primary key columns, which need not have a backing index.
    pub fn primary_columns_sql(&self) -> Option<&'static str> {
        match self {
            Dialect::MySql => None,
            Dialect::Sqlite => Some("SELECT name FROM pragma_table_info(?) WHERE pk > 0"),
        }
    }

    /// Column definition as this backend accepts it. SQLite has no
    /// `AUTO_INCREMENT`; integer primary keys are rowid aliases there instead.
    pub fn column_definition(&self, spec: &str) -> String {
        match self {
            Dialect::MySql => spec.trim().to_string(),
            Dialect::Sqlite => auto_increment_regex().replace_all(spec, "").trim().to_string(),
        }
    }

    /// Query reading the identity of the last inserted row, for backends whose
    /// driver does not report it with the statement result.
    pub fn last_insert_id_sql(&self) -> Option<&'static str> {
        match self {
            Dialect::MySql => None,
            Dialect::Sqlite => Some("SELECT last_insert_rowid()"),
        }
    }

    /// Query answering whether a table exists; any returned row means yes.
    pub fn table_exists_sql(&self) -> &'static str {
        match self {
            Dialect::MySql => "SELECT TABLE_NAME FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
            Dialect::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
        }
    }
}

/// Whether a column spec asks for an auto-assigned value.
pub fn is_auto_increment(spec: &str) -> bool {
    auto_increment_regex().is_match(spec)
}

fn auto_increment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*\bAUTO_?INCREMENT\b").expect("pattern is valid"))
}

/// Components a date-range filter can constrain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Week,
    DayOfYear,
    Day,
    DayOfWeek,
    Hour,
    Minute,
    Second,
}

/// Backtick-quote an identifier (identifiers only ever come from declared schemas).
pub fn quoted(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// `table`.`column`
pub fn qualified(table: &str, column: &str) -> String {
    format!("{}.{}", quoted(table), quoted(column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_backends() {
        assert_eq!(Dialect::from_backend_name("MySQL").unwrap(), Dialect::MySql);
        assert_eq!(Dialect::from_backend_name("SQLite").unwrap(), Dialect::Sqlite);
        assert!(matches!(
            Dialect::from_backend_name("PostgreSQL"),
            Err(SchemaError::UnsupportedDialect(_))
        ));
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quoted("posts"), "`posts`");
        assert_eq!(quoted("we`ird"), "`we``ird`");
        assert_eq!(qualified("posts", "id"), "`posts`.`id`");
    }

    #[test]
    fn week_numbers_agree_across_backends() {
        assert_eq!(
            Dialect::MySql.date_part(DatePart::Week, "`p`.`d`"),
            "WEEK(`p`.`d`, 5)"
        );
        assert_eq!(
            Dialect::Sqlite.date_part(DatePart::Week, "`p`.`d`"),
            "(CAST(strftime('%W', `p`.`d`) AS INTEGER))"
        );
    }

    #[test]
    fn only_sqlite_needs_a_separate_identity_query() {
        assert_eq!(Dialect::MySql.last_insert_id_sql(), None);
        assert_eq!(
            Dialect::Sqlite.last_insert_id_sql(),
            Some("SELECT last_insert_rowid()")
        );
    }

    #[test]
    fn casts_columns_the_driver_cannot_decode() {
        let d = Dialect::Sqlite;
        assert_eq!(d.readable_column("posts", "id", ColumnKind::Integer), "`posts`.`id`");
        assert_eq!(
            d.readable_column("posts", "published", ColumnKind::Date),
            "CAST(`posts`.`published` AS TEXT) AS `published`"
        );
        assert_eq!(
            Dialect::MySql.readable_column("posts", "flag", ColumnKind::Bool),
            "CAST(`posts`.`flag` AS SIGNED) AS `flag`"
        );
    }

    #[test]
    fn strips_auto_increment_for_sqlite() {
        let spec = "bigint unsigned NOT NULL AUTO_INCREMENT";
        assert!(is_auto_increment(spec));
        assert_eq!(Dialect::Sqlite.column_definition(spec), "bigint unsigned NOT NULL");
        assert_eq!(Dialect::MySql.column_definition(spec), spec);
        assert!(!is_auto_increment("varchar(20)"));
    }

    #[test]
    fn extracts_date_parts() {
        assert_eq!(Dialect::MySql.date_part(DatePart::Year, "`t`.`d`"), "YEAR(`t`.`d`)");
        assert_eq!(
            Dialect::Sqlite.date_part(DatePart::Month, "`t`.`d`"),
            "(CAST(strftime('%m', `t`.`d`) AS INTEGER))"
        );
        assert_eq!(
            Dialect::Sqlite.date_part(DatePart::DayOfWeek, "`t`.`d`"),
            "(CAST(strftime('%w', `t`.`d`) AS INTEGER) + 1)"
        );
    }
}
