//! Field sanitisation: a strategy table from column kind to a normalising function.

use crate::schema::{ColumnKind, TableSchema};
use crate::sql::Row;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde_json::{Number, Value};
use std::collections::HashMap;

/// Normalise one value for storage, or explain why it cannot be stored.
pub type Sanitizer = fn(&Value) -> Result<Value, String>;

#[derive(Clone, Debug)]
pub struct Sanitizers {
    table: HashMap<ColumnKind, Sanitizer>,
}

impl Default for Sanitizers {
    fn default() -> Self {
        Self::standard()
    }
}

impl Sanitizers {
    /// The built-in strategies. Kinds without one pass values through.
    pub fn standard() -> Self {
        let mut table: HashMap<ColumnKind, Sanitizer> = HashMap::new();
        table.insert(ColumnKind::Integer, integer);
        table.insert(ColumnKind::Float, float);
        table.insert(ColumnKind::Decimal, decimal);
        table.insert(ColumnKind::Bool, boolean);
        table.insert(ColumnKind::Text, text);
        table.insert(ColumnKind::Date, date);
        table.insert(ColumnKind::DateTime, datetime);
        table.insert(ColumnKind::Time, time);
        Sanitizers { table }
    }

    /// Replace the strategy for one column kind.
    pub fn register(&mut self, kind: ColumnKind, f: Sanitizer) -> &mut Self {
        self.table.insert(kind, f);
        self
    }

    pub fn sanitize(&self, kind: ColumnKind, v: &Value) -> Result<Value, String> {
        if v.is_null() {
            return Ok(Value::Null);
        }
        match self.table.get(&kind) {
            Some(f) => f(v),
            None => Ok(v.clone()),
        }
    }

    /// Sanitise every declared field in `changes`, skipping unknown keys.
    /// All failures are reported together, keyed by field.
    pub fn sanitize_changes(
        &self,
        schema: &TableSchema,
        changes: &Row,
    ) -> Result<Row, IndexMap<String, String>> {
        let mut clean = Row::new();
        let mut invalid = IndexMap::new();
        for (key, value) in changes {
            let Some(kind) = schema.column_kind(key) else {
                tracing::debug!(field = %key, "skipping undeclared field");
                continue;
            };
            match self.sanitize(kind, value) {
                Ok(v) => {
                    clean.insert(key.clone(), v);
                }
                Err(reason) => {
                    invalid.insert(key.clone(), reason);
                }
            }
        }
        if invalid.is_empty() {
            Ok(clean)
        } else {
            Err(invalid)
        }
    }
}

fn integer(v: &Value) -> Result<Value, String> {
    match v {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(v.clone()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => Ok(Value::from(f as i64)),
            _ => Err(format!("{} is not an integer", n)),
        },
        Value::Bool(b) => Ok(Value::from(*b as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("'{}' is not an integer", s)),
        other => Err(format!("expected an integer, got {}", other)),
    }
}

fn parse_float(v: &Value) -> Result<f64, String> {
    match v {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{} is not a number", n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a number", s)),
        other => Err(format!("expected a number, got {}", other)),
    }
}

fn float(v: &Value) -> Result<Value, String> {
    let f = parse_float(v)?;
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("{} is not finite", f))
}

// Decimals keep their textual form so no precision is lost on the way in.
fn decimal(v: &Value) -> Result<Value, String> {
    parse_float(v)?;
    match v {
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        other => Ok(Value::String(other.to_string())),
    }
}

fn boolean(v: &Value) -> Result<Value, String> {
    match v {
        Value::Bool(_) => Ok(v.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(format!("{} is not a boolean", n)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
            "0" | "false" | "no" | "off" | "" => Ok(Value::Bool(false)),
            _ => Err(format!("'{}' is not a boolean", s)),
        },
        other => Err(format!("expected a boolean, got {}", other)),
    }
}

fn text(v: &Value) -> Result<Value, String> {
    match v {
        Value::String(_) => Ok(v.clone()),
        other => Ok(Value::String(other.to_string())),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

fn date(v: &Value) -> Result<Value, String> {
    let s = v.as_str().ok_or_else(|| format!("expected a date string, got {}", v))?;
    parse_datetime(s)
        .map(|dt| Value::String(dt.format("%Y-%m-%d").to_string()))
        .ok_or_else(|| format!("'{}' is not a date", s))
}

fn datetime(v: &Value) -> Result<Value, String> {
    let s = v.as_str().ok_or_else(|| format!("expected a datetime string, got {}", v))?;
    parse_datetime(s)
        .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
        .ok_or_else(|| format!("'{}' is not a datetime", s))
}

fn time(v: &Value) -> Result<Value, String> {
    let s = v.as_str().ok_or_else(|| format!("expected a time string, got {}", v))?;
    ["%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s.trim(), fmt).ok())
        .map(|t| Value::String(t.format("%H:%M:%S").to_string()))
        .ok_or_else(|| format!("'{}' is not a time", s))
}
