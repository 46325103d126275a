//! Date-range clauses for date and datetime columns.
//!
//! A clause constrains individual components of the column (`year`, `month`,
//! ... each a number or a list) under one `compare` operator, and/or bounds it
//! with `after` / `before`. Bounds are either literal datetimes or component
//! objects; missing components of a bound are filled towards the start or the
//! end of the period, depending on which side the bound is on and whether
//! `inclusive` is set. All constraints of one clause are joined with AND.

use crate::dialect::{DatePart, Dialect};
use crate::error::QueryError;
use crate::schema::ColumnKind;
use crate::sql::Fragment;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DateValue {
    One(i64),
    Many(Vec<i64>),
}

impl DateValue {
    fn from_json(key: &str, v: &Value) -> Result<Self, QueryError> {
        match v {
            Value::Array(items) => items
                .iter()
                .map(|i| int_of(key, i))
                .collect::<Result<Vec<_>, _>>()
                .map(DateValue::Many),
            other => int_of(key, other).map(DateValue::One),
        }
    }

    fn values(&self) -> Vec<i64> {
        match self {
            DateValue::One(v) => vec![*v],
            DateValue::Many(vs) => vs.clone(),
        }
    }
}

fn int_of(key: &str, v: &Value) -> Result<i64, QueryError> {
    let n = match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.ok_or_else(|| QueryError::InvalidFilterExpression(format!("{} must be an integer, got {}", key, v)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateCompare {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Between,
    NotBetween,
}

impl DateCompare {
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        Some(match upper.as_str() {
            "=" => DateCompare::Eq,
            "!=" => DateCompare::Ne,
            "<" => DateCompare::Lt,
            "<=" => DateCompare::Le,
            ">" => DateCompare::Gt,
            ">=" => DateCompare::Ge,
            "IN" => DateCompare::In,
            "NOT IN" => DateCompare::NotIn,
            "BETWEEN" => DateCompare::Between,
            "NOT BETWEEN" => DateCompare::NotBetween,
            _ => return None,
        })
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            DateCompare::Eq => "=",
            DateCompare::Ne => "!=",
            DateCompare::Lt => "<",
            DateCompare::Le => "<=",
            DateCompare::Gt => ">",
            DateCompare::Ge => ">=",
            DateCompare::In => "IN",
            DateCompare::NotIn => "NOT IN",
            DateCompare::Between => "BETWEEN",
            DateCompare::NotBetween => "NOT BETWEEN",
        }
    }
}

/// One side of a range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DateBound {
    /// A complete point in time.
    Literal(NaiveDateTime),
    /// A partial date; unset components are filled when compiled.
    Parts {
        year: i32,
        month: Option<u32>,
        day: Option<u32>,
        hour: Option<u32>,
        minute: Option<u32>,
        second: Option<u32>,
    },
}

impl DateBound {
    pub fn year(year: i32) -> Self {
        DateBound::Parts {
            year,
            month: None,
            day: None,
            hour: None,
            minute: None,
            second: None,
        }
    }

    fn from_json(key: &str, v: &Value) -> Result<Self, QueryError> {
        match v {
            Value::String(s) => Self::parse_literal(s).ok_or_else(|| {
                QueryError::InvalidFilterExpression(format!("{}: unrecognised date '{}'", key, s))
            }),
            Value::Number(_) => Ok(DateBound::year(int_of(key, v)? as i32)),
            Value::Object(obj) => {
                let part = |name: &str| -> Result<Option<u32>, QueryError> {
                    obj.get(name).map(|p| int_of(name, p).map(|n| n as u32)).transpose()
                };
                let year = obj.get("year").ok_or_else(|| {
                    QueryError::InvalidFilterExpression(format!("{} requires a year", key))
                })?;
                Ok(DateBound::Parts {
                    year: int_of("year", year)? as i32,
                    month: part("month")?,
                    day: part("day")?,
                    hour: part("hour")?,
                    minute: part("minute")?,
                    second: part("second")?,
                })
            }
            other => Err(QueryError::InvalidFilterExpression(format!(
                "{} must be a date string or object, got {}",
                key, other
            ))),
        }
    }

    /// `YYYY` and `YYYY-MM` become partial bounds; full dates and datetimes are literal.
    pub fn parse_literal(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
            return s.parse().ok().map(DateBound::year);
        }
        if let Some((y, m)) = s.split_once('-').filter(|(_, m)| m.len() == 2 && s.len() == 7) {
            return Some(DateBound::Parts {
                year: y.parse().ok()?,
                month: Some(m.parse().ok()?),
                day: None,
                hour: None,
                minute: None,
                second: None,
            });
        }
        for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(DateBound::Literal(dt));
            }
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .map(|d| DateBound::Literal(d.and_time(NaiveTime::MIN)))
    }

    /// Resolve to a point in time. `fill_max` fills unset components with the
    /// end of the period instead of its start.
    pub fn resolve(&self, fill_max: bool) -> Option<NaiveDateTime> {
        match *self {
            DateBound::Literal(dt) => Some(dt),
            DateBound::Parts {
                year,
                month,
                day,
                hour,
                minute,
                second,
            } => {
                let month = month.unwrap_or(if fill_max { 12 } else { 1 });
                let day = match day {
                    Some(d) => d,
                    None if fill_max => last_day_of_month(year, month)?,
                    None => 1,
                };
                let (h, m, s) = if fill_max { (23, 59, 59) } else { (0, 0, 0) };
                NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(
                    hour.unwrap_or(h),
                    minute.unwrap_or(m),
                    second.unwrap_or(s),
                )
            }
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt().map(|d| d.day())
}

/// Structured filter for a date-typed column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DateQuery {
    /// Operator applied to every component; defaults to `=` (or `IN` for lists).
    pub compare: Option<DateCompare>,
    pub inclusive: bool,
    pub after: Option<DateBound>,
    pub before: Option<DateBound>,
    pub parts: Vec<(DatePart, DateValue)>,
}

impl DateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part(mut self, part: DatePart, value: DateValue) -> Self {
        self.parts.push((part, value));
        self
    }

    pub fn after(mut self, bound: DateBound) -> Self {
        self.after = Some(bound);
        self
    }

    pub fn before(mut self, bound: DateBound) -> Self {
        self.before = Some(bound);
        self
    }

    pub fn inclusive(mut self, inclusive: bool) -> Self {
        self.inclusive = inclusive;
        self
    }

    pub fn compare(mut self, compare: DateCompare) -> Self {
        self.compare = Some(compare);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.after.is_none() && self.before.is_none() && self.parts.is_empty()
    }

    pub fn from_json(field: &str, obj: &Map<String, Value>) -> Result<Self, QueryError> {
        let mut q = DateQuery::new();
        for (key, value) in obj {
            match key.as_str() {
                "compare" => {
                    let raw = value.as_str().unwrap_or_default();
                    q.compare = Some(DateCompare::parse(raw).ok_or_else(|| {
                        QueryError::InvalidComparison {
                            field: field.to_string(),
                            compare: value.to_string(),
                        }
                    })?);
                }
                "inclusive" => q.inclusive = truthy(value),
                "after" => q.after = Some(DateBound::from_json("after", value)?),
                "before" => q.before = Some(DateBound::from_json("before", value)?),
                other => match part_of(other) {
                    Some(part) => q.parts.push((part, DateValue::from_json(other, value)?)),
                    None => {
                        return Err(QueryError::InvalidFilterExpression(format!(
                            "unknown date key '{}' for field {}",
                            other, field
                        )))
                    }
                },
            }
        }
        Ok(q)
    }

    /// Compile against `column` (already qualified and quoted).
    pub fn compile(
        &self,
        dialect: Dialect,
        column: &str,
        kind: ColumnKind,
    ) -> Result<Fragment, QueryError> {
        if self.is_empty() {
            return Err(QueryError::InvalidFilterExpression(format!(
                "date clause on {} constrains nothing",
                column
            )));
        }
        let mut out = Fragment::default();
        let mut clauses = Vec::new();

        if let Some(after) = &self.after {
            let op = if self.inclusive { ">=" } else { ">" };
            let at = self.resolve_bound(after, !self.inclusive, column)?;
            clauses.push(format!("{} {} ?", column, op));
            out.params.push(Value::String(format_bound(at, kind)));
        }
        if let Some(before) = &self.before {
            let op = if self.inclusive { "<=" } else { "<" };
            let at = self.resolve_bound(before, self.inclusive, column)?;
            clauses.push(format!("{} {} ?", column, op));
            out.params.push(Value::String(format_bound(at, kind)));
        }
        for (part, value) in &self.parts {
            let expr = dialect.date_part(*part, column);
            let values = value.values();
            let compare = self.compare.unwrap_or(match value {
                DateValue::One(_) => DateCompare::Eq,
                DateValue::Many(_) => DateCompare::In,
            });
            let sql = match compare {
                DateCompare::In | DateCompare::NotIn => {
                    if values.is_empty() {
                        return Err(QueryError::InvalidFilterExpression(format!(
                            "{} needs at least one value",
                            compare.as_sql()
                        )));
                    }
                    let marks = vec!["?"; values.len()].join(", ");
                    format!("{} {} ({})", expr, compare.as_sql(), marks)
                }
                DateCompare::Between | DateCompare::NotBetween => {
                    if values.len() != 2 {
                        return Err(QueryError::InvalidFilterExpression(format!(
                            "{} needs exactly two values",
                            compare.as_sql()
                        )));
                    }
                    format!("{} {} ? AND ?", expr, compare.as_sql())
                }
                scalar => {
                    if values.len() != 1 {
                        return Err(QueryError::InvalidFilterExpression(format!(
                            "{} takes a single value",
                            scalar.as_sql()
                        )));
                    }
                    format!("{} {} ?", expr, scalar.as_sql())
                }
            };
            clauses.push(sql);
            out.params.extend(values.into_iter().map(Value::from));
        }

        out.sql = if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            format!("({})", clauses.join(" AND "))
        };
        Ok(out)
    }

    fn resolve_bound(
        &self,
        bound: &DateBound,
        fill_max: bool,
        column: &str,
    ) -> Result<NaiveDateTime, QueryError> {
        bound.resolve(fill_max).ok_or_else(|| {
            QueryError::InvalidFilterExpression(format!("invalid date bound for {}: {:?}", column, bound))
        })
    }
}

fn part_of(key: &str) -> Option<DatePart> {
    Some(match key {
        "year" => DatePart::Year,
        "month" | "monthnum" => DatePart::Month,
        "week" | "w" => DatePart::Week,
        "dayofyear" => DatePart::DayOfYear,
        "day" => DatePart::Day,
        "dayofweek" => DatePart::DayOfWeek,
        "hour" => DatePart::Hour,
        "minute" => DatePart::Minute,
        "second" => DatePart::Second,
        _ => return None,
    })
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().map_or(false, |n| n != 0),
        Value::String(s) => !matches!(s.as_str(), "" | "0" | "false"),
        _ => false,
    }
}

fn format_bound(at: NaiveDateTime, kind: ColumnKind) -> String {
    match kind {
        ColumnKind::Date => at.format("%Y-%m-%d").to_string(),
        _ => at.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}
