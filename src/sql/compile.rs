//! Where-clause compiler: filter tree -> SQL fragment with bound values.

use crate::dialect::{qualified, Dialect};
use crate::error::QueryError;
use crate::schema::TableSchema;
use crate::sql::{CompareOp, FieldClause, FieldComparison, Filter};
use serde_json::Value;

/// A piece of SQL plus the values for its `?` placeholders, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Fragment {
            sql: sql.into(),
            params,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Compiles filters over one table. Every referenced field must be declared
/// in the table's schema; column references are qualified with the table.
pub struct FilterCompiler<'a> {
    table: &'a str,
    schema: &'a TableSchema,
    dialect: Dialect,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(table: &'a str, schema: &'a TableSchema, dialect: Dialect) -> Self {
        FilterCompiler {
            table,
            schema,
            dialect,
        }
    }

    /// Compile a filter. An empty filter yields an empty fragment.
    pub fn compile(&self, filter: &Filter) -> Result<Fragment, QueryError> {
        match filter {
            Filter::Field(cmp) => self.field(cmp),
            Filter::Composite(c) => {
                let mut parts = Vec::with_capacity(c.children.len());
                let mut params = Vec::new();
                for child in &c.children {
                    let frag = self.compile(child)?;
                    if frag.is_empty() {
                        continue;
                    }
                    match child {
                        Filter::Composite(_) => parts.push(format!("({})", frag.sql)),
                        Filter::Field(_) => parts.push(frag.sql),
                    }
                    params.extend(frag.params);
                }
                let glue = format!(" {} ", c.relation.as_sql());
                Ok(Fragment::new(parts.join(&glue), params))
            }
        }
    }

    fn field(&self, cmp: &FieldComparison) -> Result<Fragment, QueryError> {
        let kind = self.schema.column_kind(&cmp.field).ok_or_else(|| {
            QueryError::InvalidFilterExpression(format!(
                "unknown field '{}' for table {}",
                cmp.field, self.table
            ))
        })?;
        let col = qualified(self.table, &cmp.field);
        match &cmp.clause {
            FieldClause::Value(v) => Ok(self.compare(&col, CompareOp::Eq, v)),
            FieldClause::Compare { op, value } => Ok(self.compare(&col, *op, value)),
            FieldClause::In(values) => Ok(list(&col, "IN", values, "1 = 0")),
            FieldClause::NotIn(values) => Ok(list(&col, "NOT IN", values, "1 = 1")),
            FieldClause::Date(q) => {
                if !kind.is_temporal() {
                    return Err(QueryError::InvalidFilterExpression(format!(
                        "date clause on non-date field '{}'",
                        cmp.field
                    )));
                }
                q.compile(self.dialect, &col, kind)
            }
        }
    }

    fn compare(&self, col: &str, op: CompareOp, value: &Value) -> Fragment {
        match (op, value) {
            (CompareOp::Eq, Value::Null) => Fragment::new(format!("{} IS NULL", col), Vec::new()),
            (CompareOp::Ne, Value::Null) => {
                Fragment::new(format!("{} IS NOT NULL", col), Vec::new())
            }
            _ => Fragment::new(format!("{} {} ?", col, op.as_sql()), vec![value.clone()]),
        }
    }
}

fn list(col: &str, op: &str, values: &[Value], when_empty: &str) -> Fragment {
    if values.is_empty() {
        return Fragment::new(when_empty, Vec::new());
    }
    let marks = vec!["?"; values.len()].join(", ");
    Fragment::new(format!("{} {} ({})", col, op, marks), values.to_vec())
}
