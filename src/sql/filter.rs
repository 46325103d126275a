//! Filter expressions: a tree of field comparisons joined by AND / OR.
//!
//! The JSON form accepted by [`WhereClause::from_json`] is
//!
//! ```json
//! {
//!   "relation": "OR",
//!   "fields": [
//!     { "status": "publish", "views": { "compare": ">", "value": 10 } },
//!     { "author__in": [1, 2, 3] }
//!   ],
//!   "relationships": { "tags": 7 }
//! }
//! ```
//!
//! A mapping without `relation` is an implicit AND of its entries. Entries of
//! a `fields` array are nested expressions; entries of a `fields` object are
//! field comparisons.

use crate::error::QueryError;
use crate::sql::date::DateQuery;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Reserved top-level key holding association predicates.
pub const RELATIONSHIPS_KEY: &str = "relationships";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    And,
    Or,
}

impl Relation {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Relation::And => "AND",
            Relation::Or => "OR",
        }
    }

    fn from_json(v: &Value) -> Result<Self, QueryError> {
        match v.as_str().map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("AND") => Ok(Relation::And),
            Some("OR") => Ok(Relation::Or),
            _ => Err(QueryError::InvalidFilterExpression(format!(
                "unknown relation {}",
                v
            ))),
        }
    }
}

/// Operators allowed in a plain field comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Like,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Like => "LIKE",
        }
    }

    /// Parse an operator for `field`; anything outside the allow-list is rejected.
    pub fn parse(field: &str, compare: &str) -> Result<Self, QueryError> {
        compare.parse().map_err(|_| QueryError::InvalidComparison {
            field: field.to_string(),
            compare: compare.to_string(),
        })
    }
}

impl FromStr for CompareOp {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            "=" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            "LIKE" => Ok(CompareOp::Like),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// What a single field is compared against.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldClause {
    /// Bare scalar: equality.
    Value(Value),
    Compare { op: CompareOp, value: Value },
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Date-range clause; only valid on date-typed columns.
    Date(DateQuery),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldComparison {
    pub field: String,
    pub clause: FieldClause,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompositeExpression {
    pub relation: Relation,
    pub children: Vec<Filter>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Field(FieldComparison),
    Composite(CompositeExpression),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::all(Vec::new())
    }
}

impl Filter {
    pub fn all(children: Vec<Filter>) -> Self {
        Filter::Composite(CompositeExpression {
            relation: Relation::And,
            children,
        })
    }

    pub fn any(children: Vec<Filter>) -> Self {
        Filter::Composite(CompositeExpression {
            relation: Relation::Or,
            children,
        })
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, FieldClause::Value(value.into()))
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::field(
            field,
            FieldClause::Compare {
                op,
                value: value.into(),
            },
        )
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::field(field, FieldClause::In(values))
    }

    pub fn not_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::field(field, FieldClause::NotIn(values))
    }

    pub fn date(field: impl Into<String>, query: DateQuery) -> Self {
        Self::field(field, FieldClause::Date(query))
    }

    fn field(field: impl Into<String>, clause: FieldClause) -> Self {
        Filter::Field(FieldComparison {
            field: field.into(),
            clause,
        })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Filter::Field(_) => false,
            Filter::Composite(c) => c.children.iter().all(Filter::is_empty),
        }
    }

    /// Parse a JSON filter expression.
    pub fn from_json(v: &Value) -> Result<Self, QueryError> {
        match v {
            Value::Null => Ok(Filter::default()),
            Value::Array(items) => Ok(Filter::all(
                items.iter().map(Filter::from_json).collect::<Result<_, _>>()?,
            )),
            Value::Object(map) => match map.get("relation") {
                Some(relation) => {
                    let relation = Relation::from_json(relation)?;
                    if let Some(extra) = map.keys().find(|k| *k != "relation" && *k != "fields") {
                        return Err(QueryError::InvalidFilterExpression(format!(
                            "unexpected key '{}' next to relation",
                            extra
                        )));
                    }
                    let children = match map.get("fields") {
                        Some(Value::Array(items)) => items
                            .iter()
                            .map(Filter::from_json)
                            .collect::<Result<Vec<_>, _>>()?,
                        Some(Value::Object(fields)) => parse_field_map(fields)?,
                        Some(Value::Null) | None => Vec::new(),
                        Some(other) => {
                            return Err(QueryError::InvalidFilterExpression(format!(
                                "fields must be an array or object, got {}",
                                other
                            )))
                        }
                    };
                    Ok(Filter::Composite(CompositeExpression { relation, children }))
                }
                None => Ok(Filter::all(parse_field_map(map)?)),
            },
            other => Err(QueryError::InvalidFilterExpression(format!(
                "expected an object or array, got {}",
                other
            ))),
        }
    }
}

fn parse_field_map(map: &Map<String, Value>) -> Result<Vec<Filter>, QueryError> {
    let mut out = Vec::with_capacity(map.len());
    for (key, value) in map {
        if key.is_empty() {
            return Err(QueryError::InvalidFilterExpression("empty field name".into()));
        }
        let filter = if let Some(field) = key.strip_suffix("__not_in") {
            Filter::not_in(field, value_list(value))
        } else if let Some(field) = key.strip_suffix("__in") {
            Filter::is_in(field, value_list(value))
        } else {
            Filter::field(key.as_str(), parse_clause(key, value)?)
        };
        out.push(filter);
    }
    Ok(out)
}

fn value_list(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn parse_clause(field: &str, v: &Value) -> Result<FieldClause, QueryError> {
    match v {
        Value::Object(obj) if obj.contains_key("value") => {
            let compare = match obj.get("compare") {
                None => "=",
                Some(Value::String(s)) => s.as_str(),
                Some(other) => {
                    return Err(QueryError::InvalidComparison {
                        field: field.to_string(),
                        compare: other.to_string(),
                    })
                }
            };
            let value = obj.get("value").cloned().unwrap_or(Value::Null);
            match compare.trim().to_ascii_uppercase().as_str() {
                "IN" => Ok(FieldClause::In(value_list(&value))),
                "NOT IN" => Ok(FieldClause::NotIn(value_list(&value))),
                _ => Ok(FieldClause::Compare {
                    op: CompareOp::parse(field, compare)?,
                    value,
                }),
            }
        }
        Value::Object(obj) => Ok(FieldClause::Date(DateQuery::from_json(field, obj)?)),
        Value::Array(items) => Ok(FieldClause::In(items.clone())),
        scalar => Ok(FieldClause::Value(scalar.clone())),
    }
}

/// Association predicates: relationship label -> id of the related entity.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationFilter {
    pub relation: Relation,
    pub entries: Vec<(String, Value)>,
}

impl RelationFilter {
    pub fn new(relation: Relation) -> Self {
        RelationFilter {
            relation,
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, label: impl Into<String>, id: impl Into<Value>) -> Self {
        self.entries.push((label.into(), id.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn from_json(v: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = v else {
            return Err(QueryError::InvalidFilterExpression(
                "relationships must be an object".into(),
            ));
        };
        let (relation, fields) = match map.get("relation") {
            Some(r) => match map.get("fields") {
                Some(Value::Object(fields)) => (Relation::from_json(r)?, fields),
                _ => {
                    return Err(QueryError::InvalidFilterExpression(
                        "relationships.fields must be an object".into(),
                    ))
                }
            },
            None => (Relation::And, map),
        };
        Ok(RelationFilter {
            relation,
            entries: fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }
}

/// A complete WHERE clause: a filter over the model's own columns plus
/// optional association predicates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WhereClause {
    pub filter: Filter,
    pub relationships: Option<RelationFilter>,
}

impl WhereClause {
    pub fn new(filter: Filter) -> Self {
        WhereClause {
            filter,
            relationships: None,
        }
    }

    pub fn with_relationships(mut self, relationships: RelationFilter) -> Self {
        self.relationships = Some(relationships);
        self
    }

    /// Parse a JSON where clause, extracting the reserved `relationships` key.
    pub fn from_json(v: &Value) -> Result<Self, QueryError> {
        match v {
            Value::Object(map) if map.contains_key(RELATIONSHIPS_KEY) => {
                let mut rest = map.clone();
                let relationships = rest
                    .remove(RELATIONSHIPS_KEY)
                    .map(|r| RelationFilter::from_json(&r))
                    .transpose()?;
                Ok(WhereClause {
                    filter: Filter::from_json(&Value::Object(rest))?,
                    relationships,
                })
            }
            other => Ok(WhereClause::new(Filter::from_json(other)?)),
        }
    }
}

impl From<Filter> for WhereClause {
    fn from(filter: Filter) -> Self {
        WhereClause::new(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_mapping_is_implicit_and() {
        let f = Filter::from_json(&json!({"status": "publish", "author": 3})).unwrap();
        assert_eq!(
            f,
            Filter::all(vec![Filter::eq("status", "publish"), Filter::eq("author", 3)])
        );
    }

    #[test]
    fn explicit_relation_with_nested_children() {
        let f = Filter::from_json(&json!({
            "relation": "or",
            "fields": [
                {"status": "draft"},
                {"relation": "AND", "fields": {"views": {"compare": ">=", "value": 10}}}
            ]
        }))
        .unwrap();
        assert_eq!(
            f,
            Filter::any(vec![
                Filter::all(vec![Filter::eq("status", "draft")]),
                Filter::all(vec![Filter::compare("views", CompareOp::Ge, 10)]),
            ])
        );
    }

    #[test]
    fn unknown_relation_is_rejected() {
        let err = Filter::from_json(&json!({"relation": "XOR", "fields": {}})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilterExpression(_)));
    }

    #[test]
    fn disallowed_operator_is_rejected() {
        let err = Filter::from_json(&json!({"title": {"compare": "REGEXP", "value": "x"}}))
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidComparison { ref field, ref compare } if field == "title" && compare == "REGEXP"
        ));
    }

    #[test]
    fn in_suffixes_and_arrays() {
        let f = Filter::from_json(&json!({
            "author__in": [1, 2],
            "status__not_in": "trash",
            "id": {"compare": "IN", "value": [4, 5]}
        }))
        .unwrap();
        assert_eq!(
            f,
            Filter::all(vec![
                Filter::is_in("author", vec![json!(1), json!(2)]),
                Filter::not_in("status", vec![json!("trash")]),
                Filter::is_in("id", vec![json!(4), json!(5)]),
            ])
        );
    }

    #[test]
    fn relationships_key_is_extracted() {
        let w = WhereClause::from_json(&json!({"status": "publish", "relationships": {"tags": 7}}))
            .unwrap();
        assert_eq!(w.filter, Filter::all(vec![Filter::eq("status", "publish")]));
        assert_eq!(
            w.relationships,
            Some(RelationFilter::new(Relation::And).with("tags", 7))
        );
    }

    #[test]
    fn empty_filters() {
        assert!(Filter::from_json(&json!({})).unwrap().is_empty());
        assert!(Filter::from_json(&Value::Null).unwrap().is_empty());
        assert!(Filter::from_json(&json!("x")).is_err());
    }
}
