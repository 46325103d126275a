//! Join compilation for association predicates (`relationships` in a where clause).

use crate::dialect::{qualified, quoted};
use crate::error::QueryError;
use crate::model::{association_table_name, RelationKind, RelationshipDef};
use crate::sql::RelationFilter;
use indexmap::IndexMap;
use serde_json::Value;

/// JOIN clauses plus the predicate over the joined table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JoinFragment {
    pub joins: Vec<String>,
    pub sql: String,
    pub params: Vec<Value>,
}

impl JoinFragment {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Compile association predicates for `table`. All join-table associations of
/// a model share one physical table, so it is joined once and every
/// predicate filters on its `relationship` discriminator.
pub fn compile_relationships(
    table: &str,
    primary: &str,
    relationships: &IndexMap<String, RelationshipDef>,
    filter: &RelationFilter,
) -> Result<JoinFragment, QueryError> {
    let mut out = JoinFragment::default();
    let assoc = association_table_name(table);
    let mut preds = Vec::with_capacity(filter.entries.len());

    for (label, id) in &filter.entries {
        let rel = relationships.get(label).ok_or_else(|| {
            QueryError::InvalidRelation(format!("unknown relationship '{}' on {}", label, table))
        })?;
        match rel.kind {
            RelationKind::HasMany | RelationKind::ManyToMany => {
                if out.joins.is_empty() {
                    out.joins.push(format!(
                        "LEFT JOIN {} ON {} = {}",
                        quoted(&assoc),
                        qualified(&assoc, "left_id"),
                        qualified(table, primary)
                    ));
                }
                preds.push(format!(
                    "({} = ? AND {} = ?)",
                    qualified(&assoc, "relationship"),
                    qualified(&assoc, "right_id")
                ));
                out.params.push(Value::String(label.clone()));
                out.params.push(id.clone());
            }
            kind => {
                return Err(QueryError::InvalidRelation(format!(
                    "relationship '{}' is {}, which cannot be queried through a join table",
                    label,
                    kind.as_str()
                )))
            }
        }
    }

    out.sql = preds.join(&format!(" {} ", filter.relation.as_sql()));
    Ok(out)
}
