//! Query: filter expression + paging args -> one paged SELECT and its results.

mod results;

pub use results::*;

use crate::dialect::Dialect;
use crate::error::QueryError;
use crate::model::ModelDef;
use crate::sql::{
    self, compile_relationships, count_of, exec, Direction, FilterCompiler, Fragment, PageSpec,
    QueryBuf, WhereClause,
};
use serde::Deserialize;
use sqlx::AnyConnection;
use std::sync::Arc;

/// Largest offset or row count both backends accept in `LIMIT`.
const MAX_LIMIT: u64 = i64::MAX as u64;

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    10
}

/// Paging and ordering. Pages are 1-based.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct QueryArgs {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    /// Column to order by; the primary column when unset.
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub direction: Direction,
}

impl Default for QueryArgs {
    fn default() -> Self {
        QueryArgs {
            page: default_page(),
            per_page: default_per_page(),
            order_by: None,
            direction: Direction::Asc,
        }
    }
}

impl QueryArgs {
    pub fn page(page: u64, per_page: u64) -> Self {
        QueryArgs {
            page,
            per_page,
            ..Default::default()
        }
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(column.into());
        self.direction = direction;
        self
    }

    fn effective_page(&self) -> u64 {
        self.page.max(1)
    }

    fn effective_per_page(&self) -> u64 {
        self.per_page.max(1)
    }

    /// Rows skipped before this page. Paging past what `LIMIT` can express
    /// is rejected.
    pub fn offset(&self) -> Result<u64, QueryError> {
        (self.effective_page() - 1)
            .checked_mul(self.effective_per_page())
            .filter(|offset| *offset <= MAX_LIMIT && self.effective_per_page() <= MAX_LIMIT)
            .ok_or_else(|| {
                QueryError::InvalidFilterExpression(format!(
                    "page {} of {} rows is out of range",
                    self.page, self.per_page
                ))
            })
    }
}

/// SQL for one page plus the fallback total count.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledQuery {
    pub select: QueryBuf,
    pub count: QueryBuf,
    pub offset: u64,
}

#[derive(Clone, Debug)]
pub struct Query {
    model: Arc<ModelDef>,
    where_clause: WhereClause,
    args: QueryArgs,
}

impl Query {
    pub fn new(model: Arc<ModelDef>, where_clause: impl Into<WhereClause>, args: QueryArgs) -> Self {
        Query {
            model,
            where_clause: where_clause.into(),
            args,
        }
    }

    pub fn args(&self) -> &QueryArgs {
        &self.args
    }

    pub fn compile(&self, dialect: Dialect) -> Result<CompiledQuery, QueryError> {
        let model = &self.model;
        let compiler = FilterCompiler::new(&model.table, &model.schema, dialect);
        let own = compiler.compile(&self.where_clause.filter)?;

        let join = match &self.where_clause.relationships {
            Some(r) if !r.is_empty() => {
                compile_relationships(&model.table, &model.primary, &model.relationships, r)?
            }
            _ => Default::default(),
        };

        let filter = match (own.is_empty(), join.is_empty()) {
            (false, false) => {
                let mut params = own.params;
                params.extend(join.params);
                Fragment::new(format!("({}) AND ({})", own.sql, join.sql), params)
            }
            (false, true) => own,
            (true, false) => Fragment::new(join.sql, join.params),
            (true, true) => Fragment::default(),
        };

        let order_by = match &self.args.order_by {
            Some(col) if model.schema.has_field(col) => col.as_str(),
            Some(col) => {
                return Err(QueryError::InvalidFilterExpression(format!(
                    "cannot order {} by unknown field '{}'",
                    model.table, col
                )))
            }
            None => model.primary.as_str(),
        };

        let grouped = (!join.joins.is_empty()).then_some(model.primary.as_str());
        let offset = self.args.offset()?;
        let page = PageSpec {
            joins: &join.joins,
            filter: &filter,
            group_by: grouped,
            order_by,
            direction: self.args.direction,
            offset,
            limit: self.args.effective_per_page(),
        };
        Ok(CompiledQuery {
            select: sql::select_page(&model.table, &model.schema, dialect, &page),
            count: sql::count_matching(&model.table, &join.joins, &filter, grouped),
            offset,
        })
    }

    /// Run the query. Driver failures are returned, never turned into an empty page.
    pub async fn get_results(&self, conn: &mut AnyConnection) -> Result<QueryResults, QueryError> {
        let compiled = self.compile(Dialect::of(conn)?)?;
        let mut rows = exec::query_many(conn, &compiled.select)
            .await
            .map_err(|source| QueryError::Execution {
                sql: compiled.select.sql.clone(),
                source,
            })?;

        for row in rows.iter_mut() {
            exec::restore_kinds(&self.model.schema, row);
        }
        let total = match sql::take_found_rows(&mut rows) {
            Some(total) => total,
            None if compiled.offset == 0 => 0,
            // Past the last page the window count has no row to ride on.
            None => {
                let row = exec::query_optional(conn, &compiled.count)
                    .await
                    .map_err(|source| QueryError::Execution {
                        sql: compiled.count.sql.clone(),
                        source,
                    })?;
                row.as_ref()
                    .and_then(|r| r.values().next())
                    .and_then(count_of)
                    .unwrap_or(0)
            }
        };

        Ok(QueryResults::new(
            self.model.clone(),
            rows,
            total,
            self.args.effective_page(),
            self.args.effective_per_page(),
        ))
    }
}
