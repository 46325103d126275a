//! One page of raw rows plus the total match count. Entities are built on access.

use crate::model::{Entity, ModelDef};
use crate::sql::Row;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct QueryResults {
    model: Arc<ModelDef>,
    rows: Vec<Row>,
    total_available: u64,
    page: u64,
    per_page: u64,
}

impl QueryResults {
    pub fn new(model: Arc<ModelDef>, rows: Vec<Row>, total_available: u64, page: u64, per_page: u64) -> Self {
        QueryResults {
            model,
            rows,
            total_available,
            page,
            per_page,
        }
    }

    /// Rows on this page.
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows matching the filter, ignoring paging.
    pub fn total_available(&self) -> u64 {
        self.total_available
    }

    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total_available.div_ceil(self.per_page)
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    /// Materialise the entity at `index`.
    pub fn get(&self, index: usize) -> Option<Entity> {
        self.rows
            .get(index)
            .map(|r| Entity::from_row(self.model.clone(), r.clone()))
    }

    pub fn raw(&self) -> &[Row] {
        &self.rows
    }

    pub fn iter(&self) -> Cursor<'_> {
        Cursor {
            results: self,
            position: 0,
        }
    }

    pub fn to_entities(&self) -> Vec<Entity> {
        self.iter().collect()
    }
}

/// Restartable position over a result page.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    results: &'a QueryResults,
    position: usize,
}

impl Cursor<'_> {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl Iterator for Cursor<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let item = self.results.get(self.position)?;
        self.position += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.results.len().saturating_sub(self.position);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Cursor<'_> {}

impl<'a> IntoIterator for &'a QueryResults {
    type Item = Entity;
    type IntoIter = Cursor<'a>;

    fn into_iter(self) -> Cursor<'a> {
        self.iter()
    }
}
