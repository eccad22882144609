use std::sync::Arc;

use super::row::{CustomDbRow, ResultColumns};
use crate::types::{ColumnMetadata, RowValues};

/// A fully materialized query result
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    /// Rows returned for a query, rows changed for an update
    pub rows_affected: usize,
    columns: Arc<ResultColumns>,
}

impl ResultSet {
    #[must_use]
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self::with_capacity(columns, 0)
    }

    #[must_use]
    pub fn with_capacity(columns: Vec<ColumnMetadata>, capacity: usize) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
            rows_affected: 0,
            columns: Arc::new(ResultColumns::new(columns)),
        }
    }

    /// An update's outcome: no columns, no rows.
    #[must_use]
    pub fn from_update_count(count: u64) -> Self {
        Self {
            rows_affected: usize::try_from(count).unwrap_or(usize::MAX),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnMetadata] {
        self.columns.metadata()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.names()
    }

    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        self.results
            .push(CustomDbRow::new(Arc::clone(&self.columns), values));
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Positional rows, dropping the shared column descriptors.
    #[must_use]
    pub fn into_rows(self) -> Vec<Vec<RowValues>> {
        self.results.into_iter().map(CustomDbRow::into_values).collect()
    }

    #[must_use]
    pub fn to_json_objects(&self) -> Vec<serde_json::Value> {
        self.results.iter().map(CustomDbRow::to_json_object).collect()
    }
}
