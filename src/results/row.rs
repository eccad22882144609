use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::types::{ColumnMetadata, RowValues};

/// Column descriptors of a result, with a name lookup built once and shared by every row.
#[derive(Debug, Clone, Default)]
pub struct ResultColumns {
    metadata: Vec<ColumnMetadata>,
    index: HashMap<String, usize>,
}

impl ResultColumns {
    #[must_use]
    pub fn new(metadata: Vec<ColumnMetadata>) -> Self {
        let mut index = HashMap::with_capacity(metadata.len());
        for (i, column) in metadata.iter().enumerate() {
            // First occurrence wins for duplicate names, as with positional SQL results.
            index.entry(column.name.clone()).or_insert(i);
        }
        Self { metadata, index }
    }

    #[must_use]
    pub fn metadata(&self) -> &[ColumnMetadata] {
        &self.metadata
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.metadata.iter().map(|c| c.name.as_str()).collect()
    }

    /// Case-sensitive lookup, falling back to a case-insensitive match.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied().or_else(|| {
            self.metadata
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(name))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

/// A row from a query result
///
/// Values are positional; the column descriptors are shared with the rest of the result.
#[derive(Debug, Clone)]
pub struct CustomDbRow {
    pub columns: Arc<ResultColumns>,
    pub values: Vec<RowValues>,
}

impl CustomDbRow {
    #[must_use]
    pub fn new(columns: Arc<ResultColumns>, values: Vec<RowValues>) -> Self {
        Self { columns, values }
    }

    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.columns.position(column_name)
    }

    /// Get a value from the row by column name
    ///
    /// # Returns
    ///
    /// The value at the column, or None if the column wasn't found
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    /// The row as a JSON object keyed by column name, the shape the remote client hands out.
    #[must_use]
    pub fn to_json_object(&self) -> JsonValue {
        let mut object = Map::with_capacity(self.values.len());
        for (column, value) in self.columns.metadata().iter().zip(&self.values) {
            object.insert(column.name.clone(), value.to_json());
        }
        JsonValue::Object(object)
    }

    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.values
    }
}
