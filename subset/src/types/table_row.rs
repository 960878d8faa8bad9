use crate::types::cell::Cell;

/// A complete row of a table, with values in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    values: Vec<Cell>,
}

impl TableRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Cell> {
        self.values
    }
}

/// Rows fetched from one table together with the names of their columns.
///
/// Every row holds exactly one value per column name, in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRows {
    pub column_names: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl TableRows {
    pub fn new(column_names: Vec<String>, rows: Vec<TableRow>) -> Self {
        Self { column_names, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the position of `column` in every row.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.column_names.iter().position(|name| name == column)
    }
}
