use std::collections::{HashMap, HashSet};

/// Integer primary key of a row.
pub type RowId = i64;

/// Set of primary keys selected from one table.
pub type RowIdSet = HashSet<RowId>;

/// Primary keys selected for copying, per table.
///
/// Sets only ever grow. A table can be present with an empty set, meaning it is known to the
/// run but nothing is needed from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRowSet {
    tables: HashMap<String, RowIdSet>,
}

impl TableRowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set with an empty entry for each of `tables`.
    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row_set = Self::new();
        for table in tables {
            row_set.ensure_table(table);
        }

        row_set
    }

    /// Registers `table` with an empty set if it is not present yet.
    pub fn ensure_table(&mut self, table: impl Into<String>) {
        self.tables.entry(table.into()).or_default();
    }

    /// Adds `ids` to the set of `table` and returns how many of them were new.
    pub fn insert_ids<I>(&mut self, table: &str, ids: I) -> usize
    where
        I: IntoIterator<Item = RowId>,
    {
        let set = self.tables.entry(table.to_owned()).or_default();

        ids.into_iter().filter(|id| set.insert(*id)).count()
    }

    pub fn get(&self, table: &str) -> Option<&RowIdSet> {
        self.tables.get(table)
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Returns the ids of `table` in ascending order, or an empty vector for unknown tables.
    pub fn sorted_ids(&self, table: &str) -> Vec<RowId> {
        let mut ids: Vec<RowId> = self
            .tables
            .get(table)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();

        ids
    }

    /// Returns the tables with at least one selected row, sorted by name.
    pub fn non_empty_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self
            .tables
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(table, _)| table.clone())
            .collect();
        tables.sort();

        tables
    }

    /// Total number of selected rows across every table.
    pub fn total_rows(&self) -> usize {
        self.tables.values().map(HashSet::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RowIdSet)> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
