use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use config::shared::SyncConfig;
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, SubsetError, SubsetResult};
use crate::store::base::{DestinationStore, SourceStore};
use crate::subset_error;
use crate::types::{Cell, ForeignKeyRelationship, RowId, TableRow, TableRows};

/// Operations of [`MemoryStore`] that can be made to fail with [`MemoryStore::fail_on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    ListForeignKeyRelationships,
    FetchIds,
    FetchDistinctColumnValues,
    FetchRowsByIds,
    TruncateTable,
    WriteTableRows,
    DisableConstraintChecks,
    EnableConstraintChecks,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    column_names: Vec<String>,
    rows: BTreeMap<RowId, TableRow>,
}

#[derive(Debug)]
struct Inner {
    tables: HashMap<String, MemoryTable>,
    relationships: Vec<ForeignKeyRelationship>,
    failures: HashSet<(Option<String>, StoreOperation)>,
    constraint_checks_enabled: bool,
    operations: Vec<(StoreOperation, Option<String>)>,
}

impl Inner {
    fn record(&mut self, operation: StoreOperation, table: Option<&str>) -> SubsetResult<()> {
        let table = table.map(str::to_owned);
        self.operations.push((operation, table.clone()));

        if self.failures.contains(&(table.clone(), operation)) {
            bail!(
                ErrorKind::Unknown,
                "Injected store failure",
                format!("{operation:?} on {}", table.as_deref().unwrap_or("store"))
            );
        }

        Ok(())
    }

    fn table(&self, table: &str) -> SubsetResult<&MemoryTable> {
        self.tables.get(table).ok_or_else(|| {
            subset_error!(ErrorKind::SourceQueryFailed, "Table not found", table)
        })
    }

    fn table_mut(&mut self, table: &str) -> SubsetResult<&mut MemoryTable> {
        self.tables.get_mut(table).ok_or_else(|| {
            subset_error!(ErrorKind::DestinationQueryFailed, "Table not found", table)
        })
    }

    /// Checks that every mandatory reference of `rows` points at an existing parent row.
    ///
    /// References between rows of the same batch are accepted.
    fn check_references(
        &self,
        table: &str,
        column_names: &[String],
        rows: &BTreeMap<RowId, TableRow>,
    ) -> SubsetResult<()> {
        for relationship in self
            .relationships
            .iter()
            .filter(|relationship| relationship.child_table == table)
        {
            let Some(index) = column_names
                .iter()
                .position(|name| *name == relationship.child_column)
            else {
                continue;
            };

            for row in rows.values() {
                let Some(parent_id) = row.values()[index].as_row_id() else {
                    continue;
                };

                let parent_exists = self
                    .tables
                    .get(&relationship.parent_table)
                    .is_some_and(|parent| parent.rows.contains_key(&parent_id))
                    || (relationship.is_self_reference() && rows.contains_key(&parent_id));

                if !parent_exists {
                    bail!(
                        ErrorKind::DestinationQueryFailed,
                        "Foreign key constraint violated",
                        format!("{relationship} references missing id {parent_id}")
                    );
                }
            }
        }

        Ok(())
    }
}

/// In-memory tables implementing both [`SourceStore`] and [`DestinationStore`].
///
/// Rows are keyed by their integer primary key. While constraint checks are enabled, writes that
/// reference a missing parent row are rejected the way a database would reject them, which
/// makes copy order observable in tests. Any operation can be made to fail with
/// [`MemoryStore::fail_on`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    primary_key_column: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_primary_key_column(SyncConfig::DEFAULT_PRIMARY_KEY_COLUMN)
    }

    pub fn with_primary_key_column(primary_key_column: impl Into<String>) -> Self {
        let inner = Inner {
            tables: HashMap::new(),
            relationships: Vec::new(),
            failures: HashSet::new(),
            constraint_checks_enabled: true,
            operations: Vec::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            primary_key_column: primary_key_column.into(),
        }
    }

    /// Creates an empty table, replacing any table with the same name.
    pub async fn create_table(&self, table: &str, column_names: &[&str]) {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(
            table.to_owned(),
            MemoryTable {
                column_names: column_names.iter().map(|name| name.to_string()).collect(),
                rows: BTreeMap::new(),
            },
        );
    }

    /// Declares a foreign key, reported by the source side and enforced on writes.
    pub async fn add_relationship(&self, relationship: ForeignKeyRelationship) {
        let mut inner = self.inner.lock().await;
        inner.relationships.push(relationship);
    }

    /// Inserts rows directly, bypassing constraint checks and failure injection.
    pub async fn insert_rows(&self, table: &str, rows: Vec<Vec<Cell>>) -> SubsetResult<()> {
        let mut inner = self.inner.lock().await;
        let memory_table = inner.table_mut(table)?;

        for values in rows {
            let row = TableRow::new(values);
            let id = row_id(&self.primary_key_column, &memory_table.column_names, &row)?;
            memory_table.rows.insert(id, row);
        }

        Ok(())
    }

    /// Returns a store with the same tables and relationships but no rows.
    pub async fn empty_copy(&self) -> MemoryStore {
        let inner = self.inner.lock().await;
        let store = MemoryStore::with_primary_key_column(self.primary_key_column.clone());

        {
            let mut copy = store.inner.lock().await;
            copy.relationships = inner.relationships.clone();
            for (name, table) in &inner.tables {
                copy.tables.insert(
                    name.clone(),
                    MemoryTable {
                        column_names: table.column_names.clone(),
                        rows: BTreeMap::new(),
                    },
                );
            }
        }

        store
    }

    /// Makes every later `operation` on `table` fail.
    pub async fn fail_on(&self, table: &str, operation: StoreOperation) {
        let mut inner = self.inner.lock().await;
        inner.failures.insert((Some(table.to_owned()), operation));
    }

    /// Makes every later table-independent `operation` fail.
    pub async fn fail_on_store(&self, operation: StoreOperation) {
        let mut inner = self.inner.lock().await;
        inner.failures.insert((None, operation));
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.lock().await;
        inner.failures.clear();
    }

    /// Returns the rows of `table` ordered by primary key.
    pub async fn table_rows(&self, table: &str) -> Option<TableRows> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).map(|memory_table| {
            TableRows::new(
                memory_table.column_names.clone(),
                memory_table.rows.values().cloned().collect(),
            )
        })
    }

    /// Returns the primary keys of `table` in ascending order.
    pub async fn row_ids(&self, table: &str) -> Vec<RowId> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table)
            .map(|memory_table| memory_table.rows.keys().copied().collect())
            .unwrap_or_default()
    }

    pub async fn constraint_checks_enabled(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.constraint_checks_enabled
    }

    /// Returns every operation issued against the store, in order.
    pub async fn operations(&self) -> Vec<(StoreOperation, Option<String>)> {
        let inner = self.inner.lock().await;
        inner.operations.clone()
    }

    /// Returns the tables rows were written to, in write order.
    pub async fn written_tables(&self) -> Vec<String> {
        self.operations()
            .await
            .into_iter()
            .filter(|(operation, _)| *operation == StoreOperation::WriteTableRows)
            .filter_map(|(_, table)| table)
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn row_id(
    primary_key_column: &str,
    column_names: &[String],
    row: &TableRow,
) -> SubsetResult<RowId> {
    let Some(index) = column_names
        .iter()
        .position(|name| name == primary_key_column)
    else {
        bail!(
            ErrorKind::InvalidData,
            "Table has no primary key column",
            primary_key_column
        );
    };

    match row.values().get(index).and_then(Cell::as_row_id) {
        Some(id) => Ok(id),
        None => bail!(
            ErrorKind::InvalidData,
            "Primary key is not an integer",
            format!("{:?}", row.values().get(index))
        ),
    }
}

impl SourceStore for MemoryStore {
    fn name() -> &'static str {
        "memory"
    }

    async fn list_foreign_key_relationships(&self) -> SubsetResult<Vec<ForeignKeyRelationship>> {
        let mut inner = self.inner.lock().await;
        inner.record(StoreOperation::ListForeignKeyRelationships, None)?;

        Ok(inner.relationships.clone())
    }

    async fn fetch_ids(&self, table: &str, limit: u64) -> SubsetResult<Vec<RowId>> {
        let mut inner = self.inner.lock().await;
        inner.record(StoreOperation::FetchIds, Some(table))?;

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(inner.table(table)?.rows.keys().take(limit).copied().collect())
    }

    async fn fetch_distinct_column_values(
        &self,
        table: &str,
        column: &str,
        ids: &[RowId],
    ) -> SubsetResult<Vec<RowId>> {
        let mut inner = self.inner.lock().await;
        inner.record(StoreOperation::FetchDistinctColumnValues, Some(table))?;

        let memory_table = inner.table(table)?;
        let Some(index) = memory_table
            .column_names
            .iter()
            .position(|name| name == column)
        else {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Column not found",
                format!("{table}.{column}")
            );
        };

        let mut values = Vec::new();
        for id in ids {
            let Some(row) = memory_table.rows.get(id) else {
                continue;
            };

            match &row.values()[index] {
                Cell::Null => {}
                cell => match cell.as_row_id() {
                    Some(value) => values.push(value),
                    None => bail!(
                        ErrorKind::ConversionError,
                        "Referencing column is not an integer",
                        format!("{table}.{column} = {cell:?}")
                    ),
                },
            }
        }
        values.sort_unstable();
        values.dedup();

        Ok(values)
    }

    async fn fetch_rows_by_ids(&self, table: &str, ids: &[RowId]) -> SubsetResult<TableRows> {
        let mut inner = self.inner.lock().await;
        inner.record(StoreOperation::FetchRowsByIds, Some(table))?;

        let memory_table = inner.table(table)?;
        let ids: HashSet<RowId> = ids.iter().copied().collect();
        let rows = memory_table
            .rows
            .iter()
            .filter(|(id, _)| ids.contains(id))
            .map(|(_, row)| row.clone())
            .collect();

        Ok(TableRows::new(memory_table.column_names.clone(), rows))
    }
}

impl DestinationStore for MemoryStore {
    fn name() -> &'static str {
        "memory"
    }

    async fn truncate_table(&self, table: &str) -> SubsetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.record(StoreOperation::TruncateTable, Some(table))?;

        info!(table, "truncating table");
        inner.table_mut(table)?.rows.clear();

        Ok(())
    }

    async fn write_table_rows(&self, table: &str, table_rows: TableRows) -> SubsetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.record(StoreOperation::WriteTableRows, Some(table))?;

        if table_rows.is_empty() {
            return Ok(());
        }

        let column_names = inner
            .table(table)
            .map_err(SubsetError::for_destination)?
            .column_names
            .clone();
        let positions = table_rows
            .column_names
            .iter()
            .map(|name| {
                column_names.iter().position(|column| column == name).ok_or_else(|| {
                    subset_error!(
                        ErrorKind::DestinationQueryFailed,
                        "Column not found",
                        format!("{table}.{name}")
                    )
                })
            })
            .collect::<SubsetResult<Vec<_>>>()?;

        let mut batch = BTreeMap::new();
        for row in table_rows.rows {
            let mut values = vec![Cell::Null; column_names.len()];
            for (position, value) in positions.iter().zip(row.into_values()) {
                values[*position] = value;
            }

            let row = TableRow::new(values);
            let id = row_id(&self.primary_key_column, &column_names, &row)?;
            let exists = inner
                .tables
                .get(table)
                .is_some_and(|memory_table| memory_table.rows.contains_key(&id));
            if exists || batch.insert(id, row).is_some() {
                bail!(
                    ErrorKind::DestinationQueryFailed,
                    "Duplicate primary key",
                    format!("{table}.{} = {id}", self.primary_key_column)
                );
            }
        }

        if inner.constraint_checks_enabled {
            inner.check_references(table, &column_names, &batch)?;
        }

        info!(table, rows = batch.len(), "writing table rows");
        inner.table_mut(table)?.rows.extend(batch);

        Ok(())
    }

    async fn disable_constraint_checks(&self) -> SubsetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.record(StoreOperation::DisableConstraintChecks, None)?;
        inner.constraint_checks_enabled = false;

        Ok(())
    }

    async fn enable_constraint_checks(&self) -> SubsetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.record(StoreOperation::EnableConstraintChecks, None)?;
        inner.constraint_checks_enabled = true;

        Ok(())
    }
}
