//! Copying the selected rows, table by table, into the destination.

use serde::Serialize;
use tracing::info;

use crate::error::{ErrorKind, SubsetError, SubsetResult};
use crate::store::{DestinationStore, SourceStore};
use crate::subset_error;
use crate::types::TableRowSet;

/// Number of rows copied into one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCopyReport {
    pub table: String,
    pub rows_copied: usize,
}

/// Outcome of a completed copy, in copy order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub tables: Vec<TableCopyReport>,
}

impl SyncReport {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|table| table.rows_copied).sum()
    }
}

/// Copies the rows of `row_sets` for each table of `copy_order`, in that order.
///
/// With `reset_tables` each destination table is emptied right before it is written. The first
/// failure stops the copy; tables copied before it stay in the destination.
pub async fn copy_tables<S, D>(
    source: &S,
    destination: &D,
    copy_order: &[String],
    row_sets: &TableRowSet,
    reset_tables: bool,
) -> SubsetResult<SyncReport>
where
    S: SourceStore,
    D: DestinationStore,
{
    let mut report = SyncReport::default();

    for table in copy_order {
        if reset_tables {
            destination
                .truncate_table(table)
                .await
                .map_err(|err| transfer_error(ErrorKind::DestinationTruncateFailed, table, err))?;
        }

        let ids = row_sets.sorted_ids(table);
        let table_rows = source
            .fetch_rows_by_ids(table, &ids)
            .await
            .map_err(|err| transfer_error(ErrorKind::SourceFetchFailed, table, err))?;
        let rows_copied = table_rows.len();

        destination
            .write_table_rows(table, table_rows)
            .await
            .map_err(|err| transfer_error(ErrorKind::DestinationInsertFailed, table, err))?;

        info!(table, rows = rows_copied, "copied table");

        report.tables.push(TableCopyReport {
            table: table.clone(),
            rows_copied,
        });
    }

    Ok(report)
}

fn transfer_error(kind: ErrorKind, table: &str, err: SubsetError) -> SubsetError {
    let description = match kind {
        ErrorKind::DestinationTruncateFailed => "Failed to truncate destination table",
        ErrorKind::SourceFetchFailed => "Failed to fetch rows from source table",
        _ => "Failed to insert rows into destination table",
    };

    subset_error!(kind, description, format!("table {table}"), source: err)
}
