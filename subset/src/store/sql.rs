//! Statement building shared by the SQL stores.

use crate::types::{RowId, TableRow};

/// Bind parameters a single statement may carry, in both MySQL and Postgres.
pub(crate) const MAX_BIND_PARAMETERS: usize = 65_535;

/// Renders ids as a comma separated list of integer literals for an `in (...)` clause.
///
/// Ids are integers, so rendering them inline cannot inject anything and keeps the statement
/// free of bind parameters.
pub(crate) fn id_list(ids: &[RowId]) -> String {
    ids.iter()
        .map(RowId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Number of rows one insert statement can carry for `column_count` columns.
pub(crate) fn rows_per_statement(column_count: usize) -> usize {
    (MAX_BIND_PARAMETERS / column_count.max(1)).max(1)
}

/// Splits `rows` into batches of at most `batch_size` rows, keeping their order.
///
/// Everything fits into a single batch unless the bind parameter limit forces a split.
pub(crate) fn batch_rows(rows: Vec<TableRow>, batch_size: usize) -> Vec<Vec<TableRow>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(rows.len().div_ceil(batch_size));
    let mut rows = rows.into_iter().peekable();

    while rows.peek().is_some() {
        batches.push(rows.by_ref().take(batch_size).collect());
    }

    batches
}
