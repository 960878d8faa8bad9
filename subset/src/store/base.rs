use std::future::Future;

use crate::error::SubsetResult;
use crate::types::{ForeignKeyRelationship, RowId, TableRows};

/// Read access to the database rows are copied from.
///
/// Implementations must only read. Row ids are integer primary keys stored in a column that has
/// the same name in every table.
pub trait SourceStore {
    /// Returns the name of the store, used in logs.
    fn name() -> &'static str;

    /// Lists every single-column foreign key of the source schema.
    fn list_foreign_key_relationships(
        &self,
    ) -> impl Future<Output = SubsetResult<Vec<ForeignKeyRelationship>>> + Send;

    /// Returns up to `limit` primary keys of `table`, in ascending order.
    fn fetch_ids(
        &self,
        table: &str,
        limit: u64,
    ) -> impl Future<Output = SubsetResult<Vec<RowId>>> + Send;

    /// Returns the distinct non-null values of `column` among the rows of `table` whose primary
    /// key is in `ids`.
    ///
    /// With `column` being a foreign key, these are exactly the parent ids the rows reference.
    fn fetch_distinct_column_values(
        &self,
        table: &str,
        column: &str,
        ids: &[RowId],
    ) -> impl Future<Output = SubsetResult<Vec<RowId>>> + Send;

    /// Returns every column of the rows of `table` whose primary key is in `ids`, ordered by
    /// primary key.
    fn fetch_rows_by_ids(
        &self,
        table: &str,
        ids: &[RowId],
    ) -> impl Future<Output = SubsetResult<TableRows>> + Send;
}

/// Write access to the database rows are copied into.
///
/// The destination is assumed to have the same schema as the source.
pub trait DestinationStore {
    /// Returns the name of the store, used in logs.
    fn name() -> &'static str;

    /// Removes every row of `table`.
    fn truncate_table(&self, table: &str) -> impl Future<Output = SubsetResult<()>> + Send;

    /// Inserts `table_rows` into `table`.
    ///
    /// An empty batch is a no-op. A row whose primary key already exists fails the write.
    fn write_table_rows(
        &self,
        table: &str,
        table_rows: TableRows,
    ) -> impl Future<Output = SubsetResult<()>> + Send;

    /// Suspends referential integrity enforcement for the current session.
    ///
    /// The default implementation is a no-op for stores without such a switch.
    fn disable_constraint_checks(&self) -> impl Future<Output = SubsetResult<()>> + Send {
        async { Ok(()) }
    }

    /// Restores referential integrity enforcement after
    /// [`DestinationStore::disable_constraint_checks`].
    fn enable_constraint_checks(&self) -> impl Future<Output = SubsetResult<()>> + Send {
        async { Ok(()) }
    }
}
