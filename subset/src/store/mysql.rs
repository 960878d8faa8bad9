use config::shared::SyncConfig;
use sqlx::mysql::MySqlRow;
use sqlx::query_builder::Separated;
use sqlx::{Column, MySql, MySqlPool, QueryBuilder, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::error::{ErrorKind, SubsetError, SubsetResult};
use crate::store::base::{DestinationStore, SourceStore};
use crate::store::sql::{batch_rows, id_list, rows_per_statement};
use crate::subset_error;
use crate::types::{Cell, ForeignKeyRelationship, RowId, TableRow, TableRows};

/// Single-column foreign keys of the current database, with the nullability of the child column.
///
/// `information_schema` columns are cast to `char` since some server versions report them as
/// binary strings.
const FOREIGN_KEYS_QUERY: &str = r#"
    select
        cast(kcu.table_name as char) as child_table,
        cast(kcu.column_name as char) as child_column,
        cast(kcu.referenced_table_name as char) as parent_table,
        cast(kcu.referenced_column_name as char) as parent_column,
        cast(c.is_nullable as char) as is_nullable
    from information_schema.key_column_usage kcu
    join information_schema.columns c
        on c.table_schema = kcu.table_schema
        and c.table_name = kcu.table_name
        and c.column_name = kcu.column_name
    where kcu.referenced_table_name is not null
        and kcu.table_schema = database()
    order by kcu.table_name, kcu.column_name
"#;

/// Session statement suspending foreign key enforcement.
pub const DISABLE_FOREIGN_KEY_CHECKS: &str = "set foreign_key_checks = 0";

/// Session statement restoring foreign key enforcement.
pub const ENABLE_FOREIGN_KEY_CHECKS: &str = "set foreign_key_checks = 1";

/// Quotes a MySQL identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// MySQL store backed by a sqlx pool.
///
/// Used as source it only reads. Used as destination it should run on a pool with a single
/// connection so that [`DestinationStore::disable_constraint_checks`] applies to every write.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    primary_key_column: String,
    max_ids_per_query: usize,
}

impl MySqlStore {
    pub fn new(
        pool: MySqlPool,
        primary_key_column: impl Into<String>,
        max_ids_per_query: usize,
    ) -> Self {
        Self {
            pool,
            primary_key_column: primary_key_column.into(),
            max_ids_per_query: max_ids_per_query.max(1),
        }
    }

    pub fn from_config(pool: MySqlPool, config: &SyncConfig) -> Self {
        Self::new(
            pool,
            config.primary_key_column.clone(),
            config.batch.max_ids_per_query,
        )
    }
}

impl SourceStore for MySqlStore {
    fn name() -> &'static str {
        "mysql"
    }

    async fn list_foreign_key_relationships(&self) -> SubsetResult<Vec<ForeignKeyRelationship>> {
        let rows = sqlx::query(FOREIGN_KEYS_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| {
                subset_error!(
                    ErrorKind::MetadataQueryFailed,
                    "Failed to list foreign keys",
                    source: err
                )
            })?;

        let mut relationships = Vec::with_capacity(rows.len());
        for row in rows {
            let is_nullable: String = row.try_get("is_nullable")?;

            relationships.push(ForeignKeyRelationship {
                child_table: row.try_get("child_table")?,
                child_column: row.try_get("child_column")?,
                parent_table: row.try_get("parent_table")?,
                parent_column: row.try_get("parent_column")?,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
            });
        }

        debug!(count = relationships.len(), "listed foreign keys");

        Ok(relationships)
    }

    async fn fetch_ids(&self, table: &str, limit: u64) -> SubsetResult<Vec<RowId>> {
        let query = select_ids_query(table, &self.primary_key_column);

        let ids = sqlx::query_scalar::<_, i64>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn fetch_distinct_column_values(
        &self,
        table: &str,
        column: &str,
        ids: &[RowId],
    ) -> SubsetResult<Vec<RowId>> {
        let mut values = Vec::new();

        for chunk in ids.chunks(self.max_ids_per_query) {
            let query = distinct_values_query(table, column, &self.primary_key_column, chunk);

            let chunk_values = sqlx::query_scalar::<_, i64>(&query)
                .fetch_all(&self.pool)
                .await?;
            values.extend(chunk_values);
        }

        values.sort_unstable();
        values.dedup();

        Ok(values)
    }

    async fn fetch_rows_by_ids(&self, table: &str, ids: &[RowId]) -> SubsetResult<TableRows> {
        let mut table_rows = TableRows::default();

        for chunk in ids.chunks(self.max_ids_per_query) {
            let query = select_rows_query(table, &self.primary_key_column, chunk);

            let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
            if table_rows.column_names.is_empty()
                && let Some(first) = rows.first()
            {
                table_rows.column_names = first
                    .columns()
                    .iter()
                    .map(|column| column.name().to_owned())
                    .collect();
            }

            for row in &rows {
                table_rows.rows.push(decode_row(row)?);
            }
        }

        Ok(table_rows)
    }
}

impl DestinationStore for MySqlStore {
    fn name() -> &'static str {
        "mysql"
    }

    async fn truncate_table(&self, table: &str) -> SubsetResult<()> {
        let query = format!("truncate table {}", quote_identifier(table));
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|err| SubsetError::from(err).for_destination())?;

        Ok(())
    }

    async fn write_table_rows(&self, table: &str, table_rows: TableRows) -> SubsetResult<()> {
        if table_rows.is_empty() {
            return Ok(());
        }

        let batch_size = rows_per_statement(table_rows.column_names.len());
        let TableRows { column_names, rows } = table_rows;

        for batch in batch_rows(rows, batch_size) {
            let mut builder = insert_statement(table, &column_names, batch);
            builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|err| SubsetError::from(err).for_destination())?;
        }

        Ok(())
    }

    async fn disable_constraint_checks(&self) -> SubsetResult<()> {
        sqlx::query(DISABLE_FOREIGN_KEY_CHECKS)
            .execute(&self.pool)
            .await
            .map_err(|err| SubsetError::from(err).for_destination())?;

        Ok(())
    }

    async fn enable_constraint_checks(&self) -> SubsetResult<()> {
        sqlx::query(ENABLE_FOREIGN_KEY_CHECKS)
            .execute(&self.pool)
            .await
            .map_err(|err| SubsetError::from(err).for_destination())?;

        Ok(())
    }
}

fn select_ids_query(table: &str, primary_key_column: &str) -> String {
    let primary_key = quote_identifier(primary_key_column);

    format!(
        "select cast({primary_key} as signed) from {} order by {primary_key} limit ?",
        quote_identifier(table)
    )
}

fn distinct_values_query(
    table: &str,
    column: &str,
    primary_key_column: &str,
    ids: &[RowId],
) -> String {
    let column = quote_identifier(column);

    format!(
        "select distinct cast({column} as signed) from {} where {} in ({}) and {column} is not null",
        quote_identifier(table),
        quote_identifier(primary_key_column),
        id_list(ids)
    )
}

fn select_rows_query(table: &str, primary_key_column: &str, ids: &[RowId]) -> String {
    let primary_key = quote_identifier(primary_key_column);

    format!(
        "select * from {} where {primary_key} in ({}) order by {primary_key}",
        quote_identifier(table),
        id_list(ids)
    )
}

/// Builds one multi-row insert for `rows`, binding every non-null cell.
fn insert_statement<'args>(
    table: &str,
    column_names: &[String],
    rows: Vec<TableRow>,
) -> QueryBuilder<'args, MySql> {
    let columns = column_names
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");

    let mut builder =
        QueryBuilder::new(format!("insert into {} ({columns}) ", quote_identifier(table)));
    builder.push_values(rows, |mut separated, row| {
        for cell in row.into_values() {
            push_cell(&mut separated, cell);
        }
    });

    builder
}

fn push_cell<'args>(separated: &mut Separated<'_, 'args, MySql, &'static str>, cell: Cell) {
    match cell {
        Cell::Null => separated.push("null"),
        Cell::Bool(value) => separated.push_bind(value),
        Cell::I16(value) => separated.push_bind(value),
        Cell::I32(value) => separated.push_bind(value),
        Cell::I64(value) => separated.push_bind(value),
        Cell::U64(value) => separated.push_bind(value),
        Cell::F32(value) => separated.push_bind(value),
        Cell::F64(value) => separated.push_bind(value),
        Cell::Numeric(value) => separated.push_bind(value),
        Cell::String(value) => separated.push_bind(value),
        Cell::Bytes(value) => separated.push_bind(value),
        Cell::Json(value) => separated.push_bind(value),
        Cell::Date(value) => separated.push_bind(value),
        Cell::Time(value) => separated.push_bind(value),
        Cell::Timestamp(value) => separated.push_bind(value),
        Cell::TimestampTz(value) => separated.push_bind(value),
        Cell::Uuid(value) => separated.push_bind(value.to_string()),
    };
}

fn decode_row(row: &MySqlRow) -> SubsetResult<TableRow> {
    let values = (0..row.columns().len())
        .map(|index| decode_cell(row, index))
        .collect::<SubsetResult<Vec<_>>>()?;

    Ok(TableRow::new(values))
}

/// How a column is read, derived from the type name sqlx reports for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    SignedInteger,
    UnsignedInteger,
    Year,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    DateTime,
    Timestamp,
    Json,
    Text,
    Binary,
    Other,
}

/// Maps a sqlx MySQL type name to the way its values are decoded.
///
/// `BOOLEAN` is how sqlx reports `tinyint(1)`, which may hold any tiny integer, so it is read as
/// an integer to copy values other than 0 and 1 unchanged.
fn column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            ColumnKind::SignedInteger
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => ColumnKind::UnsignedInteger,
        "YEAR" => ColumnKind::Year,
        "FLOAT" => ColumnKind::Float,
        "DOUBLE" => ColumnKind::Double,
        "DECIMAL" => ColumnKind::Decimal,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "DATETIME" => ColumnKind::DateTime,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "JSON" => ColumnKind::Json,
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            ColumnKind::Text
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            ColumnKind::Binary
        }
        _ => ColumnKind::Other,
    }
}

/// Decodes a column by its kind, falling back to text and then raw bytes.
fn decode_cell(row: &MySqlRow, index: usize) -> SubsetResult<Cell> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Cell::Null);
    }

    let type_name = row.columns()[index].type_info().name();
    let cell = match column_kind(type_name) {
        ColumnKind::SignedInteger => Cell::I64(row.try_get(index)?),
        ColumnKind::UnsignedInteger => Cell::U64(row.try_get(index)?),
        ColumnKind::Year => Cell::I32(i32::from(row.try_get_unchecked::<u16, _>(index)?)),
        ColumnKind::Float => Cell::F32(row.try_get(index)?),
        ColumnKind::Double => Cell::F64(row.try_get(index)?),
        ColumnKind::Decimal => Cell::Numeric(row.try_get(index)?),
        ColumnKind::Date => Cell::Date(row.try_get(index)?),
        ColumnKind::Time => Cell::Time(row.try_get(index)?),
        ColumnKind::DateTime => Cell::Timestamp(row.try_get(index)?),
        ColumnKind::Timestamp => Cell::TimestampTz(row.try_get(index)?),
        ColumnKind::Json => Cell::Json(row.try_get(index)?),
        ColumnKind::Text => Cell::String(row.try_get(index)?),
        ColumnKind::Binary => Cell::Bytes(row.try_get(index)?),
        ColumnKind::Other => match row.try_get_unchecked::<String, _>(index) {
            Ok(value) => Cell::String(value),
            Err(_) => {
                debug!(type_name, "decoding column as raw bytes");
                Cell::Bytes(row.try_get_unchecked(index)?)
            }
        },
    };

    Ok(cell)
}
