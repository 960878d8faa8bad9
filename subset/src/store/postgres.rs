use bigdecimal::BigDecimal;
use config::shared::SyncConfig;
use pg_escape::quote_identifier;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, ValueRef};
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, SubsetError, SubsetResult};
use crate::store::base::{DestinationStore, SourceStore};
use crate::store::sql::{batch_rows, id_list, rows_per_statement};
use crate::subset_error;
use crate::types::{Cell, ForeignKeyRelationship, RowId, TableRow, TableRows};

/// Session statement suspending foreign key triggers.
pub const DISABLE_FOREIGN_KEY_CHECKS: &str = "set session_replication_role = replica";

/// Session statement restoring foreign key triggers.
pub const ENABLE_FOREIGN_KEY_CHECKS: &str = "set session_replication_role = origin";

/// Single-column foreign keys between tables of one schema.
///
/// Composite foreign keys are skipped. Nullability is that of the referencing column.
const FOREIGN_KEYS_QUERY: &str = r#"
    select
        child.relname::text as child_table,
        child_attr.attname::text as child_column,
        parent.relname::text as parent_table,
        parent_attr.attname::text as parent_column,
        not child_attr.attnotnull as nullable
    from pg_catalog.pg_constraint con
    join pg_catalog.pg_class child on child.oid = con.conrelid
    join pg_catalog.pg_namespace child_ns on child_ns.oid = child.relnamespace
    join pg_catalog.pg_class parent on parent.oid = con.confrelid
    join pg_catalog.pg_namespace parent_ns on parent_ns.oid = parent.relnamespace
    join pg_catalog.pg_attribute child_attr
        on child_attr.attrelid = con.conrelid and child_attr.attnum = con.conkey[1]
    join pg_catalog.pg_attribute parent_attr
        on parent_attr.attrelid = con.confrelid and parent_attr.attnum = con.confkey[1]
    where con.contype = 'f'
        and cardinality(con.conkey) = 1
        and child_ns.nspname = $1
        and parent_ns.nspname = $1
    order by child.relname, child_attr.attname
"#;

/// Writable columns of a table in attribute order.
///
/// Generated columns are left out since they cannot be inserted into.
const TABLE_COLUMNS_QUERY: &str = r#"
    select
        a.attname::text as column_name,
        pg_catalog.format_type(a.atttypid, a.atttypmod) as declared_type,
        t.typname::text as base_type,
        a.attidentity = 'a' as identity_always
    from pg_catalog.pg_attribute a
    join pg_catalog.pg_class c on c.oid = a.attrelid
    join pg_catalog.pg_namespace n on n.oid = c.relnamespace
    join pg_catalog.pg_type t on t.oid = a.atttypid
    where n.nspname = $1
        and c.relname = $2
        and a.attnum > 0
        and not a.attisdropped
        and a.attgenerated = ''
    order by a.attnum
"#;

/// How values of a built-in type are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Numeric,
    Text,
    Bytes,
    Json,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
}

/// Maps a catalog type name to its decoding, `None` for types read and written as text.
fn column_kind(base_type: &str) -> Option<ColumnKind> {
    let kind = match base_type {
        "bool" => ColumnKind::Bool,
        "int2" => ColumnKind::I16,
        "int4" => ColumnKind::I32,
        "int8" => ColumnKind::I64,
        "float4" => ColumnKind::F32,
        "float8" => ColumnKind::F64,
        "numeric" => ColumnKind::Numeric,
        "text" | "varchar" | "bpchar" | "name" => ColumnKind::Text,
        "bytea" => ColumnKind::Bytes,
        "json" | "jsonb" => ColumnKind::Json,
        "date" => ColumnKind::Date,
        "time" => ColumnKind::Time,
        "timestamp" => ColumnKind::Timestamp,
        "timestamptz" => ColumnKind::TimestampTz,
        "uuid" => ColumnKind::Uuid,
        _ => return None,
    };

    Some(kind)
}

/// A column as declared in the catalog.
///
/// Columns of other types than the built-in ones (enums, arrays, domains, `interval`, `inet`,
/// extension types) are selected as text and cast back to `declared_type` on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PgColumn {
    name: String,
    declared_type: String,
    kind: Option<ColumnKind>,
    identity_always: bool,
}

impl PgColumn {
    fn text_cast(&self) -> Option<&str> {
        match self.kind {
            Some(_) => None,
            None => Some(&self.declared_type),
        }
    }
}

/// Postgres store backed by a sqlx pool, scoped to one schema.
///
/// Constraint checks are toggled through `session_replication_role`, which suspends foreign key
/// triggers for the session. This requires a superuser and, like the MySQL store, a single
/// connection pool on the destination side.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: String,
    primary_key_column: String,
    max_ids_per_query: usize,
}

impl PgStore {
    pub fn new(
        pool: PgPool,
        schema: impl Into<String>,
        primary_key_column: impl Into<String>,
        max_ids_per_query: usize,
    ) -> Self {
        Self {
            pool,
            schema: schema.into(),
            primary_key_column: primary_key_column.into(),
            max_ids_per_query: max_ids_per_query.max(1),
        }
    }

    pub fn from_config(pool: PgPool, schema: impl Into<String>, config: &SyncConfig) -> Self {
        Self::new(
            pool,
            schema,
            config.primary_key_column.clone(),
            config.batch.max_ids_per_query,
        )
    }

    async fn table_columns(&self, table: &str) -> SubsetResult<Vec<PgColumn>> {
        let rows = sqlx::query(TABLE_COLUMNS_QUERY)
            .bind(&self.schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Table not found",
                qualified_name(&self.schema, table)
            );
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let base_type: String = row.try_get("base_type")?;

            columns.push(PgColumn {
                name: row.try_get("column_name")?,
                declared_type: row.try_get("declared_type")?,
                kind: column_kind(&base_type),
                identity_always: row.try_get("identity_always")?,
            });
        }

        Ok(columns)
    }
}

impl SourceStore for PgStore {
    fn name() -> &'static str {
        "postgres"
    }

    async fn list_foreign_key_relationships(&self) -> SubsetResult<Vec<ForeignKeyRelationship>> {
        let rows = sqlx::query(FOREIGN_KEYS_QUERY)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| {
                subset_error!(
                    ErrorKind::MetadataQueryFailed,
                    "Failed to list foreign keys",
                    format!("schema {}", self.schema),
                    source: err
                )
            })?;

        let mut relationships = Vec::with_capacity(rows.len());
        for row in rows {
            relationships.push(ForeignKeyRelationship {
                child_table: row.try_get("child_table")?,
                child_column: row.try_get("child_column")?,
                parent_table: row.try_get("parent_table")?,
                parent_column: row.try_get("parent_column")?,
                nullable: row.try_get("nullable")?,
            });
        }

        debug!(
            schema = self.schema,
            count = relationships.len(),
            "listed foreign keys"
        );

        Ok(relationships)
    }

    async fn fetch_ids(&self, table: &str, limit: u64) -> SubsetResult<Vec<RowId>> {
        let query = select_ids_query(&self.schema, table, &self.primary_key_column);

        let ids = sqlx::query_scalar::<_, i64>(&query)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
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
            let query = distinct_values_query(
                &self.schema,
                table,
                column,
                &self.primary_key_column,
                chunk,
            );

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
        let columns = self.table_columns(table).await?;
        let mut table_rows = TableRows::new(
            columns.iter().map(|column| column.name.clone()).collect(),
            Vec::new(),
        );

        for chunk in ids.chunks(self.max_ids_per_query) {
            let query = select_rows_query(
                &self.schema,
                table,
                &columns,
                &self.primary_key_column,
                chunk,
            );

            let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
            for row in &rows {
                table_rows.rows.push(decode_row(row, &columns)?);
            }
        }

        Ok(table_rows)
    }
}

impl DestinationStore for PgStore {
    fn name() -> &'static str {
        "postgres"
    }

    /// Deletes every row instead of truncating, since `truncate` refuses tables referenced by
    /// foreign keys even while their triggers are suspended.
    async fn truncate_table(&self, table: &str) -> SubsetResult<()> {
        let query = format!("delete from {}", qualified_name(&self.schema, table));
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

        let destination_columns = self
            .table_columns(table)
            .await
            .map_err(SubsetError::for_destination)?;
        let TableRows { column_names, rows } = table_rows;

        let mut casts = Vec::with_capacity(column_names.len());
        let mut overriding_system_value = false;
        for name in &column_names {
            let column = destination_columns
                .iter()
                .find(|column| column.name == *name);
            casts.push(column.and_then(PgColumn::text_cast).map(str::to_owned));
            overriding_system_value |= column.is_some_and(|column| column.identity_always);
        }

        let target = InsertTarget {
            schema: &self.schema,
            table,
            column_names: &column_names,
            casts: &casts,
            overriding_system_value,
        };
        let batch_size = rows_per_statement(column_names.len());

        for batch in batch_rows(rows, batch_size) {
            let mut builder = target.insert_statement(batch);
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

/// Returns `schema.table`, each part quoted when needed.
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

fn select_ids_query(schema: &str, table: &str, primary_key_column: &str) -> String {
    let primary_key = quote_identifier(primary_key_column);

    format!(
        "select {primary_key}::int8 from {} order by {primary_key} limit $1",
        qualified_name(schema, table)
    )
}

fn distinct_values_query(
    schema: &str,
    table: &str,
    column: &str,
    primary_key_column: &str,
    ids: &[RowId],
) -> String {
    let column = quote_identifier(column);

    format!(
        "select distinct {column}::int8 from {} where {} in ({}) and {column} is not null",
        qualified_name(schema, table),
        quote_identifier(primary_key_column),
        id_list(ids)
    )
}

fn select_rows_query(
    schema: &str,
    table: &str,
    columns: &[PgColumn],
    primary_key_column: &str,
    ids: &[RowId],
) -> String {
    let select_list = columns
        .iter()
        .map(|column| {
            let name = quote_identifier(&column.name);
            match column.kind {
                Some(_) => name.into_owned(),
                None => format!("{name}::text as {name}"),
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let primary_key = quote_identifier(primary_key_column);

    format!(
        "select {select_list} from {} where {primary_key} in ({}) order by {primary_key}",
        qualified_name(schema, table),
        id_list(ids)
    )
}

/// Destination table and column layout of a multi-row insert.
struct InsertTarget<'a> {
    schema: &'a str,
    table: &'a str,
    column_names: &'a [String],
    /// Declared type to cast each bound value to, for columns written as text.
    casts: &'a [Option<String>],
    /// Set when an `identity always` column is written, which Postgres otherwise refuses.
    overriding_system_value: bool,
}

impl InsertTarget<'_> {
    fn insert_statement<'args>(&self, rows: Vec<TableRow>) -> QueryBuilder<'args, Postgres> {
        let columns = self
            .column_names
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ");
        let overriding = if self.overriding_system_value {
            "overriding system value "
        } else {
            ""
        };

        let mut builder = QueryBuilder::new(format!(
            "insert into {} ({columns}) {overriding}",
            qualified_name(self.schema, self.table)
        ));
        builder.push_values(rows, |mut separated, row| {
            for (index, cell) in row.into_values().into_iter().enumerate() {
                let cast = self.casts.get(index).and_then(Option::as_deref);
                push_cell(&mut separated, cell, cast);
            }
        });

        builder
    }
}

fn push_cell<'args>(
    separated: &mut Separated<'_, 'args, Postgres, &'static str>,
    cell: Cell,
    cast: Option<&str>,
) {
    match cell {
        Cell::Null => {
            separated.push("null");
            return;
        }
        Cell::Bool(value) => separated.push_bind(value),
        Cell::I16(value) => separated.push_bind(value),
        Cell::I32(value) => separated.push_bind(value),
        Cell::I64(value) => separated.push_bind(value),
        // Postgres has no unsigned integers.
        Cell::U64(value) => match i64::try_from(value) {
            Ok(value) => separated.push_bind(value),
            Err(_) => separated.push_bind(BigDecimal::from(value)),
        },
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
        Cell::Uuid(value) => separated.push_bind(value),
    };

    if let Some(cast) = cast {
        separated.push_unseparated(format!("::{cast}"));
    }
}

fn decode_row(row: &PgRow, columns: &[PgColumn]) -> SubsetResult<TableRow> {
    let values = columns
        .iter()
        .enumerate()
        .map(|(index, column)| decode_cell(row, index, column.kind))
        .collect::<SubsetResult<Vec<_>>>()?;

    Ok(TableRow::new(values))
}

/// Decodes a built-in column by its kind; columns without one were selected as text.
fn decode_cell(row: &PgRow, index: usize, kind: Option<ColumnKind>) -> SubsetResult<Cell> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Cell::Null);
    }

    let Some(kind) = kind else {
        return Ok(Cell::String(row.try_get(index)?));
    };

    let cell = match kind {
        ColumnKind::Bool => Cell::Bool(row.try_get(index)?),
        ColumnKind::I16 => Cell::I16(row.try_get(index)?),
        ColumnKind::I32 => Cell::I32(row.try_get(index)?),
        ColumnKind::I64 => Cell::I64(row.try_get(index)?),
        ColumnKind::F32 => Cell::F32(row.try_get(index)?),
        ColumnKind::F64 => Cell::F64(row.try_get(index)?),
        ColumnKind::Numeric => Cell::Numeric(row.try_get(index)?),
        ColumnKind::Text => Cell::String(row.try_get(index)?),
        ColumnKind::Bytes => Cell::Bytes(row.try_get(index)?),
        ColumnKind::Json => Cell::Json(row.try_get(index)?),
        ColumnKind::Date => Cell::Date(row.try_get(index)?),
        ColumnKind::Time => Cell::Time(row.try_get(index)?),
        ColumnKind::Timestamp => Cell::Timestamp(row.try_get(index)?),
        ColumnKind::TimestampTz => Cell::TimestampTz(row.try_get(index)?),
        ColumnKind::Uuid => Cell::Uuid(row.try_get(index)?),
    };

    Ok(cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, declared_type: &str, base_type: &str) -> PgColumn {
        PgColumn {
            name: name.to_owned(),
            declared_type: declared_type.to_owned(),
            kind: column_kind(base_type),
            identity_always: false,
        }
    }

    #[test]
    fn qualifies_and_quotes_table_names() {
        assert_eq!(qualified_name("public", "orders"), "public.orders");
        assert_eq!(qualified_name("Sales", "orders"), "\"Sales\".orders");
        assert_eq!(
            qualified_name("public", "order items"),
            "public.\"order items\""
        );
    }

    #[test]
    fn builds_id_queries() {
        assert_eq!(
            select_ids_query("public", "OrderItems", "id"),
            "select id::int8 from public.\"OrderItems\" order by id limit $1"
        );
        assert_eq!(
            distinct_values_query("public", "orders", "customer_id", "id", &[100, 101]),
            "select distinct customer_id::int8 from public.orders where id in (100,101) and customer_id is not null"
        );
    }

    #[test]
    fn selects_other_types_as_text() {
        let columns = vec![
            column("id", "bigint", "int8"),
            column("mood", "public.mood", "mood"),
            column("tags", "integer[]", "_int4"),
            column("placed_at", "timestamp with time zone", "timestamptz"),
        ];

        assert_eq!(
            select_rows_query("public", "orders", &columns, "id", &[1, 2]),
            "select id, mood::text as mood, tags::text as tags, placed_at from public.orders where id in (1,2) order by id"
        );
    }

    #[test]
    fn insert_casts_text_values_and_overrides_identity() {
        let column_names = vec!["id".to_owned(), "mood".to_owned()];
        let casts = vec![None, Some("public.mood".to_owned())];
        let target = InsertTarget {
            schema: "public",
            table: "orders",
            column_names: &column_names,
            casts: &casts,
            overriding_system_value: true,
        };
        let rows = vec![
            TableRow::new(vec![Cell::I64(1), Cell::String("happy".to_owned())]),
            TableRow::new(vec![Cell::I64(2), Cell::Null]),
        ];

        let builder = target.insert_statement(rows);

        assert_eq!(
            builder.sql(),
            "insert into public.orders (id, mood) overriding system value VALUES ($1, $2::public.mood), ($3, null)"
        );
    }

    #[test]
    fn plain_insert_has_no_override() {
        let column_names = vec!["id".to_owned()];
        let casts = vec![None];
        let target = InsertTarget {
            schema: "public",
            table: "regions",
            column_names: &column_names,
            casts: &casts,
            overriding_system_value: false,
        };

        let builder = target.insert_statement(vec![TableRow::new(vec![Cell::I64(1)])]);

        assert_eq!(builder.sql(), "insert into public.regions (id) VALUES ($1)");
    }

    #[test]
    fn maps_catalog_types() {
        assert_eq!(column_kind("bpchar"), Some(ColumnKind::Text));
        assert_eq!(column_kind("int8"), Some(ColumnKind::I64));
        assert_eq!(column_kind("interval"), None);
        assert_eq!(column_kind("_int4"), None);
        assert_eq!(column("mood", "public.mood", "mood").text_cast(), Some("public.mood"));
        assert_eq!(column("id", "bigint", "int8").text_cast(), None);
    }
}
