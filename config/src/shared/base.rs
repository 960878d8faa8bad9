use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// No seed table was requested.
    #[error("`sync.tables` must name at least one table")]
    NoRequestedTables,
    /// A seed table was requested with a limit of zero rows.
    #[error("`sync.tables` entry `{0}` must request at least one row")]
    ZeroRowLimit(String),
    /// The same seed table is listed twice.
    #[error("`sync.tables` lists `{0}` more than once")]
    DuplicateTable(String),
    /// A seed table entry has an empty name.
    #[error("`sync.tables` contains an empty table name")]
    EmptyTableName,
    /// The primary key column name is empty.
    #[error("`sync.primary_key_column` cannot be empty")]
    EmptyPrimaryKeyColumn,
    /// The id chunk size used for read queries is zero.
    #[error("`sync.batch.max_ids_per_query` cannot be zero")]
    MaxIdsPerQueryZero,
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("invalid TLS config for `{0}`: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts(&'static str),
    /// Source and destination speak different SQL dialects.
    #[error("source engine `{source_engine}` does not match destination engine `{destination_engine}`")]
    EngineMismatch {
        source_engine: &'static str,
        destination_engine: &'static str,
    },
}
