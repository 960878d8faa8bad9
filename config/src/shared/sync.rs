use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// A seed table and the maximum number of rows taken from it.
///
/// Table names are values rather than map keys because the loader lowercases keys, which would
/// rename mixed-case tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SeedTable {
    pub name: String,
    pub limit: u64,
}

impl SeedTable {
    pub fn new(name: impl Into<String>, limit: u64) -> Self {
        Self {
            name: name.into(),
            limit,
        }
    }
}

impl fmt::Display for SeedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.limit)
    }
}

/// Parses `NAME:LIMIT`, splitting on the last colon.
impl FromStr for SeedTable {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((name, limit)) = value.rsplit_once(':') else {
            return Err(format!("expected `NAME:LIMIT`, got `{value}`"));
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing table name in `{value}`"));
        }

        let limit = limit
            .trim()
            .parse::<u64>()
            .map_err(|err| format!("invalid limit for table `{name}`: {err}"))?;

        Ok(SeedTable::new(name, limit))
    }
}

/// Settings for a single subsetting run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Seed tables and the maximum number of rows taken from each.
    pub tables: Vec<SeedTable>,
    /// Empties every copied destination table before inserting into it.
    #[serde(default)]
    pub reset_tables: bool,
    /// Suspends foreign key enforcement on the destination for the duration of the copy.
    #[serde(default = "default_disable_fk_checks")]
    pub disable_fk_checks: bool,
    /// Integer primary key column shared by every table.
    #[serde(default = "default_primary_key_column")]
    pub primary_key_column: String,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl SyncConfig {
    /// Default name of the primary key column.
    pub const DEFAULT_PRIMARY_KEY_COLUMN: &'static str = "id";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tables.is_empty() {
            return Err(ValidationError::NoRequestedTables);
        }

        let mut names = HashSet::with_capacity(self.tables.len());
        for table in &self.tables {
            if table.name.trim().is_empty() {
                return Err(ValidationError::EmptyTableName);
            }

            if table.limit == 0 {
                return Err(ValidationError::ZeroRowLimit(table.name.clone()));
            }

            if !names.insert(table.name.as_str()) {
                return Err(ValidationError::DuplicateTable(table.name.clone()));
            }
        }

        if self.primary_key_column.trim().is_empty() {
            return Err(ValidationError::EmptyPrimaryKeyColumn);
        }

        self.batch.validate()
    }
}

/// Bounds on the size of generated statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of ids rendered into a single `in (...)` list of a read query.
    #[serde(default = "default_max_ids_per_query")]
    pub max_ids_per_query: usize,
}

impl BatchConfig {
    pub const DEFAULT_MAX_IDS_PER_QUERY: usize = 10_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_ids_per_query == 0 {
            return Err(ValidationError::MaxIdsPerQueryZero);
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_ids_per_query: default_max_ids_per_query(),
        }
    }
}

fn default_disable_fk_checks() -> bool {
    true
}

fn default_primary_key_column() -> String {
    SyncConfig::DEFAULT_PRIMARY_KEY_COLUMN.to_owned()
}

fn default_max_ids_per_query() -> usize {
    BatchConfig::DEFAULT_MAX_IDS_PER_QUERY
}
