use std::fmt;

use serde::Serialize;

/// A single-column foreign key discovered in the source schema.
///
/// `child_table.child_column` references `parent_table.parent_column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ForeignKeyRelationship {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
    /// Whether the child column accepts `NULL`.
    pub nullable: bool,
}

impl ForeignKeyRelationship {
    pub fn new(
        child_table: impl Into<String>,
        child_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
        nullable: bool,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            child_column: child_column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
            nullable,
        }
    }

    /// Returns `true` when the relationship points back at its own table.
    pub fn is_self_reference(&self) -> bool {
        self.child_table == self.parent_table
    }
}

impl fmt::Display for ForeignKeyRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.child_table, self.child_column, self.parent_table, self.parent_column
        )
    }
}

/// A mandatory dependency of a child table on a parent table.
///
/// Only non-nullable, non-self-referencing relationships become edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub parent_table: String,
    pub parent_column: String,
    pub child_column: String,
}

impl DependencyEdge {
    /// Renders the edge as `child.column -> parent.column` for logs and error details.
    pub fn describe(&self, child_table: &str) -> String {
        format!(
            "{child_table}.{} -> {}.{}",
            self.child_column, self.parent_table, self.parent_column
        )
    }
}
