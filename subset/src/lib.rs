//! Referentially consistent subsetting of relational databases.
//!
//! A run starts from a few seed tables with row limits and copies those rows together with every
//! row they transitively depend on through non-nullable foreign keys. It happens in three pure
//! steps followed by the copy:
//!
//! 1. [`graph::DependencyGraph`] keeps the mandatory child to parent edges of the schema.
//! 2. [`closure::compute_closure`] walks those edges from the seed rows and collects the ids of
//!    every required parent row.
//! 3. [`schedule::schedule_copy`] orders the tables so parents are written before children.
//! 4. [`transfer::copy_tables`] reads the rows from the source and inserts them into the
//!    destination, table by table.
//!
//! [`sync::SubsetSync`] ties the steps together over a [`store::SourceStore`] and a
//! [`store::DestinationStore`].

pub mod closure;
pub mod error;
pub mod graph;
mod macros;
pub mod schedule;
pub mod store;
pub mod sync;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transfer;
pub mod types;
