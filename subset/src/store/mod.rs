//! Access to the source and destination databases.
//!
//! [`base`] defines the read and write interfaces used by the core. [`mysql`] and [`postgres`]
//! implement them over sqlx pools and [`memory`] keeps tables in process for tests and dry runs.

pub mod base;
pub mod memory;
pub mod mysql;
pub mod postgres;
mod sql;

pub use base::{DestinationStore, SourceStore};
