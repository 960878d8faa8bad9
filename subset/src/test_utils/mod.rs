//! Helpers for testing subsetting runs against in-memory stores.

pub mod fixtures;
