//! Logging setup shared by the subsetting binaries and test suites.

pub mod tracing;
