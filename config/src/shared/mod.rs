mod base;
mod connection;
mod subsetter;
mod sync;

pub use base::ValidationError;
pub use connection::{ConnectionConfig, DatabaseEngine, IntoConnectOptions, TlsConfig};
pub use subsetter::SubsetterConfig;
pub use sync::{BatchConfig, SeedTable, SyncConfig};
