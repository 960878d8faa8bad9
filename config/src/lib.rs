//! Configuration types and loading for the subsetting tools.
//!
//! Holds the connection and sync settings shared by the `subset` library and the `subsetter`
//! binary, together with the layered file/environment loader.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::Environment;
pub use load::{LoadConfigError, load_config, load_config_from};
pub use secret::SerializableSecretString;
