use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory, relative to the working directory, searched by [`load_config`].
const CONFIGURATION_DIR: &str = "configuration";

/// Accepted file extensions for each layer, in lookup order.
const FILE_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Name of the layer every environment builds on.
const BASE_LAYER: &str = "base";

/// Environment overrides look like `APP_SYNC__RESET_TABLES=true` or `APP_SOURCE__HOST=db`.
const ENV_PREFIX: &str = "APP";
const ENV_PREFIX_SEPARATOR: &str = "_";
const ENV_NESTING_SEPARATOR: &str = "__";

/// Errors raised while locating, parsing or deserializing configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("cannot resolve the working directory: {0}")]
    WorkingDirectory(#[source] io::Error),

    #[error("`{0}` is not a configuration directory")]
    NotADirectory(PathBuf),

    #[error("no `{layer}` configuration in `{directory}`, looked for {candidates}")]
    MissingLayer {
        layer: &'static str,
        directory: PathBuf,
        candidates: String,
    },

    #[error("invalid `{layer}` configuration in `{path}`: {source}")]
    InvalidLayer {
        layer: &'static str,
        path: PathBuf,
        #[source]
        source: rust_cli_config::ConfigError,
    },

    #[error("invalid environment variable override: {0}")]
    Overrides(#[source] rust_cli_config::ConfigError),

    #[error("configuration does not have the expected shape: {0}")]
    Shape(#[source] rust_cli_config::ConfigError),

    #[error(transparent)]
    Environment(#[from] io::Error),
}

/// Loads configuration from `./configuration`, see [`load_config_from`].
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    let working_dir = std::env::current_dir().map_err(LoadConfigError::WorkingDirectory)?;

    load_config_from(&working_dir.join(CONFIGURATION_DIR))
}

/// Loads configuration from `directory`.
///
/// Layers, later ones winning: `base.{yaml,yml,json}`, then the file named after the
/// environment selected by `APP_ENVIRONMENT` (`dev.yaml` by default), then `APP_` environment
/// variables with `__` between nested keys. Both files must exist.
pub fn load_config_from<T>(directory: &Path) -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::NotADirectory(directory.to_path_buf()));
    }

    let environment = Environment::load()?;

    let mut builder = rust_cli_config::Config::builder();
    for layer in [BASE_LAYER, environment.as_str()] {
        let path = locate_layer(directory, layer)?;
        builder = builder.add_source(rust_cli_config::File::from(path.as_path()));

        // Parse errors are reported against the file that introduced them.
        if let Err(source) = builder.build_cloned() {
            return Err(LoadConfigError::InvalidLayer {
                layer,
                path,
                source,
            });
        }
    }

    let overrides = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_NESTING_SEPARATOR);

    builder
        .add_source(overrides)
        .build()
        .map_err(LoadConfigError::Overrides)?
        .try_deserialize()
        .map_err(LoadConfigError::Shape)
}

fn locate_layer(directory: &Path, layer: &'static str) -> Result<PathBuf, LoadConfigError> {
    let candidates =
        FILE_EXTENSIONS.map(|extension| directory.join(format!("{layer}.{extension}")));

    if let Some(path) = candidates.iter().find(|candidate| candidate.is_file()) {
        return Ok(path.clone());
    }

    Err(LoadConfigError::MissingLayer {
        layer,
        directory: directory.to_path_buf(),
        candidates: candidates
            .iter()
            .map(|candidate| format!("`{}`", candidate.display()))
            .collect::<Vec<_>>()
            .join(", "),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde::Deserialize;

    use super::*;
    use crate::shared::{SeedTable, SyncConfig};

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        sync: SampleSync,
    }

    #[derive(Debug, Deserialize)]
    struct SampleSync {
        limit: u64,
        reset: bool,
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let directory =
            std::env::temp_dir().join(format!("config-load-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&directory);
        fs::create_dir_all(&directory).unwrap();

        directory
    }

    #[test]
    fn missing_directory_is_reported() {
        let err =
            load_config_from::<Sample>(Path::new("/definitely/not/a/config/dir")).unwrap_err();

        assert!(matches!(err, LoadConfigError::NotADirectory(_)));
    }

    #[test]
    fn environment_layer_overrides_base() {
        let directory = scratch_dir("layers");
        let environment = Environment::load().unwrap();
        fs::write(
            directory.join("base.yaml"),
            "name: base\nsync:\n  limit: 10\n  reset: false\n",
        )
        .unwrap();
        fs::write(
            directory.join(format!("{environment}.yml")),
            "sync:\n  limit: 20\n",
        )
        .unwrap();

        let sample = load_config_from::<Sample>(&directory).unwrap();

        assert_eq!(sample.name, "base");
        assert_eq!(sample.sync.limit, 20);
        assert!(!sample.sync.reset);

        fs::remove_dir_all(&directory).unwrap();
    }

    #[test]
    fn seed_table_names_keep_their_case() {
        #[derive(Debug, Deserialize)]
        struct Seeds {
            sync: SyncConfig,
        }

        let directory = scratch_dir("seed-case");
        let environment = Environment::load().unwrap();
        fs::write(
            directory.join("base.yaml"),
            "sync:\n  tables:\n    - name: OrderItems\n      limit: 2\n",
        )
        .unwrap();
        fs::write(directory.join(format!("{environment}.yaml")), "{}\n").unwrap();

        let seeds = load_config_from::<Seeds>(&directory).unwrap();

        assert_eq!(seeds.sync.tables, vec![SeedTable::new("OrderItems", 2)]);

        fs::remove_dir_all(&directory).unwrap();
    }

    #[test]
    fn environment_layer_is_required() {
        let directory = scratch_dir("missing-layer");
        fs::write(directory.join("base.json"), r#"{"name": "base"}"#).unwrap();

        let err = load_config_from::<Sample>(&directory).unwrap_err();

        assert!(matches!(err, LoadConfigError::MissingLayer { layer, .. } if layer != BASE_LAYER));

        fs::remove_dir_all(&directory).unwrap();
    }
}
