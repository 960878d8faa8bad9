use config::shared::SubsetterConfig;
use config::{load_config, load_config_from};

use crate::cli::Args;

/// Loads the configuration, applies command line overrides and validates the result.
pub fn load_subsetter_config(args: &Args) -> anyhow::Result<SubsetterConfig> {
    let mut config = match &args.config_dir {
        Some(directory) => load_config_from::<SubsetterConfig>(directory)?,
        None => load_config::<SubsetterConfig>()?,
    };

    args.apply_overrides(&mut config.sync);
    config.validate()?;

    Ok(config)
}
