//! Copies a referentially consistent subset of one database into another.
//!
//! Loads configuration, initializes tracing, starts the async runtime and runs a single sync.
//! The process exits with a non-zero status when the sync fails.

use clap::Parser;
use ::config::shared::SubsetterConfig;
use telemetry::tracing::init_tracing;
use tracing::error;

use crate::cli::Args;
use crate::config::load_subsetter_config;
use crate::core::start_subsetter_with_config;

mod cli;
mod config;
mod core;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subsetter_config = load_subsetter_config(&args)?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(subsetter_config, args.dry_run))?;

    Ok(())
}

async fn async_main(subsetter_config: SubsetterConfig, dry_run: bool) -> anyhow::Result<()> {
    if let Err(err) = start_subsetter_with_config(subsetter_config, dry_run).await {
        error!("{err:#}");
        return Err(err);
    }

    Ok(())
}
