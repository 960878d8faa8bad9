use std::path::PathBuf;

use clap::Parser;
use config::shared::{SeedTable, SyncConfig};

/// Copies a referentially consistent subset of a source database into a destination database.
#[derive(Debug, Parser)]
#[command(name = "subsetter", version, about)]
pub struct Args {
    /// Directory holding the `base` and environment configuration files.
    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Computes and logs the rows to copy without writing to the destination.
    #[arg(long)]
    pub dry_run: bool,

    /// Empties every copied destination table before writing it.
    #[arg(long)]
    pub reset_tables: bool,

    /// Seed table and maximum row count, e.g. `--table events:1000`. Can be repeated and
    /// replaces the configured tables.
    #[arg(long = "table", value_name = "NAME:LIMIT")]
    pub tables: Vec<SeedTable>,
}

impl Args {
    /// Overrides the configured sync settings with the ones given on the command line.
    pub fn apply_overrides(&self, sync: &mut SyncConfig) {
        if !self.tables.is_empty() {
            sync.tables = self.tables.clone();
        }

        if self.reset_tables {
            sync.reset_tables = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use config::shared::BatchConfig;

    use super::*;

    fn sync_config() -> SyncConfig {
        SyncConfig {
            tables: vec![SeedTable::new("events", 1000)],
            reset_tables: false,
            disable_fk_checks: true,
            primary_key_column: "id".to_owned(),
            batch: BatchConfig::default(),
        }
    }

    #[test]
    fn rejects_malformed_table_arguments() {
        assert!(Args::try_parse_from(["subsetter", "--table", "events"]).is_err());
        assert!(Args::try_parse_from(["subsetter", "--table", "events:many"]).is_err());
    }

    #[test]
    fn command_line_tables_replace_configured_ones() {
        let args = Args::parse_from([
            "subsetter",
            "--table",
            "Orders:5",
            "--table",
            "companies:2",
            "--reset-tables",
        ]);
        let mut sync = sync_config();

        args.apply_overrides(&mut sync);

        assert_eq!(
            sync.tables,
            vec![SeedTable::new("Orders", 5), SeedTable::new("companies", 2)]
        );
        assert!(sync.reset_tables);
        assert!(sync.disable_fk_checks);
    }

    #[test]
    fn no_overrides_keep_configuration() {
        let args = Args::parse_from(["subsetter", "--dry-run"]);
        let mut sync = sync_config();

        args.apply_overrides(&mut sync);

        assert!(args.dry_run);
        assert_eq!(sync.tables, sync_config().tables);
        assert!(!sync.reset_tables);
    }
}
