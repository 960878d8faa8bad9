use anyhow::Context;
use config::shared::{
    ConnectionConfig, DatabaseEngine, IntoConnectOptions, SubsetterConfig, SyncConfig,
};
use sqlx::Executor;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use subset::store::mysql::{self, MySqlStore};
use subset::store::postgres::{self, PgStore};
use subset::store::{DestinationStore, SourceStore};
use subset::sync::{SubsetSync, SyncPlan, SyncRequest};
use subset::transfer::SyncReport;
use tracing::{debug, info, warn};

/// Connections used to read from the source. Reads are issued one at a time.
const SOURCE_MAX_CONNECTIONS: u32 = 2;

/// The destination uses a single connection so session settings apply to every write.
const DESTINATION_MAX_CONNECTIONS: u32 = 1;

/// Pool options for a MySQL destination.
///
/// The connection is never reaped, and any replacement connection starts with foreign key checks
/// off when `suspend_fk_checks` is set, so the session setting survives reconnects.
fn mysql_destination_pool_options(suspend_fk_checks: bool) -> MySqlPoolOptions {
    let options = MySqlPoolOptions::new()
        .max_connections(DESTINATION_MAX_CONNECTIONS)
        .max_lifetime(None)
        .idle_timeout(None);

    if !suspend_fk_checks {
        return options;
    }

    options.after_connect(|conn, _meta| {
        Box::pin(async move {
            if let Err(err) = conn.execute(mysql::DISABLE_FOREIGN_KEY_CHECKS).await {
                warn!(error = %err, "cannot disable constraint checks on a destination connection");
            }

            Ok(())
        })
    })
}

/// Pool options for a Postgres destination, see [`mysql_destination_pool_options`].
fn pg_destination_pool_options(suspend_fk_checks: bool) -> PgPoolOptions {
    let options = PgPoolOptions::new()
        .max_connections(DESTINATION_MAX_CONNECTIONS)
        .max_lifetime(None)
        .idle_timeout(None);

    if !suspend_fk_checks {
        return options;
    }

    options.after_connect(|conn, _meta| {
        Box::pin(async move {
            if let Err(err) = conn.execute(postgres::DISABLE_FOREIGN_KEY_CHECKS).await {
                warn!(error = %err, "cannot disable constraint checks on a destination connection");
            }

            Ok(())
        })
    })
}

/// Connects to both databases and runs a single sync.
pub async fn start_subsetter_with_config(
    subsetter_config: SubsetterConfig,
    dry_run: bool,
) -> anyhow::Result<()> {
    info!(dry_run, "starting subsetter");

    log_config(&subsetter_config);

    let SubsetterConfig {
        source,
        destination,
        sync,
    } = subsetter_config;
    let suspend_fk_checks = sync.disable_fk_checks && !dry_run;

    match source.engine {
        DatabaseEngine::Mysql => {
            let source_pool = MySqlPoolOptions::new()
                .max_connections(SOURCE_MAX_CONNECTIONS)
                .connect_with(IntoConnectOptions::<MySqlConnectOptions>::with_db(&source))
                .await
                .context("failed to connect to the source database")?;
            let destination_pool = mysql_destination_pool_options(suspend_fk_checks)
                .connect_with(IntoConnectOptions::<MySqlConnectOptions>::with_db(
                    &destination,
                ))
                .await
                .context("failed to connect to the destination database")?;

            run_sync(
                MySqlStore::from_config(source_pool, &sync),
                MySqlStore::from_config(destination_pool, &sync),
                &sync,
                dry_run,
            )
            .await?;
        }
        DatabaseEngine::Postgres => {
            let source_pool = PgPoolOptions::new()
                .max_connections(SOURCE_MAX_CONNECTIONS)
                .connect_with(IntoConnectOptions::<PgConnectOptions>::with_db(&source))
                .await
                .context("failed to connect to the source database")?;
            let destination_pool = pg_destination_pool_options(suspend_fk_checks)
                .connect_with(IntoConnectOptions::<PgConnectOptions>::with_db(&destination))
                .await
                .context("failed to connect to the destination database")?;

            run_sync(
                PgStore::from_config(source_pool, source.schema_name(), &sync),
                PgStore::from_config(destination_pool, destination.schema_name(), &sync),
                &sync,
                dry_run,
            )
            .await?;
        }
    }

    info!("subsetter finished");

    Ok(())
}

/// Introspects the source, then plans the subset and, unless `dry_run`, copies it.
///
/// With `disable_fk_checks` the destination checks are suspended around the copy. Failing to
/// suspend or restore them is logged and does not stop the run; restoring is attempted even
/// when the copy fails.
pub async fn run_sync<S, D>(
    source: S,
    destination: D,
    sync_config: &SyncConfig,
    dry_run: bool,
) -> anyhow::Result<Option<SyncReport>>
where
    S: SourceStore,
    D: DestinationStore,
{
    let relationships = source.list_foreign_key_relationships().await?;
    info!(count = relationships.len(), "fetched foreign keys");

    let sync = SubsetSync::new(source, destination, &relationships);
    let request = SyncRequest::from(sync_config);

    if dry_run {
        let plan = sync.plan(&request).await?;
        log_plan(&plan);

        return Ok(None);
    }

    let checks_disabled = sync_config.disable_fk_checks
        && match sync.destination().disable_constraint_checks().await {
            Ok(()) => {
                info!("disabled constraint checks on the destination");
                true
            }
            Err(err) => {
                warn!(error = %err, "cannot disable constraint checks on the destination");
                false
            }
        };

    let result = sync.run(&request).await;

    if checks_disabled {
        match sync.destination().enable_constraint_checks().await {
            Ok(()) => info!("re-enabled constraint checks on the destination"),
            Err(err) => {
                warn!(error = %err, "cannot re-enable constraint checks on the destination")
            }
        }
    }

    let report = result?;
    info!(
        report = %serde_json::to_string(&report)?,
        rows = report.total_rows(),
        "subset copied"
    );

    Ok(Some(report))
}

fn log_plan(plan: &SyncPlan) {
    for (table, rows) in plan.table_sizes() {
        info!(table, rows, "dry run, would copy table");
    }

    info!(
        tables = plan.copy_order.len(),
        rows = plan.total_rows(),
        "dry run finished, destination left untouched"
    );
}

fn log_config(config: &SubsetterConfig) {
    log_connection_config("source", &config.source);
    log_connection_config("destination", &config.destination);

    let sync = &config.sync;
    debug!(
        tables = ?sync.tables,
        reset_tables = sync.reset_tables,
        disable_fk_checks = sync.disable_fk_checks,
        primary_key_column = sync.primary_key_column,
        max_ids_per_query = sync.batch.max_ids_per_query,
        "using sync config"
    );
}

fn log_connection_config(role: &str, config: &ConnectionConfig) {
    let ConnectionConfig {
        engine,
        host,
        port,
        name,
        username,
        password: _,
        schema: _,
        tls,
    } = config;

    debug!(
        role,
        engine = engine.as_str(),
        host,
        port,
        name,
        username,
        schema = config.schema_name(),
        tls_enabled = tls.enabled,
        "using connection config"
    );
}
