//! End to end subsetting: plan the closure and order, then copy it.

use std::collections::BTreeMap;

use config::shared::SyncConfig;
use tracing::info;

use crate::closure::compute_closure;
use crate::error::SubsetResult;
use crate::graph::DependencyGraph;
use crate::schedule::schedule_copy;
use crate::store::{DestinationStore, SourceStore};
use crate::transfer::{SyncReport, copy_tables};
use crate::types::{ForeignKeyRelationship, TableRowSet};

/// Seed tables and how the destination should be treated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// Tables to sample and the maximum number of rows taken from each.
    pub requested_tables: BTreeMap<String, u64>,
    /// Empties every copied destination table before writing it.
    pub reset_tables: bool,
}

impl SyncRequest {
    pub fn new<I, S>(requested_tables: I, reset_tables: bool) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            requested_tables: requested_tables
                .into_iter()
                .map(|(table, limit)| (table.into(), limit))
                .collect(),
            reset_tables,
        }
    }
}

impl From<&SyncConfig> for SyncRequest {
    fn from(config: &SyncConfig) -> Self {
        Self {
            requested_tables: config
                .tables
                .iter()
                .map(|table| (table.name.clone(), table.limit))
                .collect(),
            reset_tables: config.reset_tables,
        }
    }
}

/// Rows to copy and the order to copy their tables in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub row_sets: TableRowSet,
    /// Tables with at least one selected row, parents first.
    pub copy_order: Vec<String>,
}

impl SyncPlan {
    /// Returns `(table, rows)` pairs in copy order.
    pub fn table_sizes(&self) -> Vec<(&str, usize)> {
        self.copy_order
            .iter()
            .map(|table| {
                let rows = self.row_sets.get(table).map_or(0, |ids| ids.len());
                (table.as_str(), rows)
            })
            .collect()
    }

    pub fn total_rows(&self) -> usize {
        self.row_sets.total_rows()
    }
}

/// Copies a referentially complete subset of a source database into a destination.
///
/// Nothing is written before the whole plan is known: closure and ordering failures leave the
/// destination untouched. Every store call is awaited before the next one is issued.
#[derive(Debug)]
pub struct SubsetSync<S, D> {
    source: S,
    destination: D,
    graph: DependencyGraph,
}

impl<S, D> SubsetSync<S, D>
where
    S: SourceStore,
    D: DestinationStore,
{
    /// Creates a sync over the foreign keys of the source schema.
    pub fn new(source: S, destination: D, relationships: &[ForeignKeyRelationship]) -> Self {
        let graph = DependencyGraph::build(relationships);

        info!(
            source = S::name(),
            destination = D::name(),
            relationships = relationships.len(),
            mandatory_edges = graph.edge_count(),
            "built dependency graph"
        );

        Self {
            source,
            destination,
            graph,
        }
    }

    /// Computes the rows to copy and the copy order without touching the destination.
    pub async fn plan(&self, request: &SyncRequest) -> SubsetResult<SyncPlan> {
        let row_sets = compute_closure(&self.source, &self.graph, &request.requested_tables).await?;
        let copy_order = schedule_copy(&self.graph, &row_sets.non_empty_tables())?;

        info!(
            tables = copy_order.len(),
            rows = row_sets.total_rows(),
            "planned subset"
        );

        Ok(SyncPlan {
            row_sets,
            copy_order,
        })
    }

    /// Copies a previously computed plan.
    pub async fn execute(&self, plan: &SyncPlan, reset_tables: bool) -> SubsetResult<SyncReport> {
        for (table, rows) in plan.table_sizes() {
            info!(table, rows, "scheduled table copy");
        }

        let report = copy_tables(
            &self.source,
            &self.destination,
            &plan.copy_order,
            &plan.row_sets,
            reset_tables,
        )
        .await?;

        info!(
            tables = report.tables.len(),
            rows = report.total_rows(),
            "copied subset"
        );

        Ok(report)
    }

    /// Plans and copies the subset described by `request`.
    pub async fn run(&self, request: &SyncRequest) -> SubsetResult<SyncReport> {
        let plan = self.plan(request).await?;
        self.execute(&plan, request.reset_tables).await
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }
}
