//! Discovery of every row the requested rows transitively depend on.

use std::collections::{BTreeMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::error::{ErrorKind, SubsetError, SubsetResult};
use crate::graph::DependencyGraph;
use crate::store::SourceStore;
use crate::subset_error;
use crate::types::TableRowSet;

/// Computes the ids of every row needed for the requested rows to be referentially complete.
///
/// Each requested table is seeded with up to its limit of ids in ascending primary key order.
/// Tables are then walked breadth first along mandatory edges: the parent ids referenced by a
/// table's current rows are merged into the parent's set, and the parent is queued again only
/// when its set grew and it is not queued already. Sets only grow and are bounded by the source
/// row counts, so the walk terminates.
///
/// The result has an entry for every table in `graph` and every requested table, empty when
/// nothing is needed from it. Any query failure aborts the computation.
pub async fn compute_closure<S>(
    source: &S,
    graph: &DependencyGraph,
    requested_tables: &BTreeMap<String, u64>,
) -> SubsetResult<TableRowSet>
where
    S: SourceStore,
{
    let mut row_sets = TableRowSet::with_tables(graph.tables());
    let mut queue = VecDeque::with_capacity(requested_tables.len());
    let mut enqueued = HashSet::with_capacity(requested_tables.len());

    for (table, limit) in requested_tables {
        row_sets.ensure_table(table.as_str());

        let ids = source.fetch_ids(table, *limit).await.map_err(|err| {
            closure_error(
                "Failed to seed requested table",
                format!("table {table}"),
                err,
            )
        })?;
        let seeded = row_sets.insert_ids(table, ids);

        info!(table, limit, rows = seeded, "seeded requested table");

        if enqueued.insert(table.clone()) {
            queue.push_back(table.clone());
        }
    }

    let mut processed = 0usize;
    while let Some(table) = queue.pop_front() {
        enqueued.remove(&table);
        processed += 1;

        let edges = graph.edges(&table);
        if edges.is_empty() {
            continue;
        }

        let child_ids = row_sets.sorted_ids(&table);
        if child_ids.is_empty() {
            debug!(table, "no rows selected, nothing to propagate");
            continue;
        }

        for edge in edges {
            let parent_ids = source
                .fetch_distinct_column_values(&table, &edge.child_column, &child_ids)
                .await
                .map_err(|err| {
                    closure_error(
                        "Failed to fetch referenced parent ids",
                        edge.describe(&table),
                        err,
                    )
                })?;
            let added = row_sets.insert_ids(&edge.parent_table, parent_ids);

            debug!(
                table,
                parent_table = edge.parent_table,
                child_column = edge.child_column,
                added,
                "propagated parent ids"
            );

            if added > 0 && enqueued.insert(edge.parent_table.clone()) {
                queue.push_back(edge.parent_table.clone());
            }
        }
    }

    info!(
        tables = row_sets.non_empty_tables().len(),
        rows = row_sets.total_rows(),
        processed,
        "computed dependency closure"
    );

    Ok(row_sets)
}

fn closure_error(description: &'static str, detail: String, err: SubsetError) -> SubsetError {
    subset_error!(ErrorKind::ClosureQueryFailed, description, detail, source: err)
}
