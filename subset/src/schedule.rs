//! Ordering of the copy so that parents are always written before their children.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, SubsetResult};
use crate::graph::DependencyGraph;

/// Orders `tables` so that every table comes after the tables it mandatorily references.
///
/// Runs Kahn's algorithm over the edges of `graph` whose both endpoints are in `tables`; edges
/// to tables outside the list impose nothing. Several edges between the same pair of tables
/// count once. Among tables that are ready at the same time the one with the smallest name is
/// emitted first, so the order is deterministic.
///
/// Fails with [`ErrorKind::DependencyCycle`] when some tables cannot be ordered, naming them.
pub fn schedule_copy(graph: &DependencyGraph, tables: &[String]) -> SubsetResult<Vec<String>> {
    let members: HashSet<&str> = tables.iter().map(String::as_str).collect();

    let mut in_degree: HashMap<&str, usize> = members.iter().map(|table| (*table, 0)).collect();
    let mut dependents: HashMap<&str, BTreeSet<&str>> = HashMap::new();

    for child in &members {
        let parents: HashSet<&str> = graph
            .edges(child)
            .iter()
            .map(|edge| edge.parent_table.as_str())
            .filter(|parent| members.contains(parent))
            .collect();

        for parent in parents {
            if let Some(degree) = in_degree.get_mut(child) {
                *degree += 1;
            }
            dependents.entry(parent).or_default().insert(*child);
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(table, _)| *table)
        .collect();
    let mut order = Vec::with_capacity(members.len());

    while let Some(table) = ready.pop_first() {
        order.push(table.to_owned());

        let Some(children) = dependents.get(table) else {
            continue;
        };

        for child in children {
            if let Some(degree) = in_degree.get_mut(child) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*child);
                }
            }
        }
    }

    if order.len() < members.len() {
        let scheduled: HashSet<&str> = order.iter().map(String::as_str).collect();
        let unscheduled: BTreeSet<&str> = members
            .iter()
            .copied()
            .filter(|table| !scheduled.contains(table))
            .collect();

        bail!(
            ErrorKind::DependencyCycle,
            "Tables cannot be ordered because their mandatory foreign keys form a cycle",
            unscheduled.into_iter().collect::<Vec<_>>().join(", ")
        );
    }

    debug!(order = ?order, "scheduled copy order");

    Ok(order)
}
