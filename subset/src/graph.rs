//! Mandatory dependencies between tables, derived from foreign keys.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::types::{DependencyEdge, ForeignKeyRelationship};

/// Adjacency of each child table to the parents it must have rows in.
///
/// Only non-nullable foreign keys are mandatory: a nullable reference can be left dangling on
/// the child side without breaking integrity, so it never pulls rows in. Self references are
/// dropped as well since a table cannot be ordered before itself.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<String, Vec<DependencyEdge>>,
    tables: BTreeSet<String>,
}

impl DependencyGraph {
    /// Builds the graph from the foreign keys of the source schema.
    ///
    /// Edges of a child keep the order of `relationships`. Tables without mandatory
    /// dependencies get no adjacency entry but are still listed by [`DependencyGraph::tables`].
    pub fn build(relationships: &[ForeignKeyRelationship]) -> Self {
        let mut graph = DependencyGraph::default();

        for relationship in relationships {
            graph.tables.insert(relationship.child_table.clone());
            graph.tables.insert(relationship.parent_table.clone());

            if relationship.is_self_reference() {
                debug!(%relationship, "skipping self-referencing foreign key");
                continue;
            }

            if relationship.nullable {
                debug!(%relationship, "skipping nullable foreign key");
                continue;
            }

            graph
                .edges
                .entry(relationship.child_table.clone())
                .or_default()
                .push(DependencyEdge {
                    parent_table: relationship.parent_table.clone(),
                    parent_column: relationship.parent_column.clone(),
                    child_column: relationship.child_column.clone(),
                });
        }

        graph
    }

    /// Returns the mandatory parents of `child_table`, empty if it has none.
    pub fn edges(&self, child_table: &str) -> &[DependencyEdge] {
        self.edges
            .get(child_table)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every table named by a relationship, including tables reached only through skipped ones.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    /// Number of mandatory edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(child: &str, column: &str, parent: &str, nullable: bool) -> ForeignKeyRelationship {
        ForeignKeyRelationship::new(child, column, parent, "id", nullable)
    }

    #[test]
    fn keeps_only_mandatory_edges() {
        let graph = DependencyGraph::build(&[
            fk("orders", "customer_id", "customers", false),
            fk("orders", "coupon_id", "coupons", true),
            fk("employees", "manager_id", "employees", false),
        ]);

        assert_eq!(
            graph.edges("orders"),
            &[DependencyEdge {
                parent_table: "customers".to_owned(),
                parent_column: "id".to_owned(),
                child_column: "customer_id".to_owned(),
            }]
        );
        assert!(graph.edges("employees").is_empty());
        assert!(graph.edges("customers").is_empty());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn lists_every_named_table() {
        let graph = DependencyGraph::build(&[
            fk("orders", "coupon_id", "coupons", true),
            fk("order_items", "order_id", "orders", false),
        ]);

        assert_eq!(
            graph.tables().collect::<Vec<_>>(),
            vec!["coupons", "order_items", "orders"]
        );
    }

    #[test]
    fn keeps_relationship_order_per_child() {
        let graph = DependencyGraph::build(&[
            fk("order_items", "order_id", "orders", false),
            fk("order_items", "product_id", "products", false),
        ]);

        let parents: Vec<_> = graph
            .edges("order_items")
            .iter()
            .map(|edge| edge.parent_table.as_str())
            .collect();
        assert_eq!(parents, vec!["orders", "products"]);
    }

    #[test]
    fn empty_input_builds_empty_graph() {
        let graph = DependencyGraph::build(&[]);

        assert_eq!(graph.tables().count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }
}
