use std::collections::{BTreeMap, HashSet};

use subset::closure::compute_closure;
use subset::graph::DependencyGraph;
use subset::schedule::schedule_copy;
use subset::store::memory::{MemoryStore, StoreOperation};
use subset::test_utils::fixtures::fk;
use subset::types::{Cell, ForeignKeyRelationship, RowId, TableRowSet};
use telemetry::tracing::init_test_tracing;

/// Marketplace schema with a diamond on `vendors`, a nullable reference to `promos` and a
/// mandatory self reference on `customers`.
fn marketplace_relationships() -> Vec<ForeignKeyRelationship> {
    vec![
        fk("line_items", "order_id", "orders", false),
        fk("line_items", "product_id", "products", false),
        fk("orders", "customer_id", "customers", false),
        fk("orders", "promo_id", "promos", true),
        fk("products", "vendor_id", "vendors", false),
        fk("customers", "vendor_id", "vendors", false),
        fk("customers", "referrer_id", "customers", false),
    ]
}

async fn marketplace_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table("vendors", &["id", "name"]).await;
    store.create_table("promos", &["id", "code"]).await;
    store
        .create_table("customers", &["id", "vendor_id", "referrer_id"])
        .await;
    store.create_table("products", &["id", "vendor_id"]).await;
    store
        .create_table("orders", &["id", "customer_id", "promo_id"])
        .await;
    store
        .create_table("line_items", &["id", "order_id", "product_id"])
        .await;

    for relationship in marketplace_relationships() {
        store.add_relationship(relationship).await;
    }

    let vendors = (1..=4).map(|id| vec![Cell::I64(id), format!("vendor-{id}").into()]);
    store.insert_rows("vendors", vendors.collect()).await.unwrap();

    let promos = (1..=2).map(|id| vec![Cell::I64(id), format!("PROMO{id}").into()]);
    store.insert_rows("promos", promos.collect()).await.unwrap();

    let customers = (1..=6).map(|id| {
        vec![
            Cell::I64(id),
            Cell::I64((id % 3) + 1),
            Cell::I64(((id + 1) % 6) + 1),
        ]
    });
    store
        .insert_rows("customers", customers.collect())
        .await
        .unwrap();

    let products = (1..=8).map(|id| vec![Cell::I64(id), Cell::I64((id % 4) + 1)]);
    store
        .insert_rows("products", products.collect())
        .await
        .unwrap();

    let orders = (1..=12).map(|id| {
        let promo = if id % 4 == 0 { Cell::I64(1) } else { Cell::Null };
        vec![Cell::I64(id), Cell::I64((id % 6) + 1), promo]
    });
    store.insert_rows("orders", orders.collect()).await.unwrap();

    let line_items = (1..=30).map(|id| {
        vec![
            Cell::I64(id),
            Cell::I64((id % 12) + 1),
            Cell::I64(((id * 3) % 8) + 1),
        ]
    });
    store
        .insert_rows("line_items", line_items.collect())
        .await
        .unwrap();

    store
}

/// Computes the closure by brute force: keep adding referenced parents until nothing changes.
async fn expected_closure(
    store: &MemoryStore,
    relationships: &[ForeignKeyRelationship],
    seeds: &[(&str, Vec<RowId>)],
) -> BTreeMap<String, HashSet<RowId>> {
    let mut expected: BTreeMap<String, HashSet<RowId>> = BTreeMap::new();
    for (table, ids) in seeds {
        expected
            .entry(table.to_string())
            .or_default()
            .extend(ids.iter().copied());
    }

    loop {
        let mut changed = false;

        for relationship in relationships
            .iter()
            .filter(|relationship| !relationship.nullable && !relationship.is_self_reference())
        {
            let Some(child_ids) = expected.get(&relationship.child_table).cloned() else {
                continue;
            };

            let rows = store.table_rows(&relationship.child_table).await.unwrap();
            let id_index = rows.column_index("id").unwrap();
            let column_index = rows.column_index(&relationship.child_column).unwrap();

            for row in &rows.rows {
                let id = row.values()[id_index].as_row_id().unwrap();
                if !child_ids.contains(&id) {
                    continue;
                }

                if let Some(parent_id) = row.values()[column_index].as_row_id() {
                    changed |= expected
                        .entry(relationship.parent_table.clone())
                        .or_default()
                        .insert(parent_id);
                }
            }
        }

        if !changed {
            return expected;
        }
    }
}

fn non_empty(row_sets: &TableRowSet) -> BTreeMap<String, HashSet<RowId>> {
    row_sets
        .iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(table, ids)| (table.clone(), ids.clone()))
        .collect()
}

fn requested(tables: &[(&str, u64)]) -> BTreeMap<String, u64> {
    tables
        .iter()
        .map(|(table, limit)| (table.to_string(), *limit))
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn closure_matches_brute_force_reachability() {
    init_test_tracing();

    let store = marketplace_store().await;
    let relationships = marketplace_relationships();
    let graph = DependencyGraph::build(&relationships);

    let cases: Vec<(Vec<(&str, u64)>, Vec<(&str, Vec<RowId>)>)> = vec![
        (vec![("line_items", 1)], vec![("line_items", vec![1])]),
        (
            vec![("line_items", 5)],
            vec![("line_items", (1..=5).collect())],
        ),
        (
            vec![("orders", 3), ("products", 2)],
            vec![("orders", vec![1, 2, 3]), ("products", vec![1, 2])],
        ),
        (vec![("vendors", 2)], vec![("vendors", vec![1, 2])]),
        (
            vec![("line_items", 100)],
            vec![("line_items", (1..=30).collect())],
        ),
    ];

    for (request, seeds) in cases {
        let row_sets = compute_closure(&store, &graph, &requested(&request))
            .await
            .unwrap();
        let expected = expected_closure(&store, &relationships, &seeds).await;

        assert_eq!(non_empty(&row_sets), expected, "request {request:?}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn nullable_references_never_pull_rows_in() {
    init_test_tracing();

    let store = marketplace_store().await;
    let graph = DependencyGraph::build(&marketplace_relationships());

    // Order 4 holds promo 1.
    let row_sets = compute_closure(&store, &graph, &requested(&[("orders", 4)]))
        .await
        .unwrap();

    assert!(row_sets.contains_table("promos"));
    assert!(row_sets.sorted_ids("promos").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn self_references_never_pull_rows_in_or_block_ordering() {
    init_test_tracing();

    let store = marketplace_store().await;
    let graph = DependencyGraph::build(&marketplace_relationships());

    // Customer 1 is referred by customer 3, which must not be added.
    let row_sets = compute_closure(&store, &graph, &requested(&[("customers", 1)]))
        .await
        .unwrap();
    assert_eq!(row_sets.sorted_ids("customers"), vec![1]);

    let order = schedule_copy(&graph, &row_sets.non_empty_tables()).unwrap();
    assert_eq!(order, vec!["vendors", "customers"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn closure_terminates_within_bound() {
    init_test_tracing();

    let store = marketplace_store().await;
    let relationships = marketplace_relationships();
    let graph = DependencyGraph::build(&relationships);

    compute_closure(
        &store,
        &graph,
        &requested(&[("line_items", 30), ("orders", 12), ("customers", 6)]),
    )
    .await
    .unwrap();

    let tables = graph.tables().count();
    let edge_queries = store
        .operations()
        .await
        .into_iter()
        .filter(|(operation, _)| *operation == StoreOperation::FetchDistinctColumnValues)
        .count();

    assert!(edge_queries > 0);
    assert!(edge_queries <= tables * graph.edge_count());
}

#[tokio::test(flavor = "multi_thread")]
async fn copy_order_respects_every_mandatory_edge() {
    init_test_tracing();

    let store = marketplace_store().await;
    let relationships = marketplace_relationships();
    let graph = DependencyGraph::build(&relationships);

    let row_sets = compute_closure(&store, &graph, &requested(&[("line_items", 10)]))
        .await
        .unwrap();
    let order = schedule_copy(&graph, &row_sets.non_empty_tables()).unwrap();

    assert_eq!(order.len(), row_sets.non_empty_tables().len());

    let position = |table: &str| order.iter().position(|name| name == table);
    for relationship in relationships
        .iter()
        .filter(|relationship| !relationship.nullable && !relationship.is_self_reference())
    {
        if let (Some(parent), Some(child)) = (
            position(&relationship.parent_table),
            position(&relationship.child_table),
        ) {
            assert!(parent < child, "{relationship} is out of order in {order:?}");
        }
    }
}
