use std::collections::BTreeMap;

use subset::error::{ErrorCategory, ErrorKind};
use subset::store::DestinationStore;
use subset::store::memory::{MemoryStore, StoreOperation};
use subset::sync::{SubsetSync, SyncRequest};
use subset::test_utils::fixtures::{fk, shop_store};
use subset::types::{Cell, ForeignKeyRelationship, TableRows};
use telemetry::tracing::init_test_tracing;

const SHOP_TABLES: [&str; 5] = ["regions", "coupons", "customers", "orders", "order_items"];

async fn snapshot(store: &MemoryStore, tables: &[&str]) -> BTreeMap<String, Option<TableRows>> {
    let mut snapshot = BTreeMap::new();
    for table in tables {
        snapshot.insert(table.to_string(), store.table_rows(table).await);
    }

    snapshot
}

#[tokio::test(flavor = "multi_thread")]
async fn end_to_end_example() {
    init_test_tracing();

    let source = MemoryStore::new();
    source.create_table("customers", &["id", "name"]).await;
    source.create_table("orders", &["id", "customer_id"]).await;
    source.create_table("order_items", &["id", "order_id"]).await;
    source
        .insert_rows(
            "customers",
            vec![
                vec![Cell::I64(5), "Ada".into()],
                vec![Cell::I64(6), "Grace".into()],
            ],
        )
        .await
        .unwrap();
    source
        .insert_rows(
            "orders",
            vec![
                vec![Cell::I64(100), Cell::I64(5)],
                vec![Cell::I64(101), Cell::I64(5)],
                vec![Cell::I64(102), Cell::I64(6)],
            ],
        )
        .await
        .unwrap();
    source
        .insert_rows(
            "order_items",
            vec![
                vec![Cell::I64(10), Cell::I64(100)],
                vec![Cell::I64(11), Cell::I64(101)],
                vec![Cell::I64(12), Cell::I64(102)],
            ],
        )
        .await
        .unwrap();

    let relationships = vec![
        fk("orders", "customer_id", "customers", false),
        fk("order_items", "order_id", "orders", false),
    ];
    for relationship in &relationships {
        source.add_relationship(relationship.clone()).await;
    }
    let destination = source.empty_copy().await;

    let sync = SubsetSync::new(source, destination.clone(), &relationships);
    let request = SyncRequest::new([("order_items", 2)], false);

    let plan = sync.plan(&request).await.unwrap();
    assert_eq!(plan.row_sets.sorted_ids("order_items"), vec![10, 11]);
    assert_eq!(plan.row_sets.sorted_ids("orders"), vec![100, 101]);
    assert_eq!(plan.row_sets.sorted_ids("customers"), vec![5]);
    assert_eq!(plan.copy_order, vec!["customers", "orders", "order_items"]);

    // Constraint checks stay enabled: the order alone keeps every write valid.
    let report = sync.execute(&plan, request.reset_tables).await.unwrap();
    assert_eq!(report.total_rows(), 5);
    assert_eq!(
        destination.written_tables().await,
        vec!["customers", "orders", "order_items"]
    );
    assert_eq!(destination.row_ids("order_items").await, vec![10, 11]);
    assert_eq!(destination.row_ids("orders").await, vec![100, 101]);
    assert_eq!(destination.row_ids("customers").await, vec![5]);
}

#[tokio::test(flavor = "multi_thread")]
async fn relationships_are_read_from_the_source() {
    init_test_tracing();

    let (source, relationships) = shop_store().await;
    let listed: Vec<ForeignKeyRelationship> = {
        use subset::store::SourceStore;
        source.list_foreign_key_relationships().await.unwrap()
    };

    assert_eq!(listed, relationships);
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_runs_are_idempotent() {
    init_test_tracing();

    let (source, relationships) = shop_store().await;
    let destination = source.empty_copy().await;
    destination.disable_constraint_checks().await.unwrap();
    let sync = SubsetSync::new(source, destination.clone(), &relationships);
    let request = SyncRequest::new([("order_items", 2), ("customers", 1)], true);

    sync.run(&request).await.unwrap();
    let first = snapshot(&destination, &SHOP_TABLES).await;

    sync.run(&request).await.unwrap();
    let second = snapshot(&destination, &SHOP_TABLES).await;

    assert_eq!(first, second);
    assert_eq!(destination.row_ids("orders").await, vec![100, 101]);
}

#[tokio::test(flavor = "multi_thread")]
async fn nullable_reference_outside_the_subset_needs_relaxed_checks() {
    init_test_tracing();

    let (source, relationships) = shop_store().await;
    let destination = source.empty_copy().await;
    let sync = SubsetSync::new(source, destination.clone(), &relationships);

    // Order 101 references coupon 900, which is not part of the subset.
    let request = SyncRequest::new([("order_items", 2)], true);
    let err = sync.run(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DestinationInsertFailed);
    assert_eq!(err.detail(), Some("table orders"));

    destination.disable_constraint_checks().await.unwrap();
    sync.run(&request).await.unwrap();
    destination.enable_constraint_checks().await.unwrap();

    assert_eq!(destination.row_ids("orders").await, vec![100, 101]);
    assert!(destination.row_ids("coupons").await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_copy_keeps_earlier_tables_and_recovers_with_reset() {
    init_test_tracing();

    let (source, relationships) = shop_store().await;
    let destination = source.empty_copy().await;
    destination.disable_constraint_checks().await.unwrap();
    destination
        .fail_on("orders", StoreOperation::WriteTableRows)
        .await;
    let sync = SubsetSync::new(source, destination.clone(), &relationships);
    let request = SyncRequest::new([("order_items", 3)], true);

    let err = sync.run(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DestinationInsertFailed);
    assert_eq!(err.category(), ErrorCategory::Transfer);
    assert_eq!(destination.row_ids("regions").await, vec![1, 2]);
    assert_eq!(destination.row_ids("customers").await, vec![5, 6]);
    assert!(destination.row_ids("orders").await.is_empty());
    assert!(destination.row_ids("order_items").await.is_empty());

    destination.clear_failures().await;
    let report = sync.run(&request).await.unwrap();

    assert_eq!(report.total_rows(), 10);
    assert_eq!(destination.row_ids("order_items").await, vec![10, 11, 12]);
}

#[tokio::test(flavor = "multi_thread")]
async fn cycle_in_needed_tables_fails_before_copying() {
    init_test_tracing();

    let source = MemoryStore::new();
    source.create_table("authors", &["id", "latest_book_id"]).await;
    source.create_table("books", &["id", "author_id"]).await;
    source
        .insert_rows("authors", vec![vec![Cell::I64(1), Cell::I64(1)]])
        .await
        .unwrap();
    source
        .insert_rows("books", vec![vec![Cell::I64(1), Cell::I64(1)]])
        .await
        .unwrap();
    let relationships = vec![
        fk("authors", "latest_book_id", "books", false),
        fk("books", "author_id", "authors", false),
    ];
    let destination = source.empty_copy().await;
    let sync = SubsetSync::new(source, destination.clone(), &relationships);

    let err = sync
        .run(&SyncRequest::new([("books", 1)], true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DependencyCycle);
    assert_eq!(err.detail(), Some("authors, books"));
    assert!(destination.operations().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn cycle_outside_needed_tables_is_ignored() {
    init_test_tracing();

    let (source, mut relationships) = shop_store().await;
    source.create_table("authors", &["id", "latest_book_id"]).await;
    source.create_table("books", &["id", "author_id"]).await;
    relationships.push(fk("authors", "latest_book_id", "books", false));
    relationships.push(fk("books", "author_id", "authors", false));
    let destination = source.empty_copy().await;
    destination.disable_constraint_checks().await.unwrap();
    let sync = SubsetSync::new(source, destination.clone(), &relationships);

    let report = sync
        .run(&SyncRequest::new([("orders", 1)], false))
        .await
        .unwrap();

    let tables: Vec<_> = report
        .tables
        .iter()
        .map(|table| table.table.as_str())
        .collect();
    assert_eq!(tables, vec!["regions", "customers", "orders"]);
}
