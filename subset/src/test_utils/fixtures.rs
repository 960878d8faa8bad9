use crate::store::memory::MemoryStore;
use crate::types::{Cell, ForeignKeyRelationship};

/// Builds a foreign key referencing the `id` column of `parent`.
pub fn fk(child: &str, column: &str, parent: &str, nullable: bool) -> ForeignKeyRelationship {
    ForeignKeyRelationship::new(child, column, parent, "id", nullable)
}

/// Foreign keys of the shop schema built by [`shop_store`].
///
/// `orders.coupon_id` is nullable and `customers.referred_by` references its own table.
pub fn shop_relationships() -> Vec<ForeignKeyRelationship> {
    vec![
        fk("orders", "customer_id", "customers", false),
        fk("order_items", "order_id", "orders", false),
        fk("customers", "region_id", "regions", false),
        fk("orders", "coupon_id", "coupons", true),
        fk("customers", "referred_by", "customers", false),
    ]
}

/// Creates a source store holding a small shop.
///
/// | table         | id  | references                          |
/// |---------------|-----|-------------------------------------|
/// | `regions`     | 1   |                                     |
/// | `regions`     | 2   |                                     |
/// | `coupons`     | 900 |                                     |
/// | `customers`   | 5   | region 1, referred by 5             |
/// | `customers`   | 6   | region 2, referred by 5             |
/// | `orders`      | 100 | customer 5                          |
/// | `orders`      | 101 | customer 5, coupon 900              |
/// | `orders`      | 102 | customer 6                          |
/// | `order_items` | 10  | order 100                           |
/// | `order_items` | 11  | order 101                           |
/// | `order_items` | 12  | order 102                           |
pub async fn shop_store() -> (MemoryStore, Vec<ForeignKeyRelationship>) {
    let store = MemoryStore::new();
    let relationships = shop_relationships();

    store.create_table("regions", &["id", "name"]).await;
    store.create_table("coupons", &["id", "code"]).await;
    store
        .create_table("customers", &["id", "name", "region_id", "referred_by"])
        .await;
    store
        .create_table("orders", &["id", "customer_id", "coupon_id", "total"])
        .await;
    store
        .create_table("order_items", &["id", "order_id", "sku"])
        .await;

    for relationship in &relationships {
        store.add_relationship(relationship.clone()).await;
    }

    insert(
        &store,
        "regions",
        vec![
            vec![Cell::I64(1), "emea".into()],
            vec![Cell::I64(2), "apac".into()],
        ],
    )
    .await;
    insert(
        &store,
        "coupons",
        vec![vec![Cell::I64(900), "WELCOME".into()]],
    )
    .await;
    insert(
        &store,
        "customers",
        vec![
            vec![Cell::I64(5), "Ada".into(), Cell::I64(1), Cell::I64(5)],
            vec![Cell::I64(6), "Grace".into(), Cell::I64(2), Cell::I64(5)],
        ],
    )
    .await;
    insert(
        &store,
        "orders",
        vec![
            vec![Cell::I64(100), Cell::I64(5), Cell::Null, Cell::F64(12.5)],
            vec![Cell::I64(101), Cell::I64(5), Cell::I64(900), Cell::F64(3.0)],
            vec![Cell::I64(102), Cell::I64(6), Cell::Null, Cell::F64(40.0)],
        ],
    )
    .await;
    insert(
        &store,
        "order_items",
        vec![
            vec![Cell::I64(10), Cell::I64(100), "sku-1".into()],
            vec![Cell::I64(11), Cell::I64(101), "sku-2".into()],
            vec![Cell::I64(12), Cell::I64(102), "sku-3".into()],
        ],
    )
    .await;

    (store, relationships)
}

async fn insert(store: &MemoryStore, table: &str, rows: Vec<Vec<Cell>>) {
    store
        .insert_rows(table, rows)
        .await
        .unwrap_or_else(|err| panic!("failed to insert fixture rows into {table}: {err}"));
}
