use std::collections::HashSet;

use itemstore_db::{
    DbError, ItemDb, ListOptions, Page, RangeFilter, ReconcileOptions, StoredItem,
};
use itemstore_protocol::{Document, IndexDefinition, TableDefinition};
use serde_json::{json, Value};

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn orders() -> TableDefinition {
    TableDefinition::new("orders", "orderId", "^.*$")
        .with_range_key("lineId", "^.*$")
        .with_table_scan(true)
        .with_index(
            IndexDefinition::new("by_customer", "customerId")
                .with_range_key("placedAt")
                .with_index_scan(true),
        )
}

fn items() -> TableDefinition {
    TableDefinition::new("items", "itemId", "^.*$")
        .with_index(IndexDefinition::new("by_status", "status").with_index_scan(true))
        .with_index(IndexDefinition::new("by_color", "color"))
}

async fn setup() -> ItemDb {
    let db = ItemDb::open_in_memory().await.unwrap();
    db.reconcile(&[orders(), items()], ReconcileOptions::default())
        .await
        .unwrap();
    db
}

fn keys(page: &Page<StoredItem>) -> Vec<(String, Option<String>)> {
    page.items
        .iter()
        .map(|i| (i.pk.clone(), i.rk.clone()))
        .collect()
}

fn key(pk: &str, rk: Option<&str>) -> (String, Option<String>) {
    (pk.to_string(), rk.map(str::to_string))
}

/// Follow cursors to the end, asserting pages never exceed `limit`.
async fn drain<F, Fut>(limit: usize, mut read: F) -> Vec<(String, Option<String>)>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: std::future::Future<Output = itemstore_db::Result<Page<StoredItem>>>,
{
    let mut out = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..1000 {
        let mut opts = ListOptions::default().with_limit(limit);
        opts.cursor = cursor.take();
        let page = read(opts).await.unwrap();
        assert!(page.items.len() <= limit);
        out.extend(keys(&page));
        match page.next_cursor {
            Some(next) => {
                assert_eq!(page.items.len(), limit);
                cursor = Some(next);
            }
            None => return out,
        }
    }
    panic!("pagination did not terminate");
}

#[tokio::test]
async fn test_put_get_round_trip_strips_keys() {
    let db = setup().await;
    let table = orders();
    let body = doc(json!({
        "orderId": "order1", "lineId": "line1", "customerId": "cust1", "amount": 42.5
    }));

    let stored = db
        .put_item(&table, "order1", Some("line1"), &body)
        .await
        .unwrap();
    assert_eq!(
        Value::Object(stored.data.clone()),
        json!({"customerId": "cust1", "amount": 42.5})
    );

    let fetched = db
        .get_item(&table, "order1", Some("line1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.pk, "order1");
    assert_eq!(fetched.rk.as_deref(), Some("line1"));
    assert_eq!(fetched.data, stored.data);

    let raw: String = sqlx::query_scalar("SELECT data FROM orders WHERE pk = 'order1'")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert!(!raw.contains("orderId"));
    assert!(!raw.contains("lineId"));
}

#[tokio::test]
async fn test_put_replaces_whole_payload() {
    let db = setup().await;
    let table = items();

    let first = db
        .put_item(&table, "a", None, &doc(json!({"name": "lamp", "color": "red"})))
        .await
        .unwrap();
    let second = db
        .put_item(&table, "a", None, &doc(json!({"name": "desk"})))
        .await
        .unwrap();
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);

    let fetched = db.get_item(&table, "a", None).await.unwrap().unwrap();
    assert_eq!(Value::Object(fetched.data), json!({"name": "desk"}));
}

#[tokio::test]
async fn test_delete_reports_removal() {
    let db = setup().await;
    let table = items();
    db.put_item(&table, "a", None, &doc(json!({}))).await.unwrap();

    assert!(db.delete_item(&table, "a", None).await.unwrap());
    assert!(!db.delete_item(&table, "a", None).await.unwrap());
    assert!(db.get_item(&table, "a", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_key_shape_is_enforced() {
    let db = setup().await;
    assert!(matches!(
        db.get_item(&orders(), "order1", None).await,
        Err(DbError::InvalidKey(_))
    ));
    assert!(matches!(
        db.put_item(&items(), "a", Some("x"), &doc(json!({}))).await,
        Err(DbError::InvalidKey(_))
    ));
}

#[tokio::test]
async fn test_list_partition_two_pages() {
    let db = setup().await;
    let table = orders();
    for line in ["line1", "line2"] {
        db.put_item(&table, "order1", Some(line), &doc(json!({"customerId": "c"})))
            .await
            .unwrap();
    }
    db.put_item(&table, "order2", Some("line1"), &doc(json!({})))
        .await
        .unwrap();

    let first = db
        .list_partition(&table, "order1", &ListOptions::default().with_limit(1))
        .await
        .unwrap();
    assert_eq!(keys(&first), vec![key("order1", Some("line1"))]);
    let cursor = first.next_cursor.expect("first page has a cursor");

    let second = db
        .list_partition(
            &table,
            "order1",
            &ListOptions::default().with_limit(1).with_cursor(cursor),
        )
        .await
        .unwrap();
    assert_eq!(keys(&second), vec![key("order1", Some("line2"))]);
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn test_exact_fit_page_has_no_cursor() {
    let db = setup().await;
    let table = orders();
    for line in ["a", "b"] {
        db.put_item(&table, "o", Some(line), &doc(json!({})))
            .await
            .unwrap();
    }
    let page = db
        .list_partition(&table, "o", &ListOptions::default().with_limit(2))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn test_scan_table_complete_for_every_page_size() {
    let db = setup().await;
    let table = orders();
    let mut expected = Vec::new();
    for order in ["o1", "o2", "o3"] {
        for line in ["l1", "l2", "l3"] {
            db.put_item(&table, order, Some(line), &doc(json!({})))
                .await
                .unwrap();
            expected.push((order.to_string(), Some(line.to_string())));
        }
    }

    for k in 1..=expected.len() {
        let seen = drain(k, |opts| {
            let db = db.clone();
            let table = table.clone();
            async move { db.scan_table(&table, &opts).await }
        })
        .await;
        assert_eq!(seen, expected, "page size {k}");
    }
}

#[tokio::test]
async fn test_index_pagination_with_shared_index_values() {
    let db = setup().await;
    let table = items();
    let mut expected = HashSet::new();
    for i in 0..7 {
        let status = if i % 2 == 0 { "open" } else { "closed" };
        let id = format!("item{i}");
        db.put_item(&table, &id, None, &doc(json!({"status": status})))
            .await
            .unwrap();
        expected.insert(id);
    }
    let index = table.index("by_status").unwrap().clone();

    for k in 1..=7 {
        let seen = drain(k, |opts| {
            let db = db.clone();
            let table = table.clone();
            let index = index.clone();
            async move { db.scan_index(&table, &index, &opts).await }
        })
        .await;
        let ids: Vec<String> = seen.into_iter().map(|(pk, _)| pk).collect();
        assert_eq!(ids.len(), 7, "page size {k}");
        assert_eq!(ids.iter().cloned().collect::<HashSet<_>>(), expected);
        // closed items sort before open ones
        assert_eq!(ids[..3], ["item1", "item3", "item5"]);
    }

    let open = drain(2, |opts| {
        let db = db.clone();
        let table = table.clone();
        let index = index.clone();
        async move { db.query_index(&table, &index, "open", &opts).await }
    })
    .await;
    let open: Vec<String> = open.into_iter().map(|(pk, _)| pk).collect();
    assert_eq!(open, vec!["item0", "item2", "item4", "item6"]);
}

#[tokio::test]
async fn test_sparse_index_hides_items_without_key() {
    let db = setup().await;
    let table = items();
    db.put_item(&table, "a", None, &doc(json!({"name": "no status"})))
        .await
        .unwrap();
    db.put_item(&table, "b", None, &doc(json!({"status": null})))
        .await
        .unwrap();

    let index = table.index("by_status").unwrap();
    let page = db
        .scan_index(&table, index, &ListOptions::default())
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert!(page.next_cursor.is_none());

    db.put_item(&table, "c", None, &doc(json!({"status": "open"})))
        .await
        .unwrap();
    let page = db
        .scan_index(&table, index, &ListOptions::default())
        .await
        .unwrap();
    assert_eq!(keys(&page), vec![key("c", None)]);
}

#[tokio::test]
async fn test_index_range_filters_and_lookup() {
    let db = setup().await;
    let table = orders();
    let rows = [
        ("o1", "l1", "cust1", "2024-01-05"),
        ("o1", "l2", "cust1", "2024-02-10"),
        ("o2", "l1", "cust1", "2024-03-15"),
        ("o3", "l1", "cust2", "2024-01-01"),
    ];
    for (order, line, customer, placed) in rows {
        db.put_item(
            &table,
            order,
            Some(line),
            &doc(json!({"customerId": customer, "placedAt": placed})),
        )
        .await
        .unwrap();
    }
    let index = table.index("by_customer").unwrap();

    let opts = ListOptions::default().with_range(RangeFilter {
        begins_with: Some("2024-0".into()),
        gt: Some("2024-01-31".into()),
        ..Default::default()
    });
    let page = db.query_index(&table, index, "cust1", &opts).await.unwrap();
    assert_eq!(
        keys(&page),
        vec![
            key("o1", Some("l2")),
            key("o2", Some("l1"))
        ]
    );

    let found = db
        .get_item_by_index(&table, index, "cust1", "2024-03-15")
        .await
        .unwrap()
        .unwrap();
    assert_eq!((found.pk.as_str(), found.rk.as_deref()), ("o2", Some("l1")));
    assert!(db
        .get_item_by_index(&table, index, "cust2", "2024-03-15")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_partition_range_filters() {
    let db = setup().await;
    let table = orders();
    for line in ["a1", "a2", "b1", "b2"] {
        db.put_item(&table, "o", Some(line), &doc(json!({})))
            .await
            .unwrap();
    }
    let list = |range: RangeFilter| {
        let db = db.clone();
        let table = table.clone();
        async move {
            let page = db
                .list_partition(&table, "o", &ListOptions::default().with_range(range))
                .await
                .unwrap();
            page.items
                .into_iter()
                .filter_map(|i| i.rk)
                .collect::<Vec<_>>()
        }
    };

    assert_eq!(
        list(RangeFilter {
            begins_with: Some("b".into()),
            ..Default::default()
        })
        .await,
        vec!["b1", "b2"]
    );
    assert_eq!(
        list(RangeFilter {
            gte: Some("a2".into()),
            lt: Some("b2".into()),
            ..Default::default()
        })
        .await,
        vec!["a2", "b1"]
    );
    assert_eq!(
        list(RangeFilter {
            lte: Some("a2".into()),
            ..Default::default()
        })
        .await,
        vec!["a1", "a2"]
    );
}

#[tokio::test]
async fn test_bad_cursor_restarts_sequence() {
    let db = setup().await;
    let table = orders();
    for line in ["l1", "l2", "l3"] {
        db.put_item(&table, "o", Some(line), &doc(json!({})))
            .await
            .unwrap();
    }
    let first = db
        .list_partition(&table, "o", &ListOptions::default().with_limit(1))
        .await
        .unwrap();
    let mut cursor = first.next_cursor.unwrap();
    cursor.push('A');

    for token in [cursor, "garbage".to_string(), String::new()] {
        let page = db
            .list_partition(
                &table,
                "o",
                &ListOptions::default().with_limit(1).with_cursor(token),
            )
            .await
            .unwrap();
        assert_eq!(keys(&page), vec![key("o", Some("l1"))]);
    }
}

#[tokio::test]
async fn test_index_cursor_not_accepted_by_table_read() {
    let db = setup().await;
    let table = items();
    for id in ["a", "b"] {
        db.put_item(&table, id, None, &doc(json!({"status": "open"})))
            .await
            .unwrap();
    }
    let index = table.index("by_status").unwrap();
    let page = db
        .scan_index(&table, index, &ListOptions::default().with_limit(1))
        .await
        .unwrap();
    let cursor = page.next_cursor.unwrap();

    let other = db
        .list_partition(&table, "a", &ListOptions::default().with_cursor(cursor))
        .await
        .unwrap();
    assert_eq!(keys(&other), vec![key("a", None)]);
}

#[tokio::test]
async fn test_partition_cursor_not_accepted_by_other_partition() {
    let db = setup().await;
    let table = orders();
    for line in ["l1", "l2", "l3"] {
        db.put_item(&table, "order1", Some(line), &doc(json!({})))
            .await
            .unwrap();
    }
    db.put_item(&table, "order0", Some("l9"), &doc(json!({})))
        .await
        .unwrap();

    let first = db
        .list_partition(&table, "order1", &ListOptions::default().with_limit(1))
        .await
        .unwrap();
    let cursor = first.next_cursor.unwrap();

    let other = db
        .list_partition(
            &table,
            "order0",
            &ListOptions::default().with_limit(1).with_cursor(cursor.clone()),
        )
        .await
        .unwrap();
    assert_eq!(keys(&other), vec![key("order0", Some("l9"))]);

    let same = db
        .list_partition(
            &table,
            "order1",
            &ListOptions::default().with_limit(1).with_cursor(cursor),
        )
        .await
        .unwrap();
    assert_eq!(keys(&same), vec![key("order1", Some("l2"))]);
}

#[tokio::test]
async fn test_index_query_cursor_bound_to_index_key() {
    let db = setup().await;
    let table = items();
    for (id, status) in [("a", "open"), ("b", "open"), ("c", "shut")] {
        db.put_item(&table, id, None, &doc(json!({"status": status})))
            .await
            .unwrap();
    }
    let index = table.index("by_status").unwrap();
    let open = db
        .query_index(&table, index, "open", &ListOptions::default().with_limit(1))
        .await
        .unwrap();
    assert_eq!(keys(&open), vec![key("a", None)]);
    let cursor = open.next_cursor.unwrap();

    let shut = db
        .query_index(
            &table,
            index,
            "shut",
            &ListOptions::default().with_cursor(cursor),
        )
        .await
        .unwrap();
    assert_eq!(keys(&shut), vec![key("c", None)]);
}

#[tokio::test]
async fn test_huge_limit_is_clamped() {
    let db = setup().await;
    let table = orders();
    for line in ["l1", "l2", "l3"] {
        db.put_item(&table, "o", Some(line), &doc(json!({})))
            .await
            .unwrap();
    }

    let page = db
        .scan_table(&table, &ListOptions::default().with_limit(usize::MAX))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 3);
    assert!(page.next_cursor.is_none());

    let page = db
        .list_partition(&table, "o", &ListOptions::default().with_limit(usize::MAX))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 3);
}

#[tokio::test]
async fn test_scan_gates() {
    let db = setup().await;
    assert!(matches!(
        db.scan_table(&items(), &ListOptions::default()).await,
        Err(DbError::NotPermitted(_))
    ));

    let table = items();
    let by_color = table.index("by_color").unwrap();
    assert!(matches!(
        db.scan_index(&table, by_color, &ListOptions::default()).await,
        Err(DbError::NotPermitted(_))
    ));
    assert!(matches!(
        db.get_item_by_index(&table, by_color, "red", "x").await,
        Err(DbError::NotPermitted(_))
    ));

    // Querying a non-scannable index is still allowed.
    db.query_index(&table, by_color, "red", &ListOptions::default())
        .await
        .unwrap();
}
