//! End-to-end entity flows against the in-memory backend.

use std::sync::Arc;

use tablekit_core::entity::{DELETED_COLUMN, SEQUENCE_COLUMN, VERSION_COLUMN};
use tablekit_core::{
    BackendAdapter, DeletePolicy, Entity, EntityBuilder, EntityError, FieldKind, IndexDefinition,
    KeyCondition, KeyDerivation, MemoryBackend, ReadOptions, RowKey, SchemaBuilder, SchemaCodec,
    Shape, SortPredicate, TableRef, UpdatePatch, transact_write,
};
use tablekit_model::{Row, Value, row};

fn order_schema() -> SchemaCodec {
    SchemaBuilder::make(
        "v1",
        Shape::new()
            .field("customer_id", FieldKind::Str)
            .field("order_id", FieldKind::Str)
            .field("total", FieldKind::Num)
            .optional("status", FieldKind::Str),
    )
    .evolve_extend(
        "v2",
        |shape| shape.field("currency", FieldKind::Str),
        |prev| {
            let mut next = prev.clone();
            next.insert("currency".to_owned(), Value::from("USD"));
            Ok(next)
        },
    )
    .build()
    .unwrap()
}

fn orders_table() -> TableRef {
    TableRef::new("orders", "pk").with_sort_column("sk")
}

fn order_entity(backend: Arc<MemoryBackend>, policy: DeletePolicy) -> Entity {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let primary = IndexDefinition::new(
        "primary",
        "pk",
        KeyDerivation::new(["customer_id"], |subset| {
            let id = subset
                .get("customer_id")
                .and_then(Value::as_str)
                .ok_or("customer_id must be a string")?;
            Ok(vec!["customer".into(), id.into()])
        }),
    )
    .with_sort("sk", KeyDerivation::fields(["order_id"]));

    let by_status =
        IndexDefinition::new("by-status", "gsi1pk", KeyDerivation::fields(["status"]))
            .with_sort("gsi1sk", KeyDerivation::fields(["order_id"]));

    EntityBuilder::new("order", orders_table())
        .schema(order_schema())
        .primary_index(primary)
        .secondary_index(by_status)
        .delete_policy(policy)
        .build(backend)
        .unwrap()
}

fn order(customer_id: &str, order_id: &str, status: &str, total: i64) -> Row {
    row! {
        "customer_id" => customer_id,
        "order_id" => order_id,
        "status" => status,
        "total" => total,
        "currency" => "USD",
    }
}

fn key_of(customer_id: &str, order_id: &str) -> Row {
    row! { "customer_id" => customer_id, "order_id" => order_id }
}

#[tokio::test]
async fn test_should_roundtrip_insert_and_get() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);

    let record = order("c1", "o1", "open", 100);
    let inserted = entity.insert(record.clone()).await.unwrap();
    assert_eq!(inserted.sequence, 1);
    assert_eq!(inserted.version_tag, "v2");
    assert!(!inserted.deleted);

    let read = entity.get(&key_of("c1", "o1")).await.unwrap().unwrap();
    // Index key and metadata columns never surface as entity fields.
    assert_eq!(read.record, record);
    assert_eq!(read.sequence, 1);
}

#[tokio::test]
async fn test_should_reject_duplicate_insert() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);

    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();
    let result = entity.insert(order("c1", "o1", "open", 200)).await;
    assert!(matches!(result, Err(EntityError::AlreadyExists)));

    let read = entity.get(&key_of("c1", "o1")).await.unwrap().unwrap();
    assert_eq!(read.record.get("total"), Some(&Value::from(100_i64)));
}

#[tokio::test]
async fn test_should_merge_update_and_bump_sequence() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();

    let updated = entity
        .update(&key_of("c1", "o1"), &UpdatePatch::new().set("total", 150_i64), None)
        .await
        .unwrap();
    assert_eq!(updated.sequence, 2);
    assert_eq!(updated.record.get("total"), Some(&Value::from(150_i64)));
    // Untouched fields survive the merge.
    assert_eq!(updated.record.get("status"), Some(&Value::from("open")));

    let read = entity.get(&key_of("c1", "o1")).await.unwrap().unwrap();
    assert_eq!(read.sequence, 2);
    assert_eq!(read.record.get("total"), Some(&Value::from(150_i64)));
}

#[tokio::test]
async fn test_should_guard_update_with_expected_sequence() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();

    // First writer succeeds at sequence 1.
    entity
        .update(
            &key_of("c1", "o1"),
            &UpdatePatch::new().set("total", 110_i64),
            Some(1),
        )
        .await
        .unwrap();

    // Second writer still expects sequence 1.
    let result = entity
        .update(
            &key_of("c1", "o1"),
            &UpdatePatch::new().set("total", 120_i64),
            Some(1),
        )
        .await;
    assert!(matches!(result, Err(EntityError::ConcurrencyConflict)));
}

#[tokio::test]
async fn test_should_let_exactly_one_concurrent_update_win() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = Arc::new(order_entity(backend, DeletePolicy::Hard));
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();

    let first = {
        let entity = entity.clone();
        tokio::spawn(async move {
            entity
                .update(
                    &key_of("c1", "o1"),
                    &UpdatePatch::new().set("total", 1_i64),
                    Some(1),
                )
                .await
        })
    };
    let second = {
        let entity = entity.clone();
        tokio::spawn(async move {
            entity
                .update(
                    &key_of("c1", "o1"),
                    &UpdatePatch::new().set("total", 2_i64),
                    Some(1),
                )
                .await
        })
    };
    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(loser, Err(EntityError::ConcurrencyConflict)));

    let read = entity.get(&key_of("c1", "o1")).await.unwrap().unwrap();
    assert_eq!(read.sequence, 2);
}

#[tokio::test]
async fn test_should_fail_update_of_absent_record() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);

    let result = entity
        .update(
            &key_of("c1", "missing"),
            &UpdatePatch::new().set("total", 1_i64),
            None,
        )
        .await;
    assert!(matches!(result, Err(EntityError::NotFound)));
}

#[tokio::test]
async fn test_should_rederive_secondary_index_on_update() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();
    entity.insert(order("c1", "o2", "open", 200)).await.unwrap();

    entity
        .update(
            &key_of("c1", "o1"),
            &UpdatePatch::new().set("status", "shipped"),
            None,
        )
        .await
        .unwrap();

    let open = entity
        .query("by-status", &KeyCondition::partition("open"))
        .await
        .unwrap();
    let ids: Vec<_> = open
        .iter()
        .map(|r| r.record.get("order_id").and_then(Value::as_str).unwrap())
        .collect();
    assert_eq!(ids, ["o2"]);

    let shipped = entity
        .query("by-status", &KeyCondition::partition("shipped"))
        .await
        .unwrap();
    assert_eq!(shipped.len(), 1);
    assert_eq!(
        shipped[0].record.get("order_id"),
        Some(&Value::from("o1"))
    );
}

#[tokio::test]
async fn test_should_drop_sparse_index_columns_when_field_removed() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();

    // status is optional; removing it takes the record out of by-status.
    entity
        .update(&key_of("c1", "o1"), &UpdatePatch::new().remove("status"), None)
        .await
        .unwrap();

    let open = entity
        .query("by-status", &KeyCondition::partition("open"))
        .await
        .unwrap();
    assert!(open.is_empty());

    let read = entity.get(&key_of("c1", "o1")).await.unwrap().unwrap();
    assert!(!read.record.contains_key("status"));
}

#[tokio::test]
async fn test_should_reject_update_of_reserved_and_key_columns() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();

    let result = entity
        .update(
            &key_of("c1", "o1"),
            &UpdatePatch::new().set(SEQUENCE_COLUMN, 99_i64),
            None,
        )
        .await;
    assert!(matches!(result, Err(EntityError::ReservedColumn { .. })));

    // Patching a primary-key dependent field would re-key the record.
    let result = entity
        .update(
            &key_of("c1", "o1"),
            &UpdatePatch::new().set("order_id", "o2"),
            None,
        )
        .await;
    assert!(matches!(result, Err(EntityError::PrimaryKeyChanged)));
}

#[tokio::test]
async fn test_should_query_primary_index_with_sort_predicates() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);
    for order_id in ["2026-01#o1", "2026-02#o2", "2026-03#o3", "draft#o4"] {
        entity
            .insert(order("c1", order_id, "open", 10))
            .await
            .unwrap();
    }

    let condition = KeyCondition::partition("customer#c1")
        .with_sort(SortPredicate::BeginsWith("2026-".into()));
    let records = entity.query("primary", &condition).await.unwrap();
    let ids: Vec<_> = records
        .iter()
        .map(|r| r.record.get("order_id").and_then(Value::as_str).unwrap())
        .collect();
    assert_eq!(ids, ["2026-01#o1", "2026-02#o2", "2026-03#o3"]);
}

#[tokio::test]
async fn test_should_soft_delete_and_read_back_with_options() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Soft);
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();

    entity.delete(&key_of("c1", "o1"), None).await.unwrap();

    // Default reads treat the record as absent.
    assert!(entity.get(&key_of("c1", "o1")).await.unwrap().is_none());
    let open = entity
        .query("by-status", &KeyCondition::partition("open"))
        .await
        .unwrap();
    assert!(open.is_empty());

    // Opt-in read surfaces the tombstone with a bumped sequence.
    let read = entity
        .get_with(
            &key_of("c1", "o1"),
            ReadOptions {
                include_deleted: true,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(read.deleted);
    assert_eq!(read.sequence, 2);

    // A second delete sees no live record.
    let result = entity.delete(&key_of("c1", "o1"), None).await;
    assert!(matches!(result, Err(EntityError::NotFound)));
}

#[tokio::test]
async fn test_should_hard_delete_and_fail_on_absent_record() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();

    entity.delete(&key_of("c1", "o1"), None).await.unwrap();
    assert!(entity.get(&key_of("c1", "o1")).await.unwrap().is_none());

    let result = entity.delete(&key_of("c1", "o1"), None).await;
    assert!(matches!(result, Err(EntityError::NotFound)));
}

#[tokio::test]
async fn test_should_guard_delete_with_expected_sequence() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend, DeletePolicy::Hard);
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();
    entity
        .update(
            &key_of("c1", "o1"),
            &UpdatePatch::new().set("total", 110_i64),
            None,
        )
        .await
        .unwrap();

    let result = entity.delete(&key_of("c1", "o1"), Some(1)).await;
    assert!(matches!(result, Err(EntityError::ConcurrencyConflict)));

    entity.delete(&key_of("c1", "o1"), Some(2)).await.unwrap();
}

#[tokio::test]
async fn test_should_upgrade_old_version_rows_on_read() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend.clone(), DeletePolicy::Hard);

    // A row written before the currency field existed, stored under v1.
    let mut legacy = row! {
        "pk" => "customer#c1",
        "sk" => "o1",
        "customer_id" => "c1",
        "order_id" => "o1",
        "status" => "open",
        "total" => 100_i64,
        "gsi1pk" => "open",
        "gsi1sk" => "o1",
    };
    legacy.insert(VERSION_COLUMN.to_owned(), Value::from("v1"));
    legacy.insert(SEQUENCE_COLUMN.to_owned(), Value::Num("1".to_owned()));
    legacy.insert(DELETED_COLUMN.to_owned(), Value::Bool(false));
    backend
        .put(&orders_table(), legacy, None)
        .await
        .unwrap();

    let read = entity.get(&key_of("c1", "o1")).await.unwrap().unwrap();
    assert_eq!(read.record.get("currency"), Some(&Value::from("USD")));
    assert_eq!(read.version_tag, "v2");
}

#[tokio::test]
async fn test_should_apply_transactional_batch_across_records() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend.clone(), DeletePolicy::Hard);
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();

    let ops = vec![
        entity
            .transact_update(
                &key_of("c1", "o1"),
                &UpdatePatch::new().set("status", "shipped"),
                Some(1),
            )
            .await
            .unwrap(),
        entity.transact_insert(&order("c1", "o2", "open", 50)).unwrap(),
    ];
    transact_write(backend.as_ref(), ops).await.unwrap();

    let shipped = entity.get(&key_of("c1", "o1")).await.unwrap().unwrap();
    assert_eq!(shipped.record.get("status"), Some(&Value::from("shipped")));
    assert_eq!(shipped.sequence, 2);
    assert!(entity.get(&key_of("c1", "o2")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_should_abort_transaction_and_leave_state_untouched() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend.clone(), DeletePolicy::Hard);
    entity.insert(order("c1", "o1", "open", 100)).await.unwrap();

    let ops = vec![
        entity
            .transact_update(
                &key_of("c1", "o1"),
                &UpdatePatch::new().set("status", "shipped"),
                None,
            )
            .await
            .unwrap(),
        // Fails: o1 already exists.
        entity.transact_insert(&order("c1", "o1", "open", 1)).unwrap(),
    ];
    let result = transact_write(backend.as_ref(), ops).await;
    assert!(matches!(
        result,
        Err(EntityError::TransactionAborted { index: 1 })
    ));

    // The first member's update was not applied.
    let read = entity.get(&key_of("c1", "o1")).await.unwrap().unwrap();
    assert_eq!(read.record.get("status"), Some(&Value::from("open")));
    assert_eq!(read.sequence, 1);
}

#[tokio::test]
async fn test_should_omit_sparse_secondary_index_on_insert() {
    let backend = Arc::new(MemoryBackend::new());
    let entity = order_entity(backend.clone(), DeletePolicy::Hard);

    // No status: the record exists but is absent from by-status.
    let record = row! {
        "customer_id" => "c1",
        "order_id" => "o1",
        "total" => 100_i64,
        "currency" => "USD",
    };
    entity.insert(record).await.unwrap();

    let raw = backend
        .get(
            &orders_table(),
            &RowKey {
                partition: "customer#c1".to_owned(),
                sort: Some("o1".to_owned()),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(!raw.contains_key("gsi1pk"));
    assert!(!raw.contains_key("gsi1sk"));
}

#[tokio::test]
async fn test_should_require_complete_definition() {
    let backend: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
    let result = EntityBuilder::new("order", orders_table())
        .schema(order_schema())
        .primary_index(
            IndexDefinition::new("primary", "pk", KeyDerivation::fields(["customer_id"]))
                .with_sort("sk", KeyDerivation::fields(["order_id"])),
        )
        // No delete policy.
        .build(backend);
    assert!(matches!(result, Err(EntityError::Definition { .. })));
}
