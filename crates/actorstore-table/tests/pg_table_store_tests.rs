//! Integration tests for `PgTableStore`.

use std::sync::Arc;

use actorstore_core::clock::Clock;
use actorstore_table::entity::{TableAction, TableEntity, TableError, TableStore};
use actorstore_table::postgres::PgTableStore;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

struct StoppedClock(DateTime<Utc>);

impl Clock for StoppedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Helper to build a data row with sensible defaults.
fn make_row(partition_key: &str, row_key: &str, data: &str) -> TableEntity {
    TableEntity {
        data: Some(data.to_string()),
        data_version: Some("0.1".to_string()),
        type_name: Some("tests::Row, actorstore-table".to_string()),
        ..TableEntity::new(partition_key, row_key)
    }
}

async fn store_with_table(pool: PgPool, table: &str) -> PgTableStore {
    let store = PgTableStore::new(pool);
    store.create_table_if_not_exists(table).await.unwrap();
    store
}

// --- provisioning ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_create_table_is_idempotent(pool: PgPool) {
    let store = PgTableStore::new(pool);

    store.create_table_if_not_exists("Account").await.unwrap();
    store.create_table_if_not_exists("Account").await.unwrap();

    let row = store.get_entity("Account", "a-1", "SS-HEAD").await.unwrap();
    assert!(row.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unknown_table_is_reported(pool: PgPool) {
    let store = PgTableStore::new(pool);

    let result = store.get_entity("Missing", "a-1", "SS-HEAD").await;

    assert!(matches!(result, Err(TableError::TableNotFound(name)) if name == "Missing"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_ensure_schema_is_idempotent(pool: PgPool) {
    let store = PgTableStore::new(pool);

    store.ensure_schema().await.unwrap();
    store.ensure_schema().await.unwrap();
}

// --- insert + lookup ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_and_get_round_trip(pool: PgPool) {
    let store = store_with_table(pool, "Account").await;
    let mut row = make_row("a-1", "SS-SE-0000000001", r#"{"amount":100}"#);
    row.version = Some(1);

    let written = store
        .submit_transaction("Account", vec![TableAction::Insert(row)])
        .await
        .unwrap();

    let loaded = store
        .get_entity("Account", "a-1", "SS-SE-0000000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(loaded.etag, written[0].etag);
    assert!(loaded.timestamp.is_some());
    assert_eq!(loaded.data.as_deref(), Some(r#"{"amount":100}"#));
    assert_eq!(loaded.data_version.as_deref(), Some("0.1"));
    assert_eq!(loaded.version, Some(1));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rows_are_stamped_by_store_clock(pool: PgPool) {
    let stopped = DateTime::from_timestamp(1_768_471_200, 0).unwrap();
    let store = PgTableStore::with_clock(pool, Arc::new(StoppedClock(stopped)));
    store.create_table_if_not_exists("Account").await.unwrap();

    store
        .submit_transaction("Account", vec![TableAction::Insert(make_row("a-1", "r", "1"))])
        .await
        .unwrap();
    let replaced = store
        .submit_transaction(
            "Account",
            vec![TableAction::UpsertReplace {
                entity: make_row("a-1", "r", "2"),
                if_match: None,
            }],
        )
        .await
        .unwrap();

    let loaded = store.get_entity("Account", "a-1", "r").await.unwrap().unwrap();
    assert_eq!(replaced[0].timestamp, Some(stopped));
    assert_eq!(loaded.timestamp, Some(stopped));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_existing_row_conflicts(pool: PgPool) {
    let store = store_with_table(pool, "Account").await;
    store
        .submit_transaction("Account", vec![TableAction::Insert(make_row("a-1", "r", "1"))])
        .await
        .unwrap();

    let result = store
        .submit_transaction("Account", vec![TableAction::Insert(make_row("a-1", "r", "2"))])
        .await;

    assert!(matches!(result, Err(TableError::Conflict { .. })));
}

// --- ordering ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_query_partition_orders_by_row_key(pool: PgPool) {
    let store = store_with_table(pool, "Account").await;
    store
        .submit_transaction(
            "Account",
            vec![
                TableAction::Insert(make_row("a-1", "SS-SE-0000000002", "2")),
                TableAction::Insert(make_row("a-1", "SS-HEAD", "h")),
                TableAction::Insert(make_row("a-1", "SS-SE-0000000001", "1")),
            ],
        )
        .await
        .unwrap();
    store
        .submit_transaction("Account", vec![TableAction::Insert(make_row("a-2", "SS-HEAD", "x"))])
        .await
        .unwrap();

    let rows = store.query_partition("Account", "a-1").await.unwrap();

    let keys: Vec<&str> = rows.iter().map(|r| r.row_key.as_str()).collect();
    assert_eq!(keys, ["SS-HEAD", "SS-SE-0000000001", "SS-SE-0000000002"]);
}

// --- optimistic concurrency ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_replace_with_matching_etag_succeeds(pool: PgPool) {
    let store = store_with_table(pool, "Wallet").await;
    let written = store
        .submit_transaction("Wallet", vec![TableAction::Insert(make_row("Wallet", "w-1", "1"))])
        .await
        .unwrap();

    let replaced = store
        .submit_transaction(
            "Wallet",
            vec![TableAction::UpsertReplace {
                entity: make_row("Wallet", "w-1", "2"),
                if_match: written[0].etag.clone(),
            }],
        )
        .await
        .unwrap();

    assert_ne!(replaced[0].etag, written[0].etag);
    let loaded = store.get_entity("Wallet", "Wallet", "w-1").await.unwrap().unwrap();
    assert_eq!(loaded.data.as_deref(), Some("2"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_failed_precondition_rolls_back_whole_transaction(pool: PgPool) {
    // Arrange
    let store = store_with_table(pool, "Account").await;
    store
        .submit_transaction("Account", vec![TableAction::Insert(make_row("a-1", "SS-HEAD", "h"))])
        .await
        .unwrap();

    // Act
    let result = store
        .submit_transaction(
            "Account",
            vec![
                TableAction::Insert(make_row("a-1", "SS-SE-0000000001", "1")),
                TableAction::UpsertReplace {
                    entity: make_row("a-1", "SS-HEAD", "h2"),
                    if_match: Some("W/\"stale\"".to_string()),
                },
            ],
        )
        .await;

    // Assert
    assert!(matches!(result, Err(TableError::Conflict { .. })));
    let rows = store.query_partition("Account", "a-1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].data.as_deref(), Some("h"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_delete_with_stale_etag_conflicts(pool: PgPool) {
    let store = store_with_table(pool, "Wallet").await;
    store
        .submit_transaction("Wallet", vec![TableAction::Insert(make_row("Wallet", "w-1", "1"))])
        .await
        .unwrap();

    let result = store
        .submit_transaction(
            "Wallet",
            vec![TableAction::Delete {
                partition_key: "Wallet".to_string(),
                row_key: "w-1".to_string(),
                if_match: Some("W/\"stale\"".to_string()),
            }],
        )
        .await;

    assert!(matches!(result, Err(TableError::Conflict { .. })));
    assert!(store.get_entity("Wallet", "Wallet", "w-1").await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unconditional_delete_removes_row(pool: PgPool) {
    let store = store_with_table(pool, "Wallet").await;
    store
        .submit_transaction("Wallet", vec![TableAction::Insert(make_row("Wallet", "w-1", "1"))])
        .await
        .unwrap();

    store
        .submit_transaction(
            "Wallet",
            vec![TableAction::Delete {
                partition_key: "Wallet".to_string(),
                row_key: "w-1".to_string(),
                if_match: None,
            }],
        )
        .await
        .unwrap();

    assert!(store.get_entity("Wallet", "Wallet", "w-1").await.unwrap().is_none());
}
