//! Integration tests for `ActorStorage` over `PgTableStore`.

use std::sync::Arc;

use actorstore_bank::application::command_handlers::{handle_add_funds, handle_deposit};
use actorstore_bank::application::query_handlers::{get_account_by_id, get_wallet_by_id};
use actorstore_bank::domain::aggregates::Account;
use actorstore_bank::domain::commands::{AddFunds, Deposit};
use actorstore_core::aggregate::EventSourced;
use actorstore_core::codec::StateType;
use actorstore_core::error::DomainError;
use actorstore_core::state::ActorState;
use actorstore_table::postgres::PgTableStore;
use actorstore_table::storage::ActorStorage;
use sqlx::PgPool;
use uuid::Uuid;

fn storage(pool: PgPool) -> ActorStorage<PgTableStore> {
    ActorStorage::new(Arc::new(PgTableStore::new(pool)))
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_deposit_and_withdrawal_round_trip(pool: PgPool) {
    // Arrange
    let storage = storage(pool);
    let mut container = ActorState::new(Account::new("acc-1"));
    storage
        .read_state(Account::TYPE_NAME, "acc-1", &mut container)
        .await
        .unwrap();
    container.state.deposit(100, None).unwrap();
    container.state.withdraw(30, None).unwrap();

    // Act
    storage
        .write_state(Account::TYPE_NAME, "acc-1", &mut container)
        .await
        .unwrap();
    let view = get_account_by_id("acc-1", &storage).await.unwrap();

    // Assert
    assert_eq!(view.balance, 70);
    assert_eq!(view.version, 2);
    assert!(!view.is_closed);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_writer_is_rejected(pool: PgPool) {
    // Arrange
    let storage = storage(pool);
    let deposit = Deposit {
        correlation_id: Uuid::new_v4(),
        account_id: "acc-1".into(),
        amount: 50,
        description: None,
    };
    handle_deposit(&deposit, &storage).await.unwrap();
    let mut stale = ActorState::new(Account::new("acc-1"));
    storage
        .read_state(Account::TYPE_NAME, "acc-1", &mut stale)
        .await
        .unwrap();
    handle_deposit(&deposit, &storage).await.unwrap();
    stale.state.withdraw(10, None).unwrap();

    // Act
    let result = storage
        .write_state(Account::TYPE_NAME, "acc-1", &mut stale)
        .await;

    // Assert
    assert!(matches!(result, Err(DomainError::InconsistentState(_))));
    let view = get_account_by_id("acc-1", &storage).await.unwrap();
    assert_eq!(view.balance, 100);
    assert_eq!(view.version, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_clear_state_deletes_stream(pool: PgPool) {
    let storage = storage(pool);
    let deposit = Deposit {
        correlation_id: Uuid::new_v4(),
        account_id: "acc-1".into(),
        amount: 5,
        description: None,
    };
    handle_deposit(&deposit, &storage).await.unwrap();
    let mut container = ActorState::new(Account::new("acc-1"));

    storage
        .clear_state(Account::TYPE_NAME, "acc-1", &mut container)
        .await
        .unwrap();

    let result = get_account_by_id("acc-1", &storage).await;
    assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_wallet_funds_accumulate(pool: PgPool) {
    let storage = storage(pool);
    let add = |currency: &str, amount| AddFunds {
        correlation_id: Uuid::new_v4(),
        wallet_id: "w-1".into(),
        currency: currency.into(),
        amount,
    };

    handle_add_funds(&add("EUR", 10), &storage).await.unwrap();
    handle_add_funds(&add("EUR", 2), &storage).await.unwrap();
    handle_add_funds(&add("USD", 7), &storage).await.unwrap();

    let wallet = get_wallet_by_id("w-1", &storage).await.unwrap();
    assert_eq!(wallet.funds.get("EUR"), Some(&12));
    assert_eq!(wallet.funds.get("USD"), Some(&7));
}
