//! Command handlers for the bank sample.
//!
//! Each handler plays the part of the actor host: load the actor's state
//! through the storage engine, execute the command, persist the result.

use actorstore_core::aggregate::EventSourced;
use actorstore_core::codec::StateType;
use actorstore_core::command::Command;
use actorstore_core::error::DomainError;
use actorstore_core::state::ActorState;
use actorstore_table::entity::TableStore;
use actorstore_table::storage::ActorStorage;

use crate::domain::aggregates::{Account, Wallet};
use crate::domain::commands::{AddFunds, CloseAccount, Deposit, Withdraw};

/// Result of a successfully handled account command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCommandResult {
    /// The account affected by the command.
    pub account_id: String,
    /// Stream version after the write.
    pub version: u64,
    /// Balance after the command.
    pub balance: i64,
}

/// Loads the account actor, runs `execute` against it and persists the
/// events it raised.
async fn execute_on_account<S, F>(
    storage: &ActorStorage<S>,
    account_id: &str,
    require_existing: bool,
    execute: F,
) -> Result<AccountCommandResult, DomainError>
where
    S: TableStore + ?Sized,
    F: FnOnce(&mut Account) -> Result<(), DomainError>,
{
    let mut container = ActorState::new(Account::new(account_id));
    storage
        .read_state(Account::TYPE_NAME, account_id, &mut container)
        .await?;
    if require_existing && !container.exists {
        return Err(DomainError::AggregateNotFound(account_id.to_owned()));
    }

    execute(&mut container.state)?;

    storage
        .write_state(Account::TYPE_NAME, account_id, &mut container)
        .await?;

    Ok(AccountCommandResult {
        account_id: account_id.to_owned(),
        version: container.state.version(),
        balance: container.state.balance,
    })
}

/// Handles the `Deposit` command. Depositing into an account that was never
/// written opens it.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the deposit is rejected and
/// `DomainError::InconsistentState` if another writer got there first.
#[tracing::instrument(
    skip_all,
    fields(
        command = command.command_type(),
        actor = command.actor_id(),
        correlation_id = %command.correlation_id(),
    )
)]
pub async fn handle_deposit<S: TableStore + ?Sized>(
    command: &Deposit,
    storage: &ActorStorage<S>,
) -> Result<AccountCommandResult, DomainError> {
    execute_on_account(storage, command.actor_id(), false, |account| {
        account.deposit(command.amount, command.description.clone())
    })
    .await
}

/// Handles the `Withdraw` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the account was never written,
/// `DomainError::Validation` if the withdrawal is rejected and
/// `DomainError::InconsistentState` if another writer got there first.
#[tracing::instrument(
    skip_all,
    fields(
        command = command.command_type(),
        actor = command.actor_id(),
        correlation_id = %command.correlation_id(),
    )
)]
pub async fn handle_withdraw<S: TableStore + ?Sized>(
    command: &Withdraw,
    storage: &ActorStorage<S>,
) -> Result<AccountCommandResult, DomainError> {
    execute_on_account(storage, command.actor_id(), true, |account| {
        account.withdraw(command.amount, command.description.clone())
    })
    .await
}

/// Handles the `CloseAccount` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the account was never written,
/// `DomainError::Validation` if it is already closed and
/// `DomainError::InconsistentState` if another writer got there first.
#[tracing::instrument(
    skip_all,
    fields(
        command = command.command_type(),
        actor = command.actor_id(),
        correlation_id = %command.correlation_id(),
    )
)]
pub async fn handle_close_account<S: TableStore + ?Sized>(
    command: &CloseAccount,
    storage: &ActorStorage<S>,
) -> Result<AccountCommandResult, DomainError> {
    execute_on_account(storage, command.actor_id(), true, |account| {
        account.close(command.reason.clone())
    })
    .await
}

/// Handles the `AddFunds` command against the plain `Wallet` actor.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the amount is rejected and
/// `DomainError::InconsistentState` if another writer got there first.
#[tracing::instrument(
    skip_all,
    fields(
        command = command.command_type(),
        actor = command.actor_id(),
        correlation_id = %command.correlation_id(),
    )
)]
pub async fn handle_add_funds<S: TableStore + ?Sized>(
    command: &AddFunds,
    storage: &ActorStorage<S>,
) -> Result<Wallet, DomainError> {
    let mut container = ActorState::new(Wallet::default());
    storage
        .read_plain_state(Wallet::TYPE_NAME, command.actor_id(), &mut container)
        .await?;

    container.state.add_funds(&command.currency, command.amount)?;

    storage
        .write_plain_state(Wallet::TYPE_NAME, command.actor_id(), &mut container)
        .await?;
    Ok(container.state)
}
