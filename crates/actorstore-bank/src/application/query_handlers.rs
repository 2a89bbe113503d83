//! Query handlers for the bank sample.
//!
//! Queries read actors straight from storage, without going through a
//! hosting runtime, and return read-only views.

use actorstore_core::aggregate::EventSourced;
use actorstore_core::codec::StateType;
use actorstore_core::error::DomainError;
use actorstore_core::state::ActorState;
use actorstore_table::entity::TableStore;
use actorstore_table::storage::ActorStorage;
use serde::Serialize;

use crate::domain::aggregates::{Account, Wallet};

/// Read-only view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountView {
    /// The account identifier.
    pub account_id: String,
    /// Current balance, in minor units.
    pub balance: i64,
    /// Whether the account is closed.
    pub is_closed: bool,
    /// Stream version (event count).
    pub version: u64,
}

/// Retrieves an account by its identifier.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if nothing was persisted for the
/// ID, and propagates decode and store failures.
pub async fn get_account_by_id<S: TableStore + ?Sized>(
    account_id: &str,
    storage: &ActorStorage<S>,
) -> Result<AccountView, DomainError> {
    let account = storage
        .read_actor::<Account>(account_id, None)
        .await?
        .ok_or_else(|| DomainError::AggregateNotFound(account_id.to_owned()))?;
    Ok(AccountView {
        account_id: account.id.clone(),
        balance: account.balance,
        is_closed: account.is_closed,
        version: account.version(),
    })
}

/// Retrieves a wallet by its identifier.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the wallet was never written.
pub async fn get_wallet_by_id<S: TableStore + ?Sized>(
    wallet_id: &str,
    storage: &ActorStorage<S>,
) -> Result<Wallet, DomainError> {
    let mut container = ActorState::new(Wallet::default());
    storage
        .read_plain_state(Wallet::TYPE_NAME, wallet_id, &mut container)
        .await?;
    if !container.exists {
        return Err(DomainError::AggregateNotFound(wallet_id.to_owned()));
    }
    Ok(container.state)
}
