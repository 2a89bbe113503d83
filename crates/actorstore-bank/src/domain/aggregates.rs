//! Actor states for the bank sample.

use std::collections::BTreeMap;

use actorstore_core::aggregate::{EventLog, EventSourced};
use actorstore_core::codec::{SchemaVersion, StateType};
use actorstore_core::error::DomainError;
use actorstore_core::{schema_version, type_identity};
use serde::{Deserialize, Serialize};

use super::events::{AccountEvent, Closed, Deposited, Withdrawn};

/// An event-sourced bank account.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: String,
    /// Current balance, in minor units.
    pub balance: i64,
    /// Whether the account has been closed.
    pub is_closed: bool,
    /// Why the account was closed, if it was.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(skip)]
    log: EventLog<AccountEvent>,
}

impl StateType for Account {
    const TYPE_NAME: &'static str = "Account";
    const TYPE_IDENTITY: &'static str = type_identity!(Account);
    const SCHEMA_VERSION: SchemaVersion = schema_version!();
}

impl EventSourced for Account {
    type Event = AccountEvent;

    fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            ..Self::default()
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn log(&self) -> &EventLog<AccountEvent> {
        &self.log
    }

    fn log_mut(&mut self) -> &mut EventLog<AccountEvent> {
        &mut self.log
    }

    fn apply(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::Deposited(e) => self.balance = self.balance.saturating_add(e.amount),
            AccountEvent::Withdrawn(e) => self.balance = self.balance.saturating_sub(e.amount),
            AccountEvent::Closed(e) => {
                self.is_closed = true;
                self.reason.clone_from(&e.reason);
            }
        }
    }
}

impl Account {
    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.is_closed {
            return Err(DomainError::Validation(format!(
                "account {} is closed",
                self.id
            )));
        }
        Ok(())
    }

    /// Pays `amount` into the account, producing a `Deposited` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the amount is not positive, the
    /// account is closed or the balance would overflow, and `DomainError::InvalidState` if the account has
    /// not been loaded.
    pub fn deposit(&mut self, amount: i64, description: Option<String>) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::Validation(format!(
                "deposit amount must be positive, got {amount}"
            )));
        }
        self.ensure_open()?;
        if self.balance.checked_add(amount).is_none() {
            return Err(DomainError::Validation(format!(
                "deposit of {amount} would overflow the balance of account {}",
                self.id
            )));
        }
        self.raise(AccountEvent::Deposited(Deposited {
            amount,
            description,
        }))
    }

    /// Takes `amount` out of the account, producing a `Withdrawn` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the amount is not positive, the
    /// account is closed or the balance does not cover it, and
    /// `DomainError::InvalidState` if the account has not been loaded.
    pub fn withdraw(&mut self, amount: i64, description: Option<String>) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::Validation(format!(
                "withdrawal amount must be positive, got {amount}"
            )));
        }
        self.ensure_open()?;
        if amount > self.balance {
            return Err(DomainError::Validation(format!(
                "insufficient funds in account {}: balance {}, requested {amount}",
                self.id, self.balance
            )));
        }
        self.raise(AccountEvent::Withdrawn(Withdrawn {
            amount,
            description,
        }))
    }

    /// Closes the account, producing a `Closed` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the account is already closed,
    /// and `DomainError::InvalidState` if the account has not been loaded.
    pub fn close(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.raise(AccountEvent::Closed(Closed { reason }))
    }
}

/// A plain (non-event-sourced) wallet holding balances per currency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Balance per currency code, in minor units.
    pub funds: BTreeMap<String, i64>,
}

impl StateType for Wallet {
    const TYPE_NAME: &'static str = "Wallet";
    const TYPE_IDENTITY: &'static str = type_identity!(Wallet);
    const SCHEMA_VERSION: SchemaVersion = schema_version!();
}

impl Wallet {
    /// Adds `amount` to the `currency` balance.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the amount is not positive or the
    /// balance would overflow.
    pub fn add_funds(&mut self, currency: &str, amount: i64) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::Validation(format!(
                "amount must be positive, got {amount}"
            )));
        }
        let balance = self.funds.entry(currency.to_owned()).or_default();
        *balance = balance.checked_add(amount).ok_or_else(|| {
            DomainError::Validation(format!("adding {amount} {currency} would overflow the wallet"))
        })?;
        Ok(())
    }
}
