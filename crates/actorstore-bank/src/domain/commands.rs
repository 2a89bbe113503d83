//! Commands for the bank sample.

use actorstore_core::command::Command;
use uuid::Uuid;

/// Command to pay money into an account.
#[derive(Debug, Clone)]
pub struct Deposit {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target account.
    pub account_id: String,
    /// Amount in minor units.
    pub amount: i64,
    /// Free-form description.
    pub description: Option<String>,
}

impl Command for Deposit {
    fn actor_id(&self) -> &str {
        &self.account_id
    }

    fn command_type(&self) -> &'static str {
        "bank.deposit"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to take money out of an account.
#[derive(Debug, Clone)]
pub struct Withdraw {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target account.
    pub account_id: String,
    /// Amount in minor units.
    pub amount: i64,
    /// Free-form description.
    pub description: Option<String>,
}

impl Command for Withdraw {
    fn actor_id(&self) -> &str {
        &self.account_id
    }

    fn command_type(&self) -> &'static str {
        "bank.withdraw"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to close an account.
#[derive(Debug, Clone)]
pub struct CloseAccount {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target account.
    pub account_id: String,
    /// Why the account is being closed.
    pub reason: Option<String>,
}

impl Command for CloseAccount {
    fn actor_id(&self) -> &str {
        &self.account_id
    }

    fn command_type(&self) -> &'static str {
        "bank.close_account"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to add funds to a wallet.
#[derive(Debug, Clone)]
pub struct AddFunds {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target wallet.
    pub wallet_id: String,
    /// Currency code.
    pub currency: String,
    /// Amount in minor units.
    pub amount: i64,
}

impl Command for AddFunds {
    fn actor_id(&self) -> &str {
        &self.wallet_id
    }

    fn command_type(&self) -> &'static str {
        "bank.add_funds"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
