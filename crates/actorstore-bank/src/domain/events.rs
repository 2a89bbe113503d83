//! Domain events for the bank sample.

use actorstore_core::codec::{EventType, SchemaVersion, decode_payload, encode_payload};
use actorstore_core::error::DomainError;
use actorstore_core::{schema_version, type_identity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Emitted when money is paid into an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    /// Amount paid in, in minor units.
    pub amount: i64,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Emitted when money is taken out of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawn {
    /// Amount taken out, in minor units.
    pub amount: i64,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Emitted when an account is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closed {
    /// Why the account was closed.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Event type identifier for [`Deposited`].
pub const DEPOSITED_EVENT_TYPE: &str = type_identity!(Deposited);

/// Event type identifier for [`Withdrawn`].
pub const WITHDRAWN_EVENT_TYPE: &str = type_identity!(Withdrawn);

/// Event type identifier for [`Closed`].
pub const CLOSED_EVENT_TYPE: &str = type_identity!(Closed);

/// Events raised by an [`Account`](super::aggregates::Account).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    /// Money was paid in.
    Deposited(Deposited),
    /// Money was taken out.
    Withdrawn(Withdrawn),
    /// The account was closed.
    Closed(Closed),
}

impl EventType for AccountEvent {
    const SCHEMA_VERSION: SchemaVersion = schema_version!();

    fn type_tag(&self) -> &'static str {
        match self {
            Self::Deposited(_) => DEPOSITED_EVENT_TYPE,
            Self::Withdrawn(_) => WITHDRAWN_EVENT_TYPE,
            Self::Closed(_) => CLOSED_EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> Result<Value, DomainError> {
        match self {
            Self::Deposited(e) => encode_payload(e),
            Self::Withdrawn(e) => encode_payload(e),
            Self::Closed(e) => encode_payload(e),
        }
    }

    fn from_payload(type_tag: &str, payload: Value) -> Result<Self, DomainError> {
        match type_tag {
            DEPOSITED_EVENT_TYPE => decode_payload(type_tag, payload).map(Self::Deposited),
            WITHDRAWN_EVENT_TYPE => decode_payload(type_tag, payload).map(Self::Withdrawn),
            CLOSED_EVENT_TYPE => decode_payload(type_tag, payload).map(Self::Closed),
            other => Err(DomainError::UnsupportedEvent(other.to_owned())),
        }
    }
}
