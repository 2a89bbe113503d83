//! Tagged JSON codec for events and state snapshots.
//!
//! Every persisted payload travels with two tags: a type identity used to
//! route the bytes back to a concrete Rust type, and the `major.minor`
//! schema version of the crate that defined that type when it was written.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::error::DomainError;
use crate::options::{JsonOptions, SnapshotCompatibility};

/// Builds the [`SchemaVersion`] of the crate in which it is expanded, from
/// its Cargo package version.
#[macro_export]
macro_rules! schema_version {
    () => {
        $crate::codec::SchemaVersion::from_pkg(
            env!("CARGO_PKG_VERSION_MAJOR"),
            env!("CARGO_PKG_VERSION_MINOR"),
        )
    };
}

/// Builds a `"module::path::Type, crate-name"` type identity for a type
/// declared in the module where the macro is expanded.
#[macro_export]
macro_rules! type_identity {
    ($ty:ident) => {
        concat!(
            module_path!(),
            "::",
            stringify!($ty),
            ", ",
            env!("CARGO_PKG_NAME")
        )
    };
}

/// Error returned when a `major.minor` string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid schema version {0:?}: expected `major.minor`")]
pub struct SchemaVersionError(pub String);

/// The `major.minor` shape version of a serialized type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
}

impl SchemaVersion {
    /// Creates a schema version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Creates a schema version from Cargo's `CARGO_PKG_VERSION_MAJOR` and
    /// `CARGO_PKG_VERSION_MINOR` strings. Non-numeric input reads as zero.
    #[must_use]
    pub const fn from_pkg(major: &str, minor: &str) -> Self {
        Self {
            major: parse_leading_u32(major),
            minor: parse_leading_u32(minor),
        }
    }

    /// Returns whether a payload written at `stored` may be reused by code
    /// running at `self` under `policy`.
    #[must_use]
    pub fn accepts(self, stored: SchemaVersion, policy: SnapshotCompatibility) -> bool {
        match policy {
            SnapshotCompatibility::Major => self.major == stored.major,
            SnapshotCompatibility::Minor => self == stored,
        }
    }
}

#[allow(clippy::cast_lossless)]
const fn parse_leading_u32(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let mut value: u32 = 0;
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value.saturating_mul(10).saturating_add((bytes[i] - b'0') as u32);
        i += 1;
    }
    value
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SchemaVersionError(s.to_owned());
        let mut parts = s.trim().split('.');
        let major = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let minor = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        // Longer forms such as `1.2.0.0` are accepted; only major.minor count.
        for rest in parts {
            rest.parse::<u32>().map_err(|_| err())?;
        }
        Ok(Self { major, minor })
    }
}

/// Identity of a persisted state type.
pub trait StateType {
    /// Short type name, used as the default logical table name.
    const TYPE_NAME: &'static str;
    /// Fully qualified type identity, used as the snapshot row key.
    const TYPE_IDENTITY: &'static str;
    /// Schema version of the crate defining the type.
    const SCHEMA_VERSION: SchemaVersion;
}

/// A closed set of event variants that can be written to and replayed from a
/// stream.
///
/// Implementations map each variant to a type tag and back with a `match`, so
/// an unknown tag surfaces as [`DomainError::UnsupportedEvent`] rather than
/// being skipped.
pub trait EventType: Sized + Send + Sync + fmt::Debug {
    /// Schema version of the crate defining the events.
    const SCHEMA_VERSION: SchemaVersion;

    /// Returns the type tag for this variant.
    fn type_tag(&self) -> &'static str;

    /// Serializes the variant's payload, without the tag.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    fn to_payload(&self) -> Result<Value, DomainError>;

    /// Rebuilds the variant named by `type_tag` from its payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnsupportedEvent` for an unknown tag and
    /// `DomainError::DecodeFailure` for a malformed payload.
    fn from_payload(type_tag: &str, payload: Value) -> Result<Self, DomainError>;
}

/// Serializes a payload to a JSON value.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if serialization fails.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Value, DomainError> {
    serde_json::to_value(payload)
        .map_err(|e| DomainError::Infrastructure(format!("failed to serialize payload: {e}")))
}

/// Deserializes a payload tagged `type_tag`.
///
/// # Errors
///
/// Returns `DomainError::DecodeFailure` if the payload does not fit `T`.
pub fn decode_payload<T: DeserializeOwned>(type_tag: &str, payload: Value) -> Result<T, DomainError> {
    serde_json::from_value(payload).map_err(|e| DomainError::DecodeFailure {
        type_tag: type_tag.to_owned(),
        reason: e.to_string(),
    })
}

/// An event ready to be written as a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEvent {
    /// Serialized payload.
    pub data: String,
    /// Type tag of the variant.
    pub type_tag: String,
    /// Schema version at encode time.
    pub schema_version: SchemaVersion,
}

/// Serializes events and states according to [`JsonOptions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EventCodec {
    options: JsonOptions,
}

impl EventCodec {
    /// Creates a codec with the given options.
    #[must_use]
    pub fn new(options: JsonOptions) -> Self {
        Self { options }
    }

    /// Encodes an event with its type tag and schema version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    pub fn encode<E: EventType>(&self, event: &E) -> Result<EncodedEvent, DomainError> {
        let payload = event.to_payload()?;
        Ok(EncodedEvent {
            data: self.render(payload)?,
            type_tag: event.type_tag().to_owned(),
            schema_version: E::SCHEMA_VERSION,
        })
    }

    /// Decodes a stored event.
    ///
    /// A stored schema version that differs from the running one is logged
    /// and decoding proceeds; only snapshots are gated on compatibility.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnsupportedEvent` for an unknown tag and
    /// `DomainError::DecodeFailure` for a malformed payload.
    pub fn decode<E: EventType>(
        &self,
        data: &str,
        type_tag: &str,
        schema_version: Option<&str>,
    ) -> Result<E, DomainError> {
        match schema_version.map(str::parse::<SchemaVersion>) {
            Some(Ok(stored)) if stored != E::SCHEMA_VERSION => {
                tracing::warn!(
                    type_tag,
                    stored = %stored,
                    running = %E::SCHEMA_VERSION,
                    "decoding event written by a different schema version"
                );
            }
            Some(Err(e)) => tracing::warn!(type_tag, error = %e, "event has unreadable schema version"),
            _ => {}
        }

        let payload: Value = serde_json::from_str(data).map_err(|e| DomainError::DecodeFailure {
            type_tag: type_tag.to_owned(),
            reason: e.to_string(),
        })?;
        E::from_payload(type_tag, payload)
    }

    /// Serializes a full state for a snapshot or plain row.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    pub fn encode_state<T: Serialize>(&self, state: &T) -> Result<String, DomainError> {
        self.render(encode_payload(state)?)
    }

    /// Deserializes a full state tagged `type_tag`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DecodeFailure` if the data does not fit `T`.
    pub fn decode_state<T: DeserializeOwned>(&self, data: &str, type_tag: &str) -> Result<T, DomainError> {
        serde_json::from_str(data).map_err(|e| DomainError::DecodeFailure {
            type_tag: type_tag.to_owned(),
            reason: e.to_string(),
        })
    }

    fn render(&self, mut payload: Value) -> Result<String, DomainError> {
        if self.options.omit_nulls {
            strip_nulls(&mut payload);
        }
        let rendered = if self.options.indented {
            serde_json::to_string_pretty(&payload)
        } else {
            serde_json::to_string(&payload)
        };
        rendered.map_err(|e| DomainError::Infrastructure(format!("failed to render payload: {e}")))
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}
