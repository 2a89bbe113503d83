//! Storage configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable toggling automatic snapshots.
pub const AUTO_SNAPSHOT_VAR: &str = "ACTORSTORE_AUTO_SNAPSHOT";

/// Environment variable selecting the snapshot compatibility policy.
pub const SNAPSHOT_COMPATIBILITY_VAR: &str = "ACTORSTORE_SNAPSHOT_COMPATIBILITY";

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set to a value that could not be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// The variable name.
        key: &'static str,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// How strictly a stored snapshot's schema version must match the running
/// schema version before it may replace a full replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotCompatibility {
    /// Only the major version must match.
    Major,
    /// Both major and minor versions must match.
    #[default]
    Minor,
}

impl fmt::Display for SnapshotCompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => f.write_str("major"),
            Self::Minor => f.write_str("minor"),
        }
    }
}

impl FromStr for SnapshotCompatibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            other => Err(format!("expected `major` or `minor`, got `{other}`")),
        }
    }
}

/// JSON serialization settings for event and snapshot payloads.
///
/// Field inclusion and enum representation are chosen per type with serde
/// attributes; these options cover what applies to every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonOptions {
    /// Drop object fields whose value is `null` when writing.
    pub omit_nulls: bool,
    /// Write indented JSON.
    pub indented: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            omit_nulls: true,
            indented: false,
        }
    }
}

/// Options controlling the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOptions {
    /// Store a full-state snapshot atomically with every write.
    pub auto_snapshot: bool,
    /// Policy gating snapshot reuse on read.
    pub snapshot_compatibility: SnapshotCompatibility,
    /// Payload serialization settings.
    pub json: JsonOptions,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            auto_snapshot: true,
            snapshot_compatibility: SnapshotCompatibility::default(),
            json: JsonOptions::default(),
        }
    }
}

impl StorageOptions {
    /// Reads options from the process environment, falling back to defaults
    /// for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads options through `lookup`, which maps a variable name to its
    /// value if set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(value) = lookup(AUTO_SNAPSHOT_VAR) {
            options.auto_snapshot = parse_bool(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: AUTO_SNAPSHOT_VAR,
                value: value.clone(),
                reason: "expected true/false".into(),
            })?;
        }

        if let Some(value) = lookup(SNAPSHOT_COMPATIBILITY_VAR) {
            options.snapshot_compatibility =
                value.parse().map_err(|reason| ConfigError::InvalidValue {
                    key: SNAPSHOT_COMPATIBILITY_VAR,
                    value: value.clone(),
                    reason,
                })?;
        }

        Ok(options)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
