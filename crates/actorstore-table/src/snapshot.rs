//! Full-state snapshots stored alongside event streams.
//!
//! A snapshot is one row per (stream, state type), keyed by the state's type
//! identity inside the stream's partition, and rewritten in the same
//! transaction as every append. Appends made with snapshots disabled leave
//! it behind the stream, so a snapshot is only used when its version matches
//! the stream header.

use actorstore_core::codec::{EventCodec, SchemaVersion, StateType};
use actorstore_core::error::DomainError;
use actorstore_core::options::SnapshotCompatibility;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::entity::{TableEntity, TableStore};
use crate::stream::Partition;

/// A snapshot accepted for hydration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<T> {
    /// The decoded state.
    pub state: T,
    /// Stream version the state reflects.
    pub version: u64,
}

/// Builds and validates snapshot rows.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotManager {
    codec: EventCodec,
    compatibility: SnapshotCompatibility,
}

impl SnapshotManager {
    /// Creates a manager using `codec` and gating reuse with `compatibility`.
    #[must_use]
    pub fn new(codec: EventCodec, compatibility: SnapshotCompatibility) -> Self {
        Self {
            codec,
            compatibility,
        }
    }

    /// Builds the row holding `state` at stream `version`, to be included in
    /// the append that advances the stream to `version`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the state cannot be serialized.
    pub fn build<T>(&self, partition_key: &str, state: &T, version: u64) -> Result<TableEntity, DomainError>
    where
        T: StateType + Serialize,
    {
        Ok(TableEntity {
            data: Some(self.codec.encode_state(state)?),
            data_version: Some(T::SCHEMA_VERSION.to_string()),
            type_name: Some(T::TYPE_IDENTITY.to_owned()),
            version: Some(version),
            ..TableEntity::new(partition_key, T::TYPE_IDENTITY)
        })
    }

    /// Loads the stream's snapshot if one exists, is compatible with the
    /// running schema version and was taken at `stream_version`. Missing,
    /// incompatible, lagging and undecodable snapshots all yield `None` so
    /// the caller falls back to replay.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn load<T, S>(
        &self,
        partition: &Partition<'_, S>,
        stream_version: u64,
    ) -> Result<Option<Snapshot<T>>, DomainError>
    where
        T: StateType + DeserializeOwned,
        S: TableStore + ?Sized,
    {
        let Some(row) = partition
            .table()
            .get_entity(partition.key(), T::TYPE_IDENTITY)
            .await?
        else {
            tracing::debug!(stream = partition.key(), "no snapshot stored");
            return Ok(None);
        };

        let stored = match row.data_version.as_deref().map(str::parse::<SchemaVersion>) {
            Some(Ok(stored)) => stored,
            _ => {
                tracing::warn!(stream = partition.key(), "snapshot has no readable schema version");
                return Ok(None);
            }
        };
        if !T::SCHEMA_VERSION.accepts(stored, self.compatibility) {
            tracing::warn!(
                stream = partition.key(),
                stored = %stored,
                running = %T::SCHEMA_VERSION,
                policy = %self.compatibility,
                "ignoring incompatible snapshot"
            );
            return Ok(None);
        }

        let (Some(data), Some(version)) = (row.data, row.version) else {
            tracing::warn!(stream = partition.key(), "snapshot row is incomplete");
            return Ok(None);
        };
        if version != stream_version {
            tracing::warn!(
                stream = partition.key(),
                snapshot_version = version,
                stream_version,
                "snapshot does not match stream version"
            );
            return Ok(None);
        }
        match self.codec.decode_state::<T>(&data, T::TYPE_IDENTITY) {
            Ok(state) => {
                tracing::debug!(stream = partition.key(), version, "hydrating from snapshot");
                Ok(Some(Snapshot { state, version }))
            }
            Err(e) => {
                tracing::warn!(stream = partition.key(), error = %e, "snapshot failed to decode");
                Ok(None)
            }
        }
    }
}
