//! Actor storage engine.
//!
//! Entry points consumed by the actor hosting runtime. Event-sourced actors
//! are read from their snapshot when one is compatible, otherwise by
//! replaying their stream, and written by appending their pending events at
//! the version they were loaded at. Plain actors are a single row guarded by
//! its concurrency tag.

use std::sync::Arc;

use actorstore_core::aggregate::EventSourced;
use actorstore_core::codec::{EventCodec, SchemaVersion, StateType};
use actorstore_core::error::DomainError;
use actorstore_core::options::StorageOptions;
use actorstore_core::state::ActorState;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::TableCache;
use crate::entity::{TableAction, TableEntity, TableError, TableStore};
use crate::snapshot::SnapshotManager;
use crate::stream::{Partition, StreamOpen};

/// Concurrency token of a stream that has never been written.
pub const EMPTY_STREAM_ETAG: &str = "0";

/// Reads and writes actor state in a tabular store.
///
/// Each logical state name maps to one table, provisioned on first use.
#[derive(Debug)]
pub struct ActorStorage<S: ?Sized> {
    tables: TableCache<S>,
    options: StorageOptions,
    codec: EventCodec,
    snapshots: SnapshotManager,
}

impl<S: TableStore + ?Sized> ActorStorage<S> {
    /// Creates a storage engine over `store` with default options.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_options(store, StorageOptions::default())
    }

    /// Creates a storage engine over `store`.
    #[must_use]
    pub fn with_options(store: Arc<S>, options: StorageOptions) -> Self {
        let codec = EventCodec::new(options.json);
        Self {
            tables: TableCache::new(store),
            options,
            codec,
            snapshots: SnapshotManager::new(codec, options.snapshot_compatibility),
        }
    }

    /// Returns the options in effect.
    #[must_use]
    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        self.tables.store()
    }

    /// Loads an event-sourced actor into `container`.
    ///
    /// An actor that was never written loads as a fresh, writable aggregate
    /// at version zero with `exists == false`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnsupportedEvent` or `DomainError::DecodeFailure`
    /// if a stored event cannot be decoded, and propagates store failures.
    /// `container` is left untouched on error.
    #[tracing::instrument(skip(self, container), fields(state = A::TYPE_NAME))]
    pub async fn read_state<A>(
        &self,
        state_name: &str,
        id: &str,
        container: &mut ActorState<A>,
    ) -> Result<(), DomainError>
    where
        A: EventSourced + DeserializeOwned,
    {
        let table = self.tables.get(state_name).await?;
        let partition = Partition::new(&table, id);

        let StreamOpen::Found(stream) = partition.open().await? else {
            tracing::debug!("stream not found");
            container.state = A::from_history(id, []);
            container.etag = Some(EMPTY_STREAM_ETAG.to_owned());
            container.exists = false;
            return Ok(());
        };

        if self.options.auto_snapshot {
            if let Some(snapshot) = self.snapshots.load::<A, _>(&partition, stream.version).await? {
                let mut aggregate = snapshot.state;
                aggregate.restore(snapshot.version);
                container.state = aggregate;
                container.etag = Some(snapshot.version.to_string());
                container.exists = true;
                return Ok(());
            }
        }

        let slice = partition.read().await?;
        let events = slice
            .events
            .iter()
            .map(|e| {
                self.codec
                    .decode::<A::Event>(&e.data, &e.type_tag, e.data_version.as_deref())
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(events = events.len(), version = slice.version, "replaying stream");

        container.state = A::from_history(id, events);
        container.etag = Some(container.state.version().to_string());
        container.exists = true;
        Ok(())
    }

    /// Persists the pending events of an event-sourced actor.
    ///
    /// Does nothing when there are no pending events. On success the events
    /// are accepted into the aggregate's history and `etag` becomes the new
    /// stream version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InconsistentState` if the stream moved past the
    /// aggregate's version; this is never retried here. Any failure leaves
    /// the pending events in place so the same write can be retried.
    #[tracing::instrument(skip(self, container), fields(state = A::TYPE_NAME))]
    pub async fn write_state<A>(
        &self,
        state_name: &str,
        id: &str,
        container: &mut ActorState<A>,
    ) -> Result<(), DomainError>
    where
        A: EventSourced + Serialize,
    {
        let aggregate = &container.state;
        if aggregate.pending_events().is_empty() {
            tracing::debug!("no pending events, skipping write");
            return Ok(());
        }

        let expected_version = aggregate.version();
        let events = aggregate
            .pending_events()
            .iter()
            .map(|e| self.codec.encode(e))
            .collect::<Result<Vec<_>, _>>()?;
        let new_version = expected_version + events.len() as u64;
        let includes = if self.options.auto_snapshot {
            vec![self.snapshots.build(id, aggregate, new_version)?]
        } else {
            Vec::new()
        };

        let table = self.tables.get(state_name).await?;
        let partition = Partition::new(&table, id);
        match partition.write(expected_version, events, includes).await {
            Ok(stream) => {
                container.state.accept_events();
                container.etag = Some(stream.version.to_string());
                container.exists = true;
                tracing::info!(version = stream.version, "events committed");
                Ok(())
            }
            Err(e) => Err(stream_conflict(e)),
        }
    }

    /// Deletes every persisted row of an event-sourced actor and resets
    /// `container` to a fresh aggregate.
    ///
    /// When `container.etag` holds a stream version the stream must still be
    /// at that version; a container that was never read clears
    /// unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InconsistentState` if the stream moved past
    /// `container.etag`, and propagates store failures.
    #[tracing::instrument(skip(self, container), fields(state = A::TYPE_NAME))]
    pub async fn clear_state<A>(
        &self,
        state_name: &str,
        id: &str,
        container: &mut ActorState<A>,
    ) -> Result<(), DomainError>
    where
        A: EventSourced,
    {
        let table = self.tables.get(state_name).await?;
        let expected_version = container.etag.as_deref().and_then(|tag| tag.parse().ok());
        Partition::new(&table, id)
            .delete(expected_version)
            .await
            .map_err(stream_conflict)?;
        container.state = A::from_history(id, []);
        container.etag = Some(EMPTY_STREAM_ETAG.to_owned());
        container.exists = false;
        tracing::info!("stream cleared");
        Ok(())
    }

    /// Reads an event-sourced actor without a hosting runtime.
    ///
    /// `state_name` defaults to the aggregate's type name. Returns `None`
    /// when nothing was persisted for `id`.
    ///
    /// # Errors
    ///
    /// Same as [`ActorStorage::read_state`].
    pub async fn read_actor<A>(
        &self,
        id: &str,
        state_name: Option<&str>,
    ) -> Result<Option<A>, DomainError>
    where
        A: EventSourced + DeserializeOwned,
    {
        let mut container = ActorState::new(A::new(id));
        self.read_state(state_name.unwrap_or(A::TYPE_NAME), id, &mut container)
            .await?;
        Ok(container.exists.then_some(container.state))
    }

    /// Loads a plain (non-event-sourced) actor with a single point lookup.
    ///
    /// A missing row leaves `container.state` untouched with
    /// `exists == false`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DecodeFailure` if the row cannot be decoded, and
    /// propagates store failures.
    #[tracing::instrument(skip(self, container), fields(state = T::TYPE_NAME))]
    pub async fn read_plain_state<T>(
        &self,
        state_name: &str,
        id: &str,
        container: &mut ActorState<T>,
    ) -> Result<(), DomainError>
    where
        T: StateType + DeserializeOwned,
    {
        let table = self.tables.get(state_name).await?;
        let Some(row) = table.get_entity(state_name, id).await? else {
            container.etag = None;
            container.exists = false;
            return Ok(());
        };

        if let Some(Ok(stored)) = row.data_version.as_deref().map(str::parse::<SchemaVersion>) {
            if stored != T::SCHEMA_VERSION {
                tracing::warn!(stored = %stored, running = %T::SCHEMA_VERSION, "decoding state written by a different schema version");
            }
        }
        let data = row.data.ok_or_else(|| DomainError::DecodeFailure {
            type_tag: T::TYPE_IDENTITY.to_owned(),
            reason: format!("row {id} has no data"),
        })?;
        container.state = self.codec.decode_state(&data, T::TYPE_IDENTITY)?;
        container.etag = row.etag;
        container.exists = true;
        Ok(())
    }

    /// Persists a plain actor with one conditional upsert.
    ///
    /// With an `etag` the stored row must still carry it; without one the
    /// row must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InconsistentState` if the precondition fails.
    #[tracing::instrument(skip(self, container), fields(state = T::TYPE_NAME))]
    pub async fn write_plain_state<T>(
        &self,
        state_name: &str,
        id: &str,
        container: &mut ActorState<T>,
    ) -> Result<(), DomainError>
    where
        T: StateType + Serialize,
    {
        let entity = TableEntity {
            data: Some(self.codec.encode_state(&container.state)?),
            data_version: Some(T::SCHEMA_VERSION.to_string()),
            type_name: Some(T::TYPE_IDENTITY.to_owned()),
            ..TableEntity::new(state_name, id)
        };
        let action = match container.etag.clone() {
            Some(tag) => TableAction::UpsertReplace {
                entity,
                if_match: Some(tag),
            },
            None => TableAction::Insert(entity),
        };

        let table = self.tables.get(state_name).await?;
        let written = table.submit(vec![action]).await.map_err(plain_conflict)?;
        container.etag = written.into_iter().next().and_then(|row| row.etag);
        container.exists = true;
        tracing::info!("state written");
        Ok(())
    }

    /// Deletes a plain actor's row and resets `container`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InconsistentState` if the row no longer carries
    /// `container.etag`.
    #[tracing::instrument(skip(self, container), fields(state = T::TYPE_NAME))]
    pub async fn clear_plain_state<T>(
        &self,
        state_name: &str,
        id: &str,
        container: &mut ActorState<T>,
    ) -> Result<(), DomainError>
    where
        T: StateType + Default,
    {
        let table = self.tables.get(state_name).await?;
        table
            .submit(vec![TableAction::Delete {
                partition_key: state_name.to_owned(),
                row_key: id.to_owned(),
                if_match: container.etag.clone(),
            }])
            .await
            .map_err(plain_conflict)?;
        container.state = T::default();
        container.etag = None;
        container.exists = false;
        Ok(())
    }
}

fn stream_conflict(err: DomainError) -> DomainError {
    match err {
        DomainError::ConcurrencyConflict { .. } => {
            tracing::warn!(error = %err, "write rejected");
            DomainError::InconsistentState(err.to_string())
        }
        other => other,
    }
}

fn plain_conflict(err: TableError) -> DomainError {
    match err {
        TableError::Conflict { .. } => {
            tracing::warn!(error = %err, "write rejected");
            DomainError::InconsistentState(err.to_string())
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use actorstore_core::aggregate::EventLog;
    use actorstore_core::codec::{EventType, decode_payload, encode_payload};
    use serde::Deserialize;
    use serde_json::Value;

    use super::*;
    use crate::memory::InMemoryTableStore;

    #[derive(Debug, Clone, PartialEq)]
    enum TallyEvent {
        Added(u32),
    }

    const ADDED: &str = "tests::Added, actorstore-table";

    impl EventType for TallyEvent {
        const SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(0, 1);

        fn type_tag(&self) -> &'static str {
            ADDED
        }

        fn to_payload(&self) -> Result<Value, DomainError> {
            match self {
                Self::Added(n) => encode_payload(n),
            }
        }

        fn from_payload(type_tag: &str, payload: Value) -> Result<Self, DomainError> {
            match type_tag {
                ADDED => decode_payload(type_tag, payload).map(Self::Added),
                other => Err(DomainError::UnsupportedEvent(other.to_owned())),
            }
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Tally {
        id: String,
        total: u32,
        #[serde(skip)]
        log: EventLog<TallyEvent>,
    }

    impl StateType for Tally {
        const TYPE_NAME: &'static str = "Tally";
        const TYPE_IDENTITY: &'static str = "tests::Tally, actorstore-table";
        const SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(0, 1);
    }

    impl EventSourced for Tally {
        type Event = TallyEvent;

        fn new(id: &str) -> Self {
            Self {
                id: id.to_owned(),
                ..Self::default()
            }
        }

        fn id(&self) -> &str {
            &self.id
        }

        fn log(&self) -> &EventLog<TallyEvent> {
            &self.log
        }

        fn log_mut(&mut self) -> &mut EventLog<TallyEvent> {
            &mut self.log
        }

        fn apply(&mut self, event: &TallyEvent) {
            match event {
                TallyEvent::Added(n) => self.total += n,
            }
        }
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Settings {
        values: BTreeMap<String, String>,
    }

    impl StateType for Settings {
        const TYPE_NAME: &'static str = "Settings";
        const TYPE_IDENTITY: &'static str = "tests::Settings, actorstore-table";
        const SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(0, 1);
    }

    fn storage() -> ActorStorage<InMemoryTableStore> {
        ActorStorage::new(Arc::new(InMemoryTableStore::new()))
    }

    async fn loaded(storage: &ActorStorage<InMemoryTableStore>, id: &str) -> ActorState<Tally> {
        let mut container = ActorState::new(Tally::new(id));
        storage.read_state("Tally", id, &mut container).await.unwrap();
        container
    }

    #[tokio::test]
    async fn test_read_unknown_stream_returns_writable_default() {
        let storage = storage();

        let container = loaded(&storage, "t-1").await;

        assert!(!container.exists);
        assert_eq!(container.etag.as_deref(), Some(EMPTY_STREAM_ETAG));
        assert_eq!(container.state.version(), 0);
        assert!(!container.state.is_read_only());
    }

    #[tokio::test]
    async fn test_write_then_read_round_trips() {
        // Arrange
        let storage = storage();
        let mut container = loaded(&storage, "t-1").await;
        container.state.raise(TallyEvent::Added(2)).unwrap();
        container.state.raise(TallyEvent::Added(3)).unwrap();

        // Act
        storage.write_state("Tally", "t-1", &mut container).await.unwrap();
        let reloaded = loaded(&storage, "t-1").await;

        // Assert
        assert!(container.state.pending_events().is_empty());
        assert_eq!(container.etag.as_deref(), Some("2"));
        assert!(reloaded.exists);
        assert_eq!(reloaded.state.total, 5);
        assert_eq!(reloaded.state.version(), 2);
    }

    #[tokio::test]
    async fn test_write_without_snapshots_replays_on_read() {
        // Arrange
        let store = Arc::new(InMemoryTableStore::new());
        let options = StorageOptions {
            auto_snapshot: false,
            ..StorageOptions::default()
        };
        let storage = ActorStorage::with_options(Arc::clone(&store), options);
        let mut container = loaded(&storage, "t-1").await;
        container.state.raise(TallyEvent::Added(4)).unwrap();

        // Act
        storage.write_state("Tally", "t-1", &mut container).await.unwrap();
        let reloaded = loaded(&storage, "t-1").await;

        // Assert
        let snapshot = store
            .get_entity("Tally", "t-1", Tally::TYPE_IDENTITY)
            .await
            .unwrap();
        assert!(snapshot.is_none());
        assert_eq!(reloaded.state.total, 4);
        assert_eq!(reloaded.state.history().len(), 1);
    }

    #[tokio::test]
    async fn test_plain_state_round_trip_and_stale_etag() {
        // Arrange
        let storage = storage();
        let mut first = ActorState::new(Settings::default());
        first.state.values.insert("theme".into(), "dark".into());
        storage
            .write_plain_state("Settings", "s-1", &mut first)
            .await
            .unwrap();
        let stale_etag = first.etag.clone();

        let mut reader = ActorState::new(Settings::default());
        storage
            .read_plain_state("Settings", "s-1", &mut reader)
            .await
            .unwrap();
        reader.state.values.insert("lang".into(), "en".into());
        storage
            .write_plain_state("Settings", "s-1", &mut reader)
            .await
            .unwrap();

        // Act
        let mut stale = ActorState {
            state: Settings::default(),
            etag: stale_etag,
            exists: true,
        };
        let result = storage.write_plain_state("Settings", "s-1", &mut stale).await;

        // Assert
        assert!(matches!(result, Err(DomainError::InconsistentState(_))));
        let mut check = ActorState::new(Settings::default());
        storage
            .read_plain_state("Settings", "s-1", &mut check)
            .await
            .unwrap();
        assert!(check.exists);
        assert_eq!(check.state.values.len(), 2);
    }

    #[tokio::test]
    async fn test_plain_insert_without_etag_conflicts_when_row_exists() {
        let storage = storage();
        let mut first = ActorState::new(Settings::default());
        storage
            .write_plain_state("Settings", "s-1", &mut first)
            .await
            .unwrap();

        let mut second = ActorState::new(Settings::default());
        let result = storage
            .write_plain_state("Settings", "s-1", &mut second)
            .await;

        assert!(matches!(result, Err(DomainError::InconsistentState(_))));
    }
}
