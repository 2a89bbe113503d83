//! Event-sourced aggregate abstraction.

use crate::codec::{EventType, StateType};
use crate::error::DomainError;

/// Pending events, accepted history and version of one aggregate.
///
/// A fresh log is read-only: the aggregate must be loaded or restored before
/// it may raise events.
#[derive(Debug, Clone)]
pub struct EventLog<E> {
    pending: Vec<E>,
    history: Vec<E>,
    version: u64,
    read_only: bool,
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            history: Vec::new(),
            version: 0,
            read_only: true,
        }
    }
}

/// Trait for aggregates whose state is rebuilt by replaying events.
///
/// Implementors supply construction, the event log accessors and `apply`;
/// the bookkeeping operations are provided.
pub trait EventSourced: StateType + Send + Sync + Sized {
    /// The event type this aggregate produces and consumes.
    type Event: EventType;

    /// Constructs an empty, read-only aggregate for `id`.
    fn new(id: &str) -> Self;

    /// Returns the aggregate identifier.
    fn id(&self) -> &str;

    /// Returns the aggregate's event log.
    fn log(&self) -> &EventLog<Self::Event>;

    /// Returns the aggregate's event log mutably.
    fn log_mut(&mut self) -> &mut EventLog<Self::Event>;

    /// Apply an event to mutate internal state.
    fn apply(&mut self, event: &Self::Event);

    /// Constructs an aggregate by replaying `history`.
    fn from_history<I>(id: &str, history: I) -> Self
    where
        I: IntoIterator<Item = Self::Event>,
    {
        let mut aggregate = Self::new(id);
        aggregate.load_events(history);
        aggregate
    }

    /// Returns the number of committed events.
    fn version(&self) -> u64 {
        self.log().version
    }

    /// Returns events raised since the last successful write.
    fn pending_events(&self) -> &[Self::Event] {
        &self.log().pending
    }

    /// Returns committed events loaded or accepted by this instance.
    fn history(&self) -> &[Self::Event] {
        &self.log().history
    }

    /// Returns whether the aggregate is still waiting to be loaded.
    fn is_read_only(&self) -> bool {
        self.log().read_only
    }

    /// Returns whether this instance holds neither pending nor historical
    /// events.
    fn is_empty(&self) -> bool {
        let log = self.log();
        log.pending.is_empty() && log.history.is_empty()
    }

    /// Applies `event` and queues it for persistence.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the aggregate has not been
    /// loaded yet.
    fn raise(&mut self, event: Self::Event) -> Result<(), DomainError> {
        if self.is_read_only() {
            return Err(DomainError::InvalidState(format!(
                "{} {} cannot raise events before it is loaded",
                Self::TYPE_NAME,
                self.id()
            )));
        }
        self.apply(&event);
        self.log_mut().pending.push(event);
        Ok(())
    }

    /// Replays `history` in order and makes the aggregate writable.
    fn load_events<I>(&mut self, history: I)
    where
        I: IntoIterator<Item = Self::Event>,
    {
        self.log_mut().read_only = false;
        for event in history {
            self.apply(&event);
            self.log_mut().history.push(event);
        }
        let log = self.log_mut();
        log.version = log.history.len() as u64;
    }

    /// Makes a snapshot-hydrated aggregate writable at `version` without
    /// replaying any event.
    fn restore(&mut self, version: u64) {
        let log = self.log_mut();
        log.read_only = false;
        log.history.clear();
        log.version = version;
    }

    /// Moves pending events into history after a successful write.
    fn accept_events(&mut self) {
        let log = self.log_mut();
        let accepted = log.pending.len() as u64;
        log.history.append(&mut log.pending);
        log.version += accepted;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::codec::{SchemaVersion, decode_payload, encode_payload};

    #[derive(Debug, Clone, PartialEq)]
    enum CounterEvent {
        Incremented(u32),
    }

    impl EventType for CounterEvent {
        const SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0);

        fn type_tag(&self) -> &'static str {
            "counter.incremented"
        }

        fn to_payload(&self) -> Result<Value, DomainError> {
            match self {
                Self::Incremented(by) => encode_payload(by),
            }
        }

        fn from_payload(type_tag: &str, payload: Value) -> Result<Self, DomainError> {
            decode_payload(type_tag, payload).map(Self::Incremented)
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        id: String,
        total: u32,
        log: EventLog<CounterEvent>,
    }

    impl StateType for Counter {
        const TYPE_NAME: &'static str = "Counter";
        const TYPE_IDENTITY: &'static str = "tests::Counter, actorstore-core";
        const SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0);
    }

    impl EventSourced for Counter {
        type Event = CounterEvent;

        fn new(id: &str) -> Self {
            Self {
                id: id.to_owned(),
                ..Self::default()
            }
        }

        fn id(&self) -> &str {
            &self.id
        }

        fn log(&self) -> &EventLog<CounterEvent> {
            &self.log
        }

        fn log_mut(&mut self) -> &mut EventLog<CounterEvent> {
            &mut self.log
        }

        fn apply(&mut self, event: &CounterEvent) {
            match event {
                CounterEvent::Incremented(by) => self.total += by,
            }
        }
    }

    #[test]
    fn test_new_aggregate_is_read_only_and_empty() {
        let counter = Counter::new("c-1");

        assert!(counter.is_read_only());
        assert!(counter.is_empty());
        assert_eq!(counter.version(), 0);
    }

    #[test]
    fn test_raise_before_load_fails_with_invalid_state() {
        // Arrange
        let mut counter = Counter::new("c-1");

        // Act
        let result = counter.raise(CounterEvent::Incremented(1));

        // Assert
        match result {
            Err(DomainError::InvalidState(msg)) => assert!(msg.contains("c-1")),
            other => panic!("expected InvalidState, got {other:?}"),
        }
        assert!(counter.pending_events().is_empty());
        assert_eq!(counter.total, 0);
    }

    #[test]
    fn test_raise_applies_immediately_and_queues_event() {
        // Arrange
        let mut counter = Counter::from_history("c-1", []);

        // Act
        counter.raise(CounterEvent::Incremented(5)).unwrap();

        // Assert
        assert_eq!(counter.total, 5);
        assert_eq!(counter.pending_events(), &[CounterEvent::Incremented(5)]);
        assert_eq!(counter.version(), 0);
        assert!(!counter.is_empty());
    }

    #[test]
    fn test_load_events_replays_in_order_and_sets_version() {
        let counter = Counter::from_history(
            "c-1",
            [CounterEvent::Incremented(2), CounterEvent::Incremented(3)],
        );

        assert!(!counter.is_read_only());
        assert_eq!(counter.total, 5);
        assert_eq!(counter.version(), 2);
        assert_eq!(counter.history().len(), 2);
    }

    #[test]
    fn test_accept_events_moves_pending_to_history() {
        // Arrange
        let mut counter = Counter::from_history("c-1", [CounterEvent::Incremented(1)]);
        counter.raise(CounterEvent::Incremented(2)).unwrap();
        counter.raise(CounterEvent::Incremented(3)).unwrap();

        // Act
        counter.accept_events();

        // Assert
        assert!(counter.pending_events().is_empty());
        assert_eq!(counter.version(), 3);
        assert_eq!(counter.history().len() as u64, counter.version());
    }

    #[test]
    fn test_accept_events_without_pending_is_noop() {
        let mut counter = Counter::from_history("c-1", [CounterEvent::Incremented(1)]);

        counter.accept_events();

        assert_eq!(counter.version(), 1);
    }

    #[test]
    fn test_restore_makes_aggregate_writable_at_version() {
        // Arrange
        let mut counter = Counter::new("c-1");
        counter.total = 42;

        // Act
        counter.restore(7);
        counter.raise(CounterEvent::Incremented(1)).unwrap();
        counter.accept_events();

        // Assert
        assert_eq!(counter.total, 43);
        assert_eq!(counter.version(), 8);
    }
}
