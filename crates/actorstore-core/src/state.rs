//! State container exchanged with the hosting runtime.

/// Mutable per-call state container owned by the hosting runtime.
///
/// The storage engine reads and mutates this container rather than owning
/// the state itself.
#[derive(Debug, Clone, Default)]
pub struct ActorState<T> {
    /// The actor state.
    pub state: T,
    /// Opaque concurrency token proving which version of the state was read.
    /// Event-sourced actors use the stream version; plain actors use the
    /// row's store-assigned tag.
    pub etag: Option<String>,
    /// Whether anything has been persisted for this actor.
    pub exists: bool,
}

impl<T> ActorState<T> {
    /// Wraps a fresh state that has not been read from storage yet.
    #[must_use]
    pub fn new(state: T) -> Self {
        Self {
            state,
            etag: None,
            exists: false,
        }
    }
}
