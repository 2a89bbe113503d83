//! Shared test stores and utilities for actorstore.

mod clock;
mod logging;
mod store;

pub use clock::FixedClock;
pub use logging::init_tracing;
pub use store::{FailingTableStore, RecordingTableStore};
