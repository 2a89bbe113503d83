//! Test clock: deterministic `Clock` implementation for tests.

use std::sync::Arc;

use actorstore_core::clock::{Clock, SharedClock};
use chrono::{DateTime, TimeZone, Utc};

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Returns a shared handle to this clock, ready to hand to a store.
    #[must_use]
    pub fn shared(self) -> SharedClock {
        Arc::new(self)
    }
}

impl Default for FixedClock {
    /// 2026-01-15T10:00:00Z.
    fn default() -> Self {
        Self(Utc.timestamp_opt(1_768_471_200, 0).single().unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
