//! Actorstore Core: event-sourced aggregate abstractions.
//!
//! This crate defines the in-memory bookkeeping every event-sourced actor
//! carries, the tagged JSON codec used to persist its events and snapshots,
//! and the state container exchanged with the hosting runtime. It contains
//! no storage code.

pub mod aggregate;
pub mod clock;
pub mod codec;
pub mod command;
pub mod error;
pub mod options;
pub mod state;
