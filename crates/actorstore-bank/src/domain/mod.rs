//! Domain layer for the bank sample.

pub mod aggregates;
pub mod commands;
pub mod events;
