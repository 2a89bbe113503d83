//! Actorstore Bank: sample actors persisted through actorstore.
//!
//! `Account` is event-sourced: deposits, withdrawals and closure are
//! recorded as events and replayed (or restored from a snapshot) on load.
//! `Wallet` is a plain actor stored as a single row.

pub mod application;
pub mod domain;
