//! Application layer for the bank sample.

pub mod command_handlers;
pub mod query_handlers;
