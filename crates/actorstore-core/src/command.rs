//! Command abstractions.

use uuid::Uuid;

/// A request addressed to one actor.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Identity of the actor the command is addressed to.
    fn actor_id(&self) -> &str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;
}
