//! Command abstractions.

use uuid::Uuid;

/// Trait that all commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Stable command name, used as a log field.
    fn command_type(&self) -> &'static str;

    /// Correlation ID carried into the log records of the resulting commit.
    fn correlation_id(&self) -> Uuid;
}
