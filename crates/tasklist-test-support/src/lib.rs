//! Shared test doubles for the task-list outbox pipeline.

mod broker;
mod clock;
mod events;
mod outbox;

pub use broker::{FailingBroker, StallingBroker};
pub use clock::FixedClock;
pub use events::{TestAggregate, TestEvent, outbox_message};
pub use outbox::InMemoryOutbox;
