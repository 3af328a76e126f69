//! The publishing half of the transactional outbox.
//!
//! Rows written by a [`UnitOfWork`](tasklist_core::repository::UnitOfWork)
//! are drained after commit by the [`BatchPublisher`], grouped by topic and
//! sent in size-bounded batches. Rows left unprocessed by a failed publish are
//! picked up again by the [`OutboxSweeper`].

pub mod batch_publisher;
pub mod bus_publisher;
pub mod dispatch;
pub mod post_commit;
pub mod sweeper;

pub use batch_publisher::{BatchPublisher, PublishReport, SentBatch};
pub use bus_publisher::{BusPublisher, EventPublisher};
pub use dispatch::{DispatchOutcome, EventHandler, EventHandlerRegistry, ForwardToPublisher};
pub use post_commit::PublishingUnitOfWork;
pub use sweeper::{OutboxSweeper, SweepConfig, SweepReport};
