//! Message broker adapters.
//!
//! Both brokers batch with [`SizeBoundedBatch`](tasklist_core::broker::SizeBoundedBatch)
//! so the publishers see the same overflow behaviour a real broker would give
//! them.

pub mod logging;
pub mod memory;

pub use logging::LogBroker;
pub use memory::{Delivery, InMemoryBroker};
