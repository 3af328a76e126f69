//! Task-list bounded context.
//!
//! Lists group items; items carry a title, an optional note and reminder, a
//! priority and a done flag. Creating an item and completing it raise domain
//! events that leave the service through the transactional outbox.

pub mod application;
pub mod domain;
