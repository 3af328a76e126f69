//! Shared domain abstractions for the task-list service.
//!
//! This crate defines the traits and types every other crate depends on:
//! domain events, aggregates with pending events, the outbox message model,
//! the capture step that turns pending events into outbox rows, and the
//! abstract broker contract. It contains no infrastructure code.

pub mod aggregate;
pub mod broker;
pub mod capture;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod outbox;
pub mod repository;
