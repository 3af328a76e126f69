//! Domain model for the task-list context.

pub mod aggregates;
pub mod commands;
pub mod events;
