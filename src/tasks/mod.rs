//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Stale sweep: drops entries that are past the stale window

mod cleanup;

pub use cleanup::spawn_cleanup_task;
