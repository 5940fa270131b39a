//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Partial sweep: Removes abandoned temporary cache writes

mod sweep;

pub use sweep::spawn_sweep_task;
