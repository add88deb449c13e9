//! Background Tasks Module
//!
//! Contains the background work a table schedules for itself.
//!
//! # Tasks
//! - Expiration timer: one-shot sleep that triggers the next sweep

mod cleanup;

pub(crate) use cleanup::spawn_sweep_timer;
