//! Domain types shared by the timetable-generation progress tracker.
//!
//! This crate has zero internal deps so the tracker, the terminal watcher
//! and any future tooling can agree on job statuses, progress snapshots
//! and the stage table without pulling in an HTTP stack.

pub mod error;
pub mod generation;
pub mod messages;
pub mod progress;
pub mod stage;
pub mod types;
