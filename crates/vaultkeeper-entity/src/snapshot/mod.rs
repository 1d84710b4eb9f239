//! Lightweight directory snapshot entities.

pub mod model;

pub use model::{Snapshot, SnapshotStatus};
