//! # vaultkeeper-entity
//!
//! Domain entity models for Vaultkeeper. Every struct in this crate is a
//! value persisted as JSON: registry entries, protection records, snapshot
//! metadata and disaster-recovery artifacts. All entities derive `Debug`,
//! `Clone`, `Serialize` and `Deserialize`.

pub mod disaster;
pub mod file;
pub mod protection;
pub mod snapshot;
