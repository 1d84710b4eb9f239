//! Shared value types used across Vaultkeeper crates.

pub mod namespace;
pub mod size;

pub use namespace::Namespace;
pub use size::format_bytes;
