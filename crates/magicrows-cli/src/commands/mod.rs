//! CLI command implementations.

pub mod contract;
pub mod enrich;
pub mod validate;
