//! CLI command implementations.

pub mod files;
pub mod status;
pub mod sync;
