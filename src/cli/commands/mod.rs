//! CLI command implementations.

pub mod artifacts;
pub mod build;
pub mod info;
pub mod logs;
pub mod serve;
pub mod status;
