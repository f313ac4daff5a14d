//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Host resource sampling (sysinfo)

pub mod config;
pub mod logging;
pub mod resources;
