//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - Pretty or JSON console output on stderr
//! - Optional JSON operational log file via tracing-appender

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat};
pub use logger::{LoggerImpl, LOG_FILE_NAME};
