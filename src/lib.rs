//! kernelwatch - kernel build supervisor
//!
//! Runs an external kernel build script, streams and classifies its output,
//! enforces a wall-clock ceiling, packages the resulting kernel image into a
//! flashable zip, and reports progress to an operator channel and a remote
//! status display.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): build run model, configuration, errors and ports
//! - **Service Layer** (`services`): supervisor, output classifier, log store, packager
//! - **Adapters** (`adapters`): HTTP display notifier, console reporter, git lookup
//! - **Infrastructure Layer** (`infrastructure`): configuration loading and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kernelwatch::adapters::notifier::NullNotifier;
//! use kernelwatch::adapters::reporter::ConsoleReporter;
//! use kernelwatch::{BuildSupervisor, ConfigLoader, VcsSnapshot};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let supervisor = BuildSupervisor::new(
//!         &config,
//!         Arc::new(NullNotifier),
//!         Arc::new(ConsoleReporter::new(false)),
//!     );
//!     let run = supervisor.start_build("operator", VcsSnapshot::unknown()).await?;
//!     println!("{} finished: {}", run.log_id, run.status);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{BuildError, BuildResult};
pub use domain::models::{
    Artifact, BuildRun, BuildStatus, Config, LogId, PhaseEvent, VcsSnapshot,
};
pub use domain::ports::{BuildReporter, StatusNotifier, VcsProvider};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{BuildSupervisor, OutputClassifier, StopOutcome};
