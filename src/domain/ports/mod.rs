//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - StatusNotifier: best-effort pushes to the remote status display
//! - BuildReporter: messages and documents for the operator
//! - VcsProvider: branch/commit lookup for the project checkout
//!
//! The build supervisor only talks to these traits, so the chat front end, the
//! display and source control can be swapped without touching it.

pub mod notifier;
pub mod reporter;
pub mod vcs;

pub use notifier::StatusNotifier;
pub use reporter::BuildReporter;
pub use vcs::VcsProvider;
