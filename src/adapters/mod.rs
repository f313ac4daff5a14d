//! Adapters implementing the domain ports.

pub mod notifier;
pub mod reporter;
pub mod vcs;
