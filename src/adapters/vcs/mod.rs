//! Source-control providers.

pub mod git;

pub use git::GitCli;
